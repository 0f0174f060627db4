//! Trend analysis over a single station's readings.
//!
//! Everything here is a pure function of its input. Readings are expected
//! newest first (see `model::sort_newest_first`); feeding them in any other
//! order produces meaningless but non-panicking results.
//!
//! Submodules:
//! - `trend`: direction, magnitude and hourly velocity, plus the last-step
//!   helpers used for plateau suppression.
//! - `recession`: detects a river that is steadily going down.

pub mod recession;
pub mod trend;

pub use recession::is_receding;
pub use trend::{analyze, last_step_cm, step_trend};
