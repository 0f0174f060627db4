//! Alerting: the decision engine and reading freshness checks.
//!
//! Notification dispatch lives in `dispatch`; the cooldown bookkeeping it
//! depends on lives in `model::NotificationState` and `state`.

pub mod decision;
pub mod staleness;

pub use decision::{decide, DecisionPolicy, LocalSignal, UpstreamStep};
