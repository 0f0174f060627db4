//! Telemetry ingestion.
//!
//! `TelemetrySource` is the seam between the monitor and the outside world.
//! The production source is the ANA XML web service (`ana`); the reading
//! archive provides a replay source for development (`archive::ReplaySource`).

pub mod ana;

use chrono::{DateTime, Utc};

use crate::model::Reading;

/// Anything that can produce a station's readings over a time window.
///
/// `fetch` fails soft: on any transport, HTTP or parse failure it logs the
/// problem and returns an empty vector. Results are sorted newest first and
/// restricted to `[from, to]`.
pub trait TelemetrySource {
    fn fetch(&self, station_id: &str, from: DateTime<Utc>, to: DateTime<Utc>) -> Vec<Reading>;
}

pub use ana::AnaClient;
