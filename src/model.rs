//! Core data types for the river-level alerting service.
//!
//! This module defines the shared domain model imported by all other modules:
//! readings, stations, trend results, the persisted notification state and
//! the per-cycle decision. It contains no I/O.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Readings
// ---------------------------------------------------------------------------

/// A single telemetry sample from a monitoring station.
///
/// Immutable once fetched. A station's readings are only meaningful for
/// analysis when sorted newest first (see `sort_newest_first`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub station_id: String,
    pub timestamp: DateTime<Utc>,
    /// Water level in centimeters.
    pub level_cm: f64,
    /// Discharge in m³/s, when the station reports it.
    pub flow_m3s: Option<f64>,
}

impl Reading {
    pub fn new(station_id: impl Into<String>, timestamp: DateTime<Utc>, level_cm: f64) -> Self {
        Self {
            station_id: station_id.into(),
            timestamp,
            level_cm,
            flow_m3s: None,
        }
    }
}

/// Sorts readings newest first, the order every analysis function expects.
pub fn sort_newest_first(readings: &mut [Reading]) {
    readings.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
}

// ---------------------------------------------------------------------------
// Stations
// ---------------------------------------------------------------------------

/// The part a station plays in the decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StationRole {
    /// Where the flooding happens.
    Local,
    /// Predicts the local level roughly 2 hours ahead (dam outflow).
    UpstreamShortHorizon,
    /// Predicts the local level roughly 8 hours ahead (headwaters).
    UpstreamLongHorizon,
}

impl fmt::Display for StationRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StationRole::Local => write!(f, "local"),
            StationRole::UpstreamShortHorizon => write!(f, "upstream-short"),
            StationRole::UpstreamLongHorizon => write!(f, "upstream-long"),
        }
    }
}

// ---------------------------------------------------------------------------
// Trend
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Rising,
    Falling,
    Steady,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Rising => write!(f, "rising"),
            Direction::Falling => write!(f, "falling"),
            Direction::Steady => write!(f, "steady"),
        }
    }
}

/// Short-horizon features derived from one station's readings.
///
/// `velocity_cm_per_hour` is `None` when no reference reading fell inside
/// the one-hour tolerance band. That is "undetermined", which is not the
/// same as a measured zero.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrendResult {
    pub direction: Direction,
    pub magnitude_cm: f64,
    pub velocity_cm_per_hour: Option<f64>,
}

impl TrendResult {
    /// The neutral result for insufficient data: steady, 0 cm, 0 cm/h.
    pub fn neutral() -> Self {
        Self {
            direction: Direction::Steady,
            magnitude_cm: 0.0,
            velocity_cm_per_hour: Some(0.0),
        }
    }

    /// Result used when readings exist but none is usable as a reference.
    pub fn undetermined() -> Self {
        Self {
            direction: Direction::Steady,
            magnitude_cm: 0.0,
            velocity_cm_per_hour: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Notification state
// ---------------------------------------------------------------------------

/// The only mutable cross-cycle state of the alerting core.
///
/// Persisted by a `state::StateStore`; advanced only after a downstream
/// notification actually succeeded.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationState {
    #[serde(default)]
    pub last_notified_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub active_count: u32,
}

impl NotificationState {
    /// Minutes since the last notification, or `None` if never notified.
    pub fn minutes_since_last(&self, now: DateTime<Utc>) -> Option<i64> {
        self.last_notified_at.map(|t| (now - t).num_minutes())
    }

    /// Advances the state after a successful delivery.
    ///
    /// Returns the next state and whether the oldest published artifacts must
    /// be cleared before posting. At or above `story_cap` the count stays put
    /// (clear `stories_per_post`, add `stories_per_post`).
    pub fn record_delivery(
        &self,
        now: DateTime<Utc>,
        story_cap: u32,
        stories_per_post: u32,
    ) -> (NotificationState, bool) {
        let needs_cleanup = self.active_count >= story_cap;
        let active_count = if needs_cleanup {
            self.active_count
        } else {
            self.active_count + stories_per_post
        };
        (
            NotificationState {
                last_notified_at: Some(now),
                active_count,
            },
            needs_cleanup,
        )
    }

    /// Like `record_delivery`, but the oldest `stories_per_post` artifacts
    /// are cleared first whatever the count.
    pub fn record_delivery_with_cleanup(&self, now: DateTime<Utc>, stories_per_post: u32) -> NotificationState {
        NotificationState {
            last_notified_at: Some(now),
            active_count: self.active_count.saturating_sub(stories_per_post) + stories_per_post,
        }
    }
}

// ---------------------------------------------------------------------------
// Decision
// ---------------------------------------------------------------------------

/// Escalation label, in ascending order of urgency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Routine,
    Watch,
    Warning,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Routine => write!(f, "routine"),
            Severity::Watch => write!(f, "watch"),
            Severity::Warning => write!(f, "warning"),
            Severity::Critical => write!(f, "critical"),
        }
    }
}

impl std::str::FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "routine" => Ok(Severity::Routine),
            "watch" => Ok(Severity::Watch),
            "warning" => Ok(Severity::Warning),
            "critical" => Ok(Severity::Critical),
            other => Err(format!("unknown severity '{}'", other)),
        }
    }
}

/// Which rule of the cascade produced a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    UpstreamSurge,
    RapidLocalRise,
    SevereLevel,
    IncomingWave,
    AlertLevel,
    GradualRise,
    RoutineWindow,
    Stable,
    /// Posted on operator request, outside the cascade's gating.
    Manual,
}

/// The outcome of one decision cycle. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub should_notify: bool,
    pub severity: Severity,
    pub trigger: Trigger,
    /// Re-notify interval of the decision's severity class. A routine-window
    /// bulletin reports its window cadence (720 by default) but is gated by
    /// `routine.min_gap_minutes` instead: the window already limits it to
    /// once per window.
    pub min_reinterval_minutes: i64,
    pub reason: String,
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors that can arise when fetching or parsing station telemetry.
///
/// These never reach the decision engine: the telemetry boundary logs them
/// and yields an empty reading list instead.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    /// Non-2xx HTTP response from the telemetry API.
    #[error("HTTP error: {0}")]
    HttpStatus(u16),
    /// Connection failure or timeout.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    /// The response body could not be parsed.
    #[error("Parse error: {0}")]
    Parse(String),
    /// The response parsed but contained no usable readings.
    #[error("No data available for station: {0}")]
    NoData(String),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
