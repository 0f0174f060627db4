//! The decision engine.
//!
//! Combines the local level and velocity, the short-horizon upstream step and
//! the long-horizon upstream velocity into a single `Decision`. Rules are a
//! priority cascade evaluated in a fixed order, first match wins; the order
//! itself is the tie-break policy:
//!
//! | # | condition                                   | severity | re-interval |
//! |---|---------------------------------------------|----------|-------------|
//! | 1 | upstream short-horizon step ≥ critical delta | critical | 15 min      |
//! | 2 | local velocity ≥ panic (rising step)        | critical | 15 min      |
//! | 3 | local level ≥ severe (rising step)          | critical | 15 min      |
//! | 4 | upstream long-horizon velocity ≥ threshold  | warning  | 30 min      |
//! | 5 | local level ≥ alert                         | warning  | 30 min      |
//! | 6 | local velocity ≥ moderate (rising step)     | warning  | 30 min      |
//! | 7 | inside a daily routine window               | routine  | 720 min     |
//! | 8 | otherwise, no notification                  | routine  | 720 min     |
//!
//! "Rising step" means the newest local reading is strictly above the one
//! before it. Without it rules 2, 3 and 6 fall through, so a river that has
//! plateaued or is receding at a high level does not keep re-triggering.
//!
//! The engine is pure. The caller owns `NotificationState` and advances it
//! only after a dispatch actually succeeded.

use chrono::{DateTime, FixedOffset, Timelike, Utc};

use crate::analysis;
use crate::config::{Config, ReintervalPolicy, RoutineWindow, Thresholds};
use crate::model::{Decision, NotificationState, Reading, Severity, Trigger, TrendResult};

// ---------------------------------------------------------------------------
// Inputs
// ---------------------------------------------------------------------------

/// Everything the engine needs besides the signals themselves.
#[derive(Debug, Clone)]
pub struct DecisionPolicy {
    pub thresholds: Thresholds,
    pub routine: RoutineWindow,
    pub reinterval: ReintervalPolicy,
    /// Wall clock used to evaluate the routine windows.
    pub local_offset: FixedOffset,
}

impl DecisionPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            thresholds: config.thresholds.clone(),
            routine: config.routine.clone(),
            reinterval: config.reinterval.clone(),
            local_offset: config.polling.utc_offset(),
        }
    }
}

/// The local station's latest reading and derived features.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalSignal {
    pub latest: Reading,
    pub trend: TrendResult,
    /// Change versus the immediately preceding reading.
    pub last_step_cm: Option<f64>,
}

impl LocalSignal {
    /// Builds the signal from readings sorted newest first. `None` if empty.
    pub fn from_readings(readings: &[Reading]) -> Option<Self> {
        let latest = readings.first()?.clone();
        Some(Self {
            latest,
            trend: analysis::analyze(readings),
            last_step_cm: analysis::last_step_cm(readings),
        })
    }

    fn strictly_rising(&self) -> bool {
        matches!(self.last_step_cm, Some(step) if step > 0.0)
    }

    fn velocity_at_least(&self, threshold: f64) -> Option<f64> {
        self.trend.velocity_cm_per_hour.filter(|v| *v >= threshold)
    }
}

/// The short-horizon upstream station's latest reading and its jump since
/// the previous reading.
#[derive(Debug, Clone, PartialEq)]
pub struct UpstreamStep {
    pub latest: Reading,
    pub delta_cm: f64,
}

impl UpstreamStep {
    /// Needs at least two readings, newest first.
    pub fn from_readings(readings: &[Reading]) -> Option<Self> {
        let delta_cm = analysis::last_step_cm(readings)?;
        Some(Self {
            latest: readings[0].clone(),
            delta_cm,
        })
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

struct Candidate {
    severity: Severity,
    trigger: Trigger,
    reason: String,
    notify: bool,
}

/// Runs the cascade, then applies rate gating against `state`.
///
/// Missing upstream signals are not errors: their rules simply do not match.
pub fn decide(
    local: &LocalSignal,
    upstream_short: Option<&UpstreamStep>,
    upstream_long: Option<&TrendResult>,
    state: &NotificationState,
    now: DateTime<Utc>,
    policy: &DecisionPolicy,
) -> Decision {
    let candidate = select(local, upstream_short, upstream_long, now, policy);
    let min_reinterval_minutes = policy.reinterval.for_severity(candidate.severity);

    let should_notify = candidate.notify && {
        // Routine bulletins only need the short gap; the window itself
        // limits them to twice a day.
        let gate_minutes = if candidate.trigger == Trigger::RoutineWindow {
            policy.routine.min_gap_minutes
        } else {
            min_reinterval_minutes
        };
        gate_open(state, now, gate_minutes)
    };

    Decision {
        should_notify,
        severity: candidate.severity,
        trigger: candidate.trigger,
        min_reinterval_minutes,
        reason: candidate.reason,
    }
}

fn select(
    local: &LocalSignal,
    upstream_short: Option<&UpstreamStep>,
    upstream_long: Option<&TrendResult>,
    now: DateTime<Utc>,
    policy: &DecisionPolicy,
) -> Candidate {
    let t = &policy.thresholds;
    let level = local.latest.level_cm;
    let rising = local.strictly_rising();

    if let Some(step) = upstream_short.filter(|s| s.delta_cm >= t.upstream_critical_delta_cm) {
        return notify(
            Severity::Critical,
            Trigger::UpstreamSurge,
            format!("upstream surge (+{:.0}cm at {})", step.delta_cm, step.latest.station_id),
        );
    }

    if rising {
        if let Some(v) = local.velocity_at_least(t.panic_velocity_cm_h) {
            return notify(
                Severity::Critical,
                Trigger::RapidLocalRise,
                format!("rapid local rise (+{:.1}cm/h)", v),
            );
        }
        if level >= t.severe_level_cm {
            return notify(
                Severity::Critical,
                Trigger::SevereLevel,
                format!("severe level ({:.0}cm)", level),
            );
        }
    }

    if let Some(v) = upstream_long
        .and_then(|trend| trend.velocity_cm_per_hour)
        .filter(|v| *v >= t.upstream_long_velocity_cm_h)
    {
        return notify(
            Severity::Warning,
            Trigger::IncomingWave,
            format!("incoming wave (+{:.1}cm/h upstream)", v),
        );
    }

    if level >= t.alert_level_cm {
        return notify(
            Severity::Warning,
            Trigger::AlertLevel,
            format!("alert level ({:.0}cm)", level),
        );
    }

    if rising {
        if let Some(v) = local.velocity_at_least(t.moderate_velocity_cm_h) {
            return notify(
                Severity::Warning,
                Trigger::GradualRise,
                format!("gradual rise (+{:.1}cm/h)", v),
            );
        }
    }

    let local_now = now.with_timezone(&policy.local_offset);
    if policy.routine.contains(local_now.hour(), local_now.minute()) {
        let severity = match t.watch_level_cm {
            Some(watch) if level >= watch => Severity::Watch,
            _ => Severity::Routine,
        };
        return notify(
            severity,
            Trigger::RoutineWindow,
            format!("routine bulletin ({:02}h window)", local_now.hour()),
        );
    }

    Candidate {
        severity: Severity::Routine,
        trigger: Trigger::Stable,
        reason: "stable".to_string(),
        notify: false,
    }
}

fn notify(severity: Severity, trigger: Trigger, reason: String) -> Candidate {
    Candidate {
        severity,
        trigger,
        reason,
        notify: true,
    }
}

/// Never-notified state always passes.
fn gate_open(state: &NotificationState, now: DateTime<Utc>, gate_minutes: i64) -> bool {
    state
        .minutes_since_last(now)
        .is_none_or(|elapsed| elapsed >= gate_minutes)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
