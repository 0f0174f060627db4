//! End-to-end scenarios for the decision engine, driven through the public
//! API with the shipped `floodwatch.toml` thresholds:
//! alert 600, severe 760, moderate 10 cm/h, panic 30 cm/h,
//! upstream delta 40, upstream long velocity 50 cm/h, routine 07h/19h until :25.

use chrono::{DateTime, Duration, TimeZone, Utc};

use floodwatch_service::alert::{decide, DecisionPolicy, LocalSignal, UpstreamStep};
use floodwatch_service::analysis::analyze;
use floodwatch_service::config::Config;
use floodwatch_service::model::{NotificationState, Reading, Severity, Trigger};

const LOCAL: &str = "56696000";
const DAM: &str = "56688080";

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn config() -> Config {
    Config::load(std::path::Path::new(concat!(env!("CARGO_MANIFEST_DIR"), "/floodwatch.toml")))
        .expect("sample config must load")
}

fn policy() -> DecisionPolicy {
    DecisionPolicy::from_config(&config())
}

/// 15:00 in Timóteo, outside the routine windows.
fn afternoon() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 10, 18, 0, 0).unwrap()
}

/// 07:10 in Timóteo, inside the morning window.
fn morning_window() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 10, 10, 10, 0).unwrap()
}

fn readings(station: &str, now: DateTime<Utc>, points: &[(i64, f64)]) -> Vec<Reading> {
    points
        .iter()
        .map(|(mins, level)| Reading::new(station, now - Duration::minutes(*mins), *level))
        .collect()
}

fn signal(now: DateTime<Utc>, points: &[(i64, f64)]) -> LocalSignal {
    LocalSignal::from_readings(&readings(LOCAL, now, points)).unwrap()
}

fn rank(severity: Severity) -> u8 {
    match severity {
        Severity::Routine => 0,
        Severity::Watch => 1,
        Severity::Warning => 2,
        Severity::Critical => 3,
    }
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[test]
fn scenario_a_rapid_local_rise() {
    let now = afternoon();
    let local = signal(now, &[(0, 820.0), (60, 790.0)]);
    assert_eq!(local.trend.velocity_cm_per_hour, Some(30.0));

    let d = decide(&local, None, None, &NotificationState::default(), now, &policy());
    assert!(d.should_notify);
    assert_eq!(d.severity, Severity::Critical);
    assert!(d.reason.contains("rapid"), "reason was {}", d.reason);
}

#[test]
fn scenario_b_routine_bulletin() {
    let now = morning_window();
    let local = signal(now, &[(0, 500.0), (60, 500.0)]);
    let d = decide(&local, None, None, &NotificationState::default(), now, &policy());
    assert!(d.should_notify);
    assert_eq!(d.severity, Severity::Routine);
    assert_eq!(d.trigger, Trigger::RoutineWindow);
}

#[test]
fn scenario_c_routine_held_within_an_hour() {
    let now = morning_window();
    let local = signal(now, &[(0, 500.0), (60, 500.0)]);
    let state = NotificationState {
        last_notified_at: Some(now - Duration::minutes(20)),
        active_count: 3,
    };
    let d = decide(&local, None, None, &state, now, &policy());
    assert!(!d.should_notify);
}

#[test]
fn scenario_d_upstream_overrides_calm_river() {
    let now = afternoon();
    let local = signal(now, &[(0, 300.0), (60, 300.0)]);
    let dam = readings(DAM, now, &[(0, 245.0), (15, 200.0)]);
    let step = UpstreamStep::from_readings(&dam).unwrap();
    assert_eq!(step.delta_cm, 45.0);

    let d = decide(&local, Some(&step), None, &NotificationState::default(), now, &policy());
    assert!(d.should_notify);
    assert_eq!(d.severity, Severity::Critical);
    assert!(d.reason.contains("upstream"), "reason was {}", d.reason);
}

#[test]
fn incoming_wave_from_long_horizon_station() {
    let now = afternoon();
    let local = signal(now, &[(0, 350.0), (60, 350.0)]);
    let nova_era = analyze(&readings("56661000", now, &[(0, 460.0), (60, 400.0)]));

    let d = decide(&local, None, Some(&nova_era), &NotificationState::default(), now, &policy());
    assert_eq!(d.trigger, Trigger::IncomingWave);
    assert_eq!(d.severity, Severity::Warning);
}

// ---------------------------------------------------------------------------
// Properties
// ---------------------------------------------------------------------------

#[test]
fn severity_is_monotonic_in_level() {
    let p = policy();
    let state = NotificationState::default();
    for now in [afternoon(), morning_window()] {
        for velocity in [0.0, 5.0, 12.0, 35.0] {
            let mut previous = 0;
            for level in (200..=1000).step_by(10).map(f64::from) {
                // Same velocity and a rising last step at every level.
                let local = signal(now, &[(0, level), (15, level - 1.0), (60, level - velocity)]);
                let d = decide(&local, None, None, &state, now, &p);
                let r = rank(d.severity);
                assert!(
                    r >= previous,
                    "severity dropped at {}cm, velocity {}: {:?}",
                    level,
                    velocity,
                    d
                );
                previous = r;
            }
        }
    }
}

#[test]
fn immediate_repeat_is_suppressed() {
    let p = policy();
    let now = afternoon();
    let local = signal(now, &[(0, 640.0), (15, 630.0), (60, 600.0)]);

    let first = decide(&local, None, None, &NotificationState::default(), now, &p);
    assert!(first.should_notify);
    assert!(first.min_reinterval_minutes > 0);

    let (after, _) = NotificationState::default().record_delivery(now, 9, 3);
    let second = decide(&local, None, None, &after, now, &p);
    assert!(!second.should_notify);
    assert_eq!(second.severity, first.severity);
}

#[test]
fn plateau_does_not_trigger_gradual_rise() {
    // Alert level raised out of the way so only the velocity rules apply.
    let mut p = policy();
    p.thresholds.alert_level_cm = 740.0;
    let now = afternoon();
    // 700 -> 710 -> 710: +10 cm/h over the hour, flat last step.
    let local = signal(now, &[(0, 710.0), (15, 710.0), (60, 700.0)]);
    assert_eq!(local.trend.velocity_cm_per_hour, Some(10.0));

    let d = decide(&local, None, None, &NotificationState::default(), now, &p);
    assert_ne!(d.trigger, Trigger::GradualRise);
    assert!(!d.should_notify);

    // The same history with a rising last step does trigger.
    let rising = signal(now, &[(0, 710.0), (15, 705.0), (60, 700.0)]);
    let d = decide(&rising, None, None, &NotificationState::default(), now, &p);
    assert_eq!(d.trigger, Trigger::GradualRise);
}

#[test]
fn missing_upstream_data_falls_through() {
    let now = afternoon();
    let local = signal(now, &[(0, 620.0), (15, 618.0)]);
    let d = decide(&local, None, None, &NotificationState::default(), now, &policy());
    assert_eq!(d.trigger, Trigger::AlertLevel);
}
