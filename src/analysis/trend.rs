//! Direction and velocity of a station's level.
//!
//! Telemetry arrives at irregular intervals, so the velocity reference is not
//! "the reading exactly one hour ago" but the reading closest to one hour
//! before the newest, accepted anywhere in a 0.8h–1.2h band. The divisor is
//! the actual elapsed time between the two points.

use chrono::{DateTime, Duration, Utc};

use crate::model::{Direction, Reading, TrendResult};

/// Accepted distance of the reference reading from the newest one, in hours.
pub const REFERENCE_BAND_HOURS: (f64, f64) = (0.8, 1.2);

/// Derives direction, magnitude and velocity from readings sorted newest first.
///
/// Fewer than two readings is the neutral result (`steady`, 0, 0). When no
/// reading falls inside the reference band the velocity is undetermined.
pub fn analyze(readings: &[Reading]) -> TrendResult {
    let Some((newest, older)) = readings.split_first() else {
        return TrendResult::neutral();
    };
    if older.is_empty() {
        return TrendResult::neutral();
    }

    let Some(reference) = find_reference(newest, older) else {
        return TrendResult::undetermined();
    };

    let delta = newest.level_cm - reference.level_cm;
    let elapsed = hours_between(reference.timestamp, newest.timestamp);

    TrendResult {
        direction: direction_of(delta),
        magnitude_cm: delta.abs(),
        velocity_cm_per_hour: Some(delta / elapsed),
    }
}

/// Level change between the newest reading and the one right before it.
pub fn last_step_cm(readings: &[Reading]) -> Option<f64> {
    match readings {
        [newest, previous, ..] => Some(newest.level_cm - previous.level_cm),
        _ => None,
    }
}

/// Human-readable trend of the last step, e.g. `rising (+12cm)`.
pub fn step_trend(readings: &[Reading]) -> String {
    match last_step_cm(readings) {
        Some(step) if step > 0.0 => format!("rising (+{:.0}cm)", step),
        Some(step) if step < 0.0 => format!("falling ({:.0}cm)", step),
        _ => "steady".to_string(),
    }
}

fn find_reference<'a>(newest: &Reading, older: &'a [Reading]) -> Option<&'a Reading> {
    let (low, high) = REFERENCE_BAND_HOURS;
    let target = newest.timestamp - Duration::hours(1);
    older
        .iter()
        .filter(|r| {
            let age = hours_between(r.timestamp, newest.timestamp);
            age >= low && age <= high
        })
        .min_by_key(|r| (r.timestamp - target).num_milliseconds().abs())
}

fn hours_between(earlier: DateTime<Utc>, later: DateTime<Utc>) -> f64 {
    (later - earlier).num_milliseconds() as f64 / 3_600_000.0
}

fn direction_of(delta: f64) -> Direction {
    if delta > 0.0 {
        Direction::Rising
    } else if delta < 0.0 {
        Direction::Falling
    } else {
        Direction::Steady
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 10, 15, 0, 0).unwrap()
    }

    /// Builds readings from (minutes before now, level) pairs, newest first.
    fn series(points: &[(i64, f64)]) -> Vec<Reading> {
        points
            .iter()
            .map(|(mins, level)| Reading::new("56696000", now() - Duration::minutes(*mins), *level))
            .collect()
    }

    #[test]
    fn test_empty_input_is_neutral() {
        assert_eq!(analyze(&[]), TrendResult::neutral());
    }

    #[test]
    fn test_single_reading_is_neutral() {
        let result = analyze(&series(&[(0, 512.0)]));
        assert_eq!(result.direction, Direction::Steady);
        assert_eq!(result.magnitude_cm, 0.0);
        assert_eq!(result.velocity_cm_per_hour, Some(0.0));
    }

    #[test]
    fn test_exact_hour_reference_gives_plain_difference() {
        let result = analyze(&series(&[(0, 820.0), (15, 812.0), (60, 790.0), (120, 770.0)]));
        assert_eq!(result.direction, Direction::Rising);
        assert_eq!(result.magnitude_cm, 30.0);
        assert_eq!(result.velocity_cm_per_hour, Some(30.0));
    }

    #[test]
    fn test_velocity_divides_by_actual_elapsed_time() {
        // Reference 50 minutes back: 10cm in 5/6 h = 12 cm/h.
        let result = analyze(&series(&[(0, 610.0), (50, 600.0)]));
        let velocity = result.velocity_cm_per_hour.unwrap();
        assert!((velocity - 12.0).abs() < 1e-9, "got {}", velocity);
    }

    #[test]
    fn test_picks_reading_closest_to_one_hour() {
        // 55 and 70 minutes both fall in the band; 55 is closer to 60.
        let result = analyze(&series(&[(0, 700.0), (55, 689.0), (70, 600.0)]));
        assert_eq!(result.magnitude_cm, 11.0);
    }

    #[test]
    fn test_band_edges_are_inclusive() {
        let at_low_edge = analyze(&series(&[(0, 500.0), (48, 490.0)]));
        assert!(at_low_edge.velocity_cm_per_hour.is_some());
        let at_high_edge = analyze(&series(&[(0, 500.0), (72, 490.0)]));
        assert!(at_high_edge.velocity_cm_per_hour.is_some());
    }

    #[test]
    fn test_no_reading_in_band_is_undetermined_not_zero() {
        // Only 15 minutes and 3 hours of history.
        let result = analyze(&series(&[(0, 500.0), (15, 495.0), (180, 450.0)]));
        assert_eq!(result.velocity_cm_per_hour, None);
        assert_eq!(result, TrendResult::undetermined());
    }

    #[test]
    fn test_falling_velocity_is_negative() {
        let result = analyze(&series(&[(0, 580.0), (60, 600.0)]));
        assert_eq!(result.direction, Direction::Falling);
        assert_eq!(result.magnitude_cm, 20.0);
        assert_eq!(result.velocity_cm_per_hour, Some(-20.0));
    }

    #[test]
    fn test_equal_levels_are_steady() {
        let result = analyze(&series(&[(0, 580.0), (60, 580.0)]));
        assert_eq!(result.direction, Direction::Steady);
        assert_eq!(result.velocity_cm_per_hour, Some(0.0));
    }

    #[test]
    fn test_last_step() {
        assert_eq!(last_step_cm(&series(&[(0, 710.0), (15, 700.0)])), Some(10.0));
        assert_eq!(last_step_cm(&series(&[(0, 710.0)])), None);
    }

    #[test]
    fn test_step_trend_labels() {
        assert_eq!(step_trend(&series(&[(0, 712.0), (15, 700.0)])), "rising (+12cm)");
        assert_eq!(step_trend(&series(&[(0, 695.0), (15, 700.0)])), "falling (-5cm)");
        assert_eq!(step_trend(&series(&[(0, 700.0), (15, 700.0)])), "steady");
        assert_eq!(step_trend(&[]), "steady");
    }
}
