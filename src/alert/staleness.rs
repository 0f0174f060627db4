//! Reading staleness detection.
//!
//! ANA telemetry normally reports every 15 minutes, but stations drop out for
//! hours at a time. During a flood a silent gauge is dangerous: the level in
//! the last notification may be far from the truth. Staleness is reported
//! in the status line and logs; it does not change the decision.
//!
//! # Clock injection
//! All functions accept a `now: DateTime<Utc>` parameter rather than calling
//! `Utc::now()` internally, which keeps the checks deterministic in tests.

use chrono::{DateTime, Utc};

use crate::model::Reading;

/// Age of the reading in whole minutes relative to `now`.
pub fn age_minutes(reading: &Reading, now: DateTime<Utc>) -> i64 {
    (now - reading.timestamp).num_minutes()
}

/// Returns `true` if the reading is older than `max_age_minutes`.
///
/// Staleness is strictly greater than the threshold:
///   age > max_age_minutes  →  stale
///   age == max_age_minutes →  not stale
///
/// A reading stamped in the future (station clock ahead) is never stale.
pub fn is_stale_at(reading: &Reading, max_age_minutes: i64, now: DateTime<Utc>) -> bool {
    age_minutes(reading, now) > max_age_minutes
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, TimeZone};

    fn reading_at(timestamp: DateTime<Utc>) -> Reading {
        Reading::new("56696000", timestamp, 512.0)
    }

    /// A fixed "now" used across all tests: 2026-01-10 13:00:00 UTC.
    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 10, 13, 0, 0).unwrap()
    }

    fn minutes_ago(mins: i64) -> DateTime<Utc> {
        fixed_now() - chrono::Duration::minutes(mins)
    }

    // --- Not stale ----------------------------------------------------------

    #[test]
    fn test_reading_5_minutes_old_is_not_stale() {
        assert!(!is_stale_at(&reading_at(minutes_ago(5)), 15, fixed_now()));
    }

    #[test]
    fn test_reading_exactly_at_threshold_is_not_stale() {
        assert!(
            !is_stale_at(&reading_at(minutes_ago(15)), 15, fixed_now()),
            "staleness is strictly greater than, not >="
        );
    }

    #[test]
    fn test_local_wall_clock_reading_compares_in_utc() {
        // 10:00 at UTC-3 is 13:00 UTC, zero minutes old.
        let brt = FixedOffset::west_opt(3 * 3600).unwrap();
        let local = brt.with_ymd_and_hms(2026, 1, 10, 10, 0, 0).unwrap();
        let reading = reading_at(local.with_timezone(&Utc));
        assert_eq!(age_minutes(&reading, fixed_now()), 0);
        assert!(!is_stale_at(&reading, 15, fixed_now()));
    }

    #[test]
    fn test_future_reading_is_not_stale() {
        let reading = reading_at(fixed_now() + chrono::Duration::minutes(10));
        assert!(!is_stale_at(&reading, 15, fixed_now()));
    }

    // --- Stale --------------------------------------------------------------

    #[test]
    fn test_reading_one_minute_past_threshold_is_stale() {
        assert!(is_stale_at(&reading_at(minutes_ago(16)), 15, fixed_now()));
    }

    #[test]
    fn test_reading_from_hours_ago_is_stale() {
        assert!(is_stale_at(&reading_at(minutes_ago(240)), 180, fixed_now()));
    }

    // --- Threshold variation ------------------------------------------------

    #[test]
    fn test_same_reading_stale_under_tight_threshold_not_under_loose() {
        let reading = reading_at(minutes_ago(30));
        assert!(is_stale_at(&reading, 20, fixed_now()));
        assert!(!is_stale_at(&reading, 60, fixed_now()));
    }
}
