//! Recession ("falling river") detection.
//!
//! Informational only: it colours the notification context, never the
//! decision itself.

use crate::model::Reading;

/// True when the newest level is at or above `floor_cm` and the last three
/// readings are strictly decreasing. A flat step or an oscillation resets it.
pub fn is_receding(readings: &[Reading], floor_cm: f64) -> bool {
    match readings {
        [newest, middle, oldest, ..] => {
            newest.level_cm >= floor_cm
                && oldest.level_cm > middle.level_cm
                && middle.level_cm > newest.level_cm
        }
        _ => false,
    }
}
