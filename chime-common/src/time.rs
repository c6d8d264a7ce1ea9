//! Time conversion helpers

use std::time::Duration;

/// Convert milliseconds to duration
pub fn millis_to_duration(millis: u64) -> Duration {
    Duration::from_millis(millis)
}

/// Convert a signed millisecond delay to a duration.
///
/// Zero and negative delays map to `Duration::ZERO`.
pub fn signed_millis_to_duration(millis: i64) -> Duration {
    if millis <= 0 {
        Duration::ZERO
    } else {
        Duration::from_millis(millis as u64)
    }
}

/// Convert a duration to fractional seconds for clock arithmetic
pub fn duration_to_secs_f64(duration: Duration) -> f64 {
    duration.as_secs_f64()
}
