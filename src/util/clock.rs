//! Wall-clock helpers.

use std::time::{SystemTime, UNIX_EPOCH};

/// Milliseconds since the Unix epoch.
///
/// Returns 0 if the system clock is set before the epoch.
pub fn now_ms() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0)
}

/// UTC hour of day (0-23) for a millisecond timestamp.
pub fn hour_of_day(ms: u128) -> u8 {
    // Always < 24, so the narrowing cast is lossless.
    ((ms / 3_600_000) % 24) as u8
}
