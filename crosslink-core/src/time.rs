//! Wall-clock helpers.

use std::time::{SystemTime, UNIX_EPOCH};

/// Milliseconds since the unix epoch.
///
/// Used only for the informational `timestamp` field of outbound envelopes.
/// Expiry and timeouts run on `tokio::time::Instant` so they can be driven
/// by a paused clock in tests. A clock set before 1970 yields `0`.
pub fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
