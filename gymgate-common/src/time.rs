//! Timestamp utilities

use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Current wall-clock time in the host's local timezone
///
/// Gym schedules are expressed in gym-local `HH:MM`; a gate station runs in
/// the gym, so the host clock is the gym clock.
pub fn local_wall_clock() -> NaiveDateTime {
    Local::now().naive_local()
}

/// Unix epoch milliseconds for a timestamp
pub fn epoch_millis(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

/// Timestamp from Unix epoch milliseconds (None when out of range)
pub fn from_epoch_millis(millis: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(millis).single()
}

/// Time left until `deadline`, saturating at zero
pub fn remaining_until(deadline: DateTime<Utc>, now: DateTime<Utc>) -> std::time::Duration {
    (deadline - now).to_std().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_now_returns_valid_timestamp() {
        let timestamp = now();
        // Should be a reasonable timestamp (after year 2000)
        assert!(timestamp.timestamp() > 946_684_800);
    }

    #[test]
    fn test_epoch_millis_round_trip() {
        let at = from_epoch_millis(1_730_000_000_123).unwrap();
        assert_eq!(epoch_millis(at), 1_730_000_000_123);
    }

    #[test]
    fn test_remaining_until_saturates() {
        let base = from_epoch_millis(1_730_000_000_000).unwrap();
        let later = base + chrono::Duration::seconds(30);

        assert_eq!(remaining_until(later, base), Duration::from_secs(30));
        assert_eq!(remaining_until(base, later), Duration::ZERO);
    }
}
