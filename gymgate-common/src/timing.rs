//! Access-control timing defaults
//!
//! The scan cooldown and the token TTL are independent: the cooldown bounds
//! how often one gate accepts a presentation, the TTL bounds how long a
//! rendered credential stays valid. Both are overridable through config.

use std::time::Duration;

/// Lifetime of an issued access token
pub const TOKEN_TTL: Duration = Duration::from_secs(30);

/// Minimum gap between two accepted scan attempts on one gate
pub const SCAN_COOLDOWN: Duration = Duration::from_secs(3);

/// How long a granted/denied result stays presented
pub const RESULT_DISPLAY_WINDOW: Duration = Duration::from_secs(4);

/// Delay between mounting the access station and acquiring the camera
pub const SCANNER_SETTLE_DELAY: Duration = Duration::from_millis(600);

/// Pause between the rear-camera failure and the front-camera attempt
pub const CAMERA_FALLBACK_DELAY: Duration = Duration::from_millis(200);

/// Upper bound on one verification round trip before it counts as denied
pub const VERIFY_TIMEOUT: Duration = Duration::from_secs(10);

/// Credential countdown tick
pub const COUNTDOWN_TICK: Duration = Duration::from_secs(1);

/// Retry delay after a failed token issuance
pub const ISSUANCE_RETRY_DELAY: Duration = Duration::from_secs(2);

/// Remaining seconds at or below which a credential is "expiring soon"
pub const EXPIRING_SOON_SECS: u64 = 5;

/// Gym status recompute interval
pub const STATUS_REFRESH_INTERVAL: Duration = Duration::from_secs(60);

/// Cap for the channel reconnect backoff
pub const RECONNECT_BACKOFF_MAX: Duration = Duration::from_secs(30);

/// Comment sent on an idle gym event stream
pub const CHANNEL_KEEPALIVE: Duration = Duration::from_secs(15);

/// Silence on a gym event stream after which a subscriber drops it
pub const CHANNEL_READ_TIMEOUT: Duration = Duration::from_secs(45);

/// Limit on opening the gym event stream connection
pub const CHANNEL_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Attendance records returned per log query
pub const ATTENDANCE_LOG_LIMIT: usize = 50;

/// Buffered events per gym channel before slow subscribers lag
pub const CHANNEL_CAPACITY: usize = 256;

/// Convert seconds from a config file to a duration, rejecting zero
pub fn non_zero_secs(secs: u64, fallback: Duration) -> Duration {
    if secs == 0 {
        fallback
    } else {
        Duration::from_secs(secs)
    }
}

/// Convert milliseconds from a config file to a duration, rejecting zero
pub fn non_zero_millis(millis: u64, fallback: Duration) -> Duration {
    if millis == 0 {
        fallback
    } else {
        Duration::from_millis(millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cooldown_is_shorter_than_display_window() {
        // A second physical scan cannot replace a result before it is readable.
        assert!(SCAN_COOLDOWN < RESULT_DISPLAY_WINDOW);
    }

    #[test]
    fn idle_stream_survives_several_keepalives() {
        assert!(CHANNEL_READ_TIMEOUT >= CHANNEL_KEEPALIVE * 2);
        assert!(CHANNEL_READ_TIMEOUT > VERIFY_TIMEOUT);
    }

    #[test]
    fn non_zero_secs_falls_back_on_zero() {
        assert_eq!(non_zero_secs(0, TOKEN_TTL), TOKEN_TTL);
        assert_eq!(non_zero_secs(45, TOKEN_TTL), Duration::from_secs(45));
    }

    #[test]
    fn non_zero_millis_falls_back_on_zero() {
        assert_eq!(non_zero_millis(0, SCAN_COOLDOWN), SCAN_COOLDOWN);
        assert_eq!(non_zero_millis(1500, SCAN_COOLDOWN), Duration::from_millis(1500));
    }
}
