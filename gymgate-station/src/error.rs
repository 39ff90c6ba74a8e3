//! Error types for gymgate-station

use thiserror::Error;

/// Failures talking to the hub
#[derive(Debug, Error)]
pub enum ClientError {
    /// Transport failure or non-JSON body
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Hub answered `success: false`; the message is shown as-is
    #[error("{0}")]
    Rejected(String),

    /// Hub answered `success: true` without the expected payload
    #[error("Unexpected response: {0}")]
    Protocol(String),
}

impl ClientError {
    /// Message suitable for the gate display, if the hub gave one
    pub fn display_reason(&self) -> Option<String> {
        match self {
            ClientError::Rejected(msg) if !msg.trim().is_empty() => Some(msg.clone()),
            _ => None,
        }
    }
}

/// Camera driver failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CameraError {
    /// Driver is already starting or stopping a stream
    #[error("Camera transition already in progress")]
    TransitionInProgress,

    #[error("No camera available for {0}")]
    NotFound(String),

    #[error("Camera permission denied")]
    PermissionDenied,

    /// Camera stopped delivering frames after it started
    #[error("Camera disconnected: {0}")]
    Disconnected(String),

    #[error("Camera error: {0}")]
    Other(String),
}

/// Channel subscription failures
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("Failed to open event stream: {0}")]
    Connect(String),

    #[error("Event stream closed")]
    Closed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_rejections_carry_a_display_reason() {
        assert_eq!(
            ClientError::Rejected("Membership has expired".to_string()).display_reason(),
            Some("Membership has expired".to_string())
        );
        assert_eq!(ClientError::Rejected("  ".to_string()).display_reason(), None);
        assert_eq!(ClientError::Protocol("no data".to_string()).display_reason(), None);
    }
}
