//! Shared API request/response types
//!
//! Used by the hub handlers and by the station's HTTP client so both sides
//! agree on the wire format.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Response envelope for every `/api` endpoint
///
/// # Examples
///
/// ```
/// use gymgate_common::api::ApiResponse;
///
/// let ok = ApiResponse::ok(42, "done");
/// assert!(ok.success);
///
/// let err: ApiResponse<()> = ApiResponse::failure("Invalid QR Code");
/// assert_eq!(err.message.as_deref(), Some("Invalid QR Code"));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T, message: impl Into<String>) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: Some(message.into()),
            error: None,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            message: Some(message.into()),
            error: None,
        }
    }

    /// Failure with a machine-readable error code alongside the message
    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            message: Some(message.into()),
            error: Some(code.into()),
        }
    }
}

/// POST /api/gyms/:gym_id/access-token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssueTokenRequest {
    pub member_id: String,
}

/// Issued token as returned to the member client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssuedToken {
    pub token: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// POST /api/gyms/:gym_id/check-in
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckInRequest {
    pub token: String,
}

/// Member details returned by a successful check-in
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CheckInData {
    #[serde(default)]
    pub member_name: Option<String>,
    #[serde(default)]
    pub photo_url: Option<String>,
    #[serde(default)]
    pub subscription_expiry: Option<DateTime<Utc>>,
}

/// Verification authority answer, success or denial
pub type CheckInResponse = ApiResponse<CheckInData>;
