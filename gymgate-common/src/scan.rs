//! Scan attempt, scan result and attendance record types
//!
//! `ScanResult` is the single shape used for a gate's own display and for
//! results received over a gym channel.

use crate::api::CheckInData;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Display name used when the authority grants access without a name
pub const DEFAULT_MEMBER_NAME: &str = "Member";

/// Denial reason used when the authority gives none
pub const DEFAULT_DENIAL_REASON: &str = "Invalid credential";

/// One decode event from the camera
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanAttempt {
    pub raw_payload: String,
    pub decoded_at: DateTime<Utc>,
}

impl ScanAttempt {
    pub fn new(raw_payload: impl Into<String>) -> Self {
        Self {
            raw_payload: raw_payload.into(),
            decoded_at: Utc::now(),
        }
    }
}

/// Classification of a scan
///
/// `Verifying` is a placeholder held only while the verification round
/// trip is in flight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ScanOutcome {
    Verifying,
    Granted {
        member_name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        photo_url: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        subscription_expiry: Option<DateTime<Utc>>,
    },
    Denied {
        reason: String,
    },
}

/// Classified outcome of validating a `ScanAttempt`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanResult {
    #[serde(flatten)]
    pub outcome: ScanOutcome,
    pub timestamp: DateTime<Utc>,
}

impl ScanResult {
    pub fn verifying() -> Self {
        Self {
            outcome: ScanOutcome::Verifying,
            timestamp: Utc::now(),
        }
    }

    /// Granted result built from the authority's member details
    pub fn granted(data: CheckInData) -> Self {
        Self {
            outcome: ScanOutcome::Granted {
                member_name: data
                    .member_name
                    .filter(|name| !name.trim().is_empty())
                    .unwrap_or_else(|| DEFAULT_MEMBER_NAME.to_string()),
                photo_url: data.photo_url,
                subscription_expiry: data.subscription_expiry,
            },
            timestamp: Utc::now(),
        }
    }

    /// Denied result; blank or missing reasons fall back to the generic one
    pub fn denied(reason: Option<String>) -> Self {
        Self {
            outcome: ScanOutcome::Denied {
                reason: reason
                    .filter(|r| !r.trim().is_empty())
                    .unwrap_or_else(|| DEFAULT_DENIAL_REASON.to_string()),
            },
            timestamp: Utc::now(),
        }
    }

    /// True for `Granted` and `Denied`
    pub fn is_terminal(&self) -> bool {
        !matches!(self.outcome, ScanOutcome::Verifying)
    }

    pub fn is_granted(&self) -> bool {
        matches!(self.outcome, ScanOutcome::Granted { .. })
    }

    /// Short label for logs
    pub fn status_str(&self) -> &'static str {
        match self.outcome {
            ScanOutcome::Verifying => "verifying",
            ScanOutcome::Granted { .. } => "granted",
            ScanOutcome::Denied { .. } => "denied",
        }
    }
}

/// Attendance record status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttendanceStatus {
    CheckedIn,
    Denied,
}

/// One check-in attempt as stored by the authority
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttendanceRecord {
    pub id: Uuid,
    pub gym_id: String,
    #[serde(default)]
    pub member_id: Option<String>,
    #[serde(default)]
    pub member_name: Option<String>,
    #[serde(default)]
    pub photo_url: Option<String>,
    pub check_in: DateTime<Utc>,
    pub status: AttendanceStatus,
    #[serde(default)]
    pub expiry_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub notes: Option<String>,
}
