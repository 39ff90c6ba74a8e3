//! Access authority: token issuance and check-in verification
//!
//! Check-in runs these checks in order, stopping at the first failure:
//! 1. Token decodes and its HMAC signature matches the signing key
//! 2. Token has not expired
//! 3. Token was issued for this gym
//! 4. Member exists
//! 5. Member has an active membership at this gym
//! 6. That membership has not passed its end date
//!
//! Every attempt lands in the attendance log, including denials.

use chrono::{DateTime, Utc};
use gymgate_common::api::CheckInData;
use gymgate_common::{token, AccessToken, AttendanceRecord, AttendanceStatus, TokenError, TokenKey};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::attendance::AttendanceLog;
use crate::directory::{Member, MemberDirectory, Membership};

/// Reason an issuance or check-in was refused
///
/// The display strings are shown verbatim at the gate.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AccessDenied {
    #[error("QR Code has expired. Please refresh.")]
    TokenExpired,

    #[error("Invalid QR Code")]
    InvalidToken,

    #[error("Token not valid for this gym")]
    WrongGym,

    #[error("Member not found")]
    MemberNotFound,

    #[error("No active membership found for this gym")]
    NoActiveMembership,

    #[error("Membership has expired")]
    MembershipExpired,
}

pub struct AccessAuthority {
    directory: Arc<dyn MemberDirectory>,
    attendance: AttendanceLog,
    key: TokenKey,
    token_ttl: Duration,
}

impl AccessAuthority {
    pub fn new(directory: Arc<dyn MemberDirectory>, key: TokenKey, token_ttl: Duration) -> Self {
        Self {
            directory,
            attendance: AttendanceLog::new(),
            key,
            token_ttl,
        }
    }

    pub fn token_ttl(&self) -> Duration {
        self.token_ttl
    }

    pub fn attendance(&self) -> &AttendanceLog {
        &self.attendance
    }

    /// Mint a token for a member with a current membership at `gym_id`
    pub async fn issue(
        &self,
        gym_id: &str,
        member_id: &str,
        now: DateTime<Utc>,
    ) -> Result<AccessToken, AccessDenied> {
        let (member, _) = self.eligible(gym_id, member_id, now).await?;
        let issued = token::issue(&member.member_id, gym_id, &self.key, self.token_ttl, now);
        debug!(
            "Issued token for member {} at gym {} (expires {})",
            member_id, gym_id, issued.expires_at
        );
        Ok(issued)
    }

    /// Verify a scanned token for `gym_id` and record the attempt
    pub async fn check_in(
        &self,
        gym_id: &str,
        raw_token: &str,
        now: DateTime<Utc>,
    ) -> Result<CheckInData, AccessDenied> {
        let mut record = AttendanceRecord {
            id: Uuid::new_v4(),
            gym_id: gym_id.to_string(),
            member_id: None,
            member_name: None,
            photo_url: None,
            check_in: now,
            status: AttendanceStatus::Denied,
            expiry_date: None,
            notes: None,
        };

        let outcome = self.admit(gym_id, raw_token, now, &mut record).await;
        match &outcome {
            Ok(_) => {
                record.status = AttendanceStatus::CheckedIn;
                info!(
                    "Check-in granted: gym={} member={}",
                    gym_id,
                    record.member_id.as_deref().unwrap_or("?")
                );
            }
            Err(reason) => {
                record.notes = Some(reason.to_string());
                warn!(
                    "Check-in denied: gym={} member={} reason={}",
                    gym_id,
                    record.member_id.as_deref().unwrap_or("?"),
                    reason
                );
            }
        }
        self.attendance.record(record);

        outcome
    }

    async fn admit(
        &self,
        gym_id: &str,
        raw_token: &str,
        now: DateTime<Utc>,
        record: &mut AttendanceRecord,
    ) -> Result<CheckInData, AccessDenied> {
        let claims = match token::verify(raw_token, &self.key, now) {
            Ok(claims) => claims,
            Err(TokenError::Expired { member_id, .. }) => {
                record.member_id = Some(member_id);
                return Err(AccessDenied::TokenExpired);
            }
            Err(e) => {
                debug!("Rejected token: {}", e);
                return Err(AccessDenied::InvalidToken);
            }
        };
        record.member_id = Some(claims.member_id.clone());

        if claims.gym_id != gym_id {
            return Err(AccessDenied::WrongGym);
        }

        let (member, membership) = self.eligible(gym_id, &claims.member_id, now).await?;
        record.member_name = Some(member.full_name.clone());
        record.photo_url = member.photo_url.clone();
        record.expiry_date = membership.subscription_end;

        Ok(CheckInData {
            member_name: Some(member.full_name),
            photo_url: member.photo_url,
            subscription_expiry: membership.subscription_end,
        })
    }

    async fn eligible(
        &self,
        gym_id: &str,
        member_id: &str,
        now: DateTime<Utc>,
    ) -> Result<(Member, Membership), AccessDenied> {
        let member = self
            .directory
            .member(member_id)
            .await
            .ok_or(AccessDenied::MemberNotFound)?;

        let membership = self
            .directory
            .active_membership(member_id, gym_id)
            .await
            .ok_or(AccessDenied::NoActiveMembership)?;

        if membership.is_expired(now) {
            return Err(AccessDenied::MembershipExpired);
        }

        Ok((member, membership))
    }
}
