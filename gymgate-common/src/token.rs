//! Rotating access tokens
//!
//! # Format
//!
//! `<payload>.<signature>`, both URL-safe base64 without padding:
//! - payload: JSON of the [`TokenClaims`]
//! - signature: HMAC-SHA-256 of the encoded payload under the [`TokenKey`]
//!
//! Only the holder of the key (the authority) can mint or verify tokens;
//! gate stations treat them as opaque strings.

use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

use crate::time::{epoch_millis, remaining_until};

type HmacSha256 = Hmac<Sha256>;

/// Shortest accepted signing key (256 bits)
pub const MIN_KEY_LEN: usize = 32;

/// Token verification failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    /// Not `<payload>.<signature>`, not base64, not JSON, or missing claims
    #[error("Malformed token: {0}")]
    Malformed(String),

    /// Signature does not match the payload under the signing key
    #[error("Invalid token signature")]
    InvalidSignature,

    /// Signature is fine but the token is past `expires_at`
    #[error("Token expired at {expires_at} (member {member_id})")]
    Expired { member_id: String, expires_at: i64 },

    /// Signing key is unusable
    #[error("Invalid signing key: {0}")]
    InvalidKey(String),
}

/// HMAC-SHA-256 signing key shared by issuance and verification
#[derive(Clone)]
pub struct TokenKey {
    mac: HmacSha256,
}

impl fmt::Debug for TokenKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("TokenKey(..)")
    }
}

impl TokenKey {
    /// Key from raw bytes; at least [`MIN_KEY_LEN`] bytes
    pub fn new(bytes: &[u8]) -> Result<Self, TokenError> {
        if bytes.len() < MIN_KEY_LEN {
            return Err(TokenError::InvalidKey(format!(
                "{} bytes, need at least {}",
                bytes.len(),
                MIN_KEY_LEN
            )));
        }
        let mac = HmacSha256::new_from_slice(bytes)
            .map_err(|e| TokenError::InvalidKey(e.to_string()))?;
        Ok(Self { mac })
    }

    /// Key from its standard base64 form (as written in config files)
    pub fn from_base64(encoded: &str) -> Result<Self, TokenError> {
        let bytes = STANDARD
            .decode(encoded.trim())
            .map_err(|e| TokenError::InvalidKey(format!("not base64: {}", e)))?;
        Self::new(&bytes)
    }

    /// Fresh random 256-bit key
    pub fn generate() -> Result<Self, TokenError> {
        use rand::RngCore;

        let mut bytes = [0u8; MIN_KEY_LEN];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self::new(&bytes)
    }

    fn signature(&self, payload: &str) -> HmacSha256 {
        let mut mac = self.mac.clone();
        mac.update(payload.as_bytes());
        mac
    }
}

/// Signed claims carried by an access token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    pub member_id: String,
    pub gym_id: String,
    /// Unix epoch milliseconds
    pub issued_at: i64,
    /// Unix epoch milliseconds
    pub expires_at: i64,
    /// Makes two tokens minted in the same millisecond distinct
    pub nonce: String,
}

/// An issued token with its validity window
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessToken {
    pub token: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl AccessToken {
    /// True once `now` reaches `expires_at`
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Validity left at `now`, zero once expired
    pub fn remaining(&self, now: DateTime<Utc>) -> Duration {
        remaining_until(self.expires_at, now)
    }
}

/// Mint a token for `(member_id, gym_id)` valid for `ttl` from `now`
pub fn issue(
    member_id: &str,
    gym_id: &str,
    key: &TokenKey,
    ttl: Duration,
    now: DateTime<Utc>,
) -> AccessToken {
    let ttl = chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::zero());
    let expires = now + ttl;
    let claims = TokenClaims {
        member_id: member_id.to_string(),
        gym_id: gym_id.to_string(),
        issued_at: epoch_millis(now),
        expires_at: epoch_millis(expires),
        nonce: Uuid::new_v4().simple().to_string(),
    };

    AccessToken {
        token: sign(&claims, key),
        issued_at: now,
        expires_at: expires,
    }
}

/// Encode and sign `claims`
pub fn sign(claims: &TokenClaims, key: &TokenKey) -> String {
    // TokenClaims only holds strings and integers, serialization cannot fail
    let json = serde_json::to_vec(claims).unwrap_or_default();
    let payload = URL_SAFE_NO_PAD.encode(json);
    let signature = key.signature(&payload).finalize().into_bytes();
    format!("{}.{}", payload, URL_SAFE_NO_PAD.encode(signature))
}

/// Verify signature and expiry, returning the claims
///
/// Signature is checked (in constant time) before expiry so an expired
/// token still tells the authority which member presented it.
pub fn verify(
    token: &str,
    key: &TokenKey,
    now: DateTime<Utc>,
) -> Result<TokenClaims, TokenError> {
    let (payload, signature) = token
        .trim()
        .split_once('.')
        .ok_or_else(|| TokenError::Malformed("missing signature".to_string()))?;
    let signature = URL_SAFE_NO_PAD
        .decode(signature)
        .map_err(|e| TokenError::Malformed(format!("signature not base64: {}", e)))?;

    key.signature(payload)
        .verify_slice(&signature)
        .map_err(|_| TokenError::InvalidSignature)?;

    let json = URL_SAFE_NO_PAD
        .decode(payload)
        .map_err(|e| TokenError::Malformed(format!("payload not base64: {}", e)))?;
    let claims: TokenClaims =
        serde_json::from_slice(&json).map_err(|e| TokenError::Malformed(e.to_string()))?;

    if epoch_millis(now) >= claims.expires_at {
        return Err(TokenError::Expired {
            member_id: claims.member_id,
            expires_at: claims.expires_at,
        });
    }

    Ok(claims)
}
