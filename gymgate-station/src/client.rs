//! HTTP client for the hub
//!
//! Implements every collaborator trait the station needs against the hub's
//! REST API. All endpoints answer with the `ApiResponse` envelope, denials
//! included, so the body is decoded regardless of status code.

use async_trait::async_trait;
use gymgate_common::api::{
    ApiResponse, CheckInData, CheckInRequest, IssueTokenRequest, IssuedToken,
};
use gymgate_common::events::ScanEvent;
use gymgate_common::AttendanceRecord;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use crate::credential::TokenSource;
use crate::error::ClientError;
use crate::ingest::{AccessVerifier, ScanPublisher};
use crate::logs::AttendanceSource;

#[derive(Debug, Clone)]
pub struct HubClient {
    http: reqwest::Client,
    base_url: String,
}

impl HubClient {
    /// Client whose requests give up after `timeout`
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(http, base_url))
    }

    pub fn with_client(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn gym_url(&self, gym_id: &str, path: &str) -> String {
        format!("{}/api/gyms/{}/{}", self.base_url, gym_id, path)
    }
}

/// Unwrap an envelope into its data or a rejection
fn into_data<T>(envelope: ApiResponse<T>) -> Result<T, ClientError> {
    if !envelope.success {
        let reason = envelope.message.or(envelope.error).unwrap_or_default();
        return Err(ClientError::Rejected(reason));
    }
    envelope
        .data
        .ok_or_else(|| ClientError::Protocol("missing data".to_string()))
}

async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ClientError> {
    let status = response.status();
    let envelope: ApiResponse<T> = response.json().await?;
    debug!("Hub responded {} (success={})", status, envelope.success);
    into_data(envelope)
}

#[derive(Debug, Deserialize)]
struct PublishReceipt {
    delivered: usize,
}

#[async_trait]
impl AccessVerifier for HubClient {
    async fn check_in(&self, gym_id: &str, token: &str) -> Result<CheckInData, ClientError> {
        let response = self
            .http
            .post(self.gym_url(gym_id, "check-in"))
            .json(&CheckInRequest {
                token: token.to_string(),
            })
            .send()
            .await?;
        decode(response).await
    }
}

#[async_trait]
impl ScanPublisher for HubClient {
    async fn publish(&self, event: ScanEvent) -> Result<(), ClientError> {
        let response = self
            .http
            .post(self.gym_url(&event.gym_id, "events"))
            .json(&event)
            .send()
            .await?;
        let receipt: PublishReceipt = decode(response).await?;
        debug!("Scan delivered to {} sessions", receipt.delivered);
        Ok(())
    }
}

#[async_trait]
impl TokenSource for HubClient {
    async fn issue_token(&self, gym_id: &str, member_id: &str) -> Result<IssuedToken, ClientError> {
        let response = self
            .http
            .post(self.gym_url(gym_id, "access-token"))
            .json(&IssueTokenRequest {
                member_id: member_id.to_string(),
            })
            .send()
            .await?;
        decode(response).await
    }
}

#[async_trait]
impl AttendanceSource for HubClient {
    async fn fetch_logs(&self, gym_id: &str) -> Result<Vec<AttendanceRecord>, ClientError> {
        let response = self.http.get(self.gym_url(gym_id, "logs")).send().await?;
        decode(response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejection_carries_hub_message() {
        let envelope: ApiResponse<CheckInData> =
            ApiResponse::error("ACCESS_DENIED", "Invalid QR Code");
        match into_data(envelope) {
            Err(ClientError::Rejected(msg)) => assert_eq!(msg, "Invalid QR Code"),
            other => panic!("expected rejection, got {:?}", other),
        }
    }

    #[test]
    fn test_success_without_data_is_protocol_error() {
        let envelope: ApiResponse<CheckInData> = ApiResponse {
            success: true,
            data: None,
            message: None,
            error: None,
        };
        assert!(matches!(into_data(envelope), Err(ClientError::Protocol(_))));
    }

    #[test]
    fn test_trailing_slash_is_trimmed() {
        let client = HubClient::with_client(reqwest::Client::new(), "http://hub:5780/");
        assert_eq!(
            client.gym_url("gym-1", "logs"),
            "http://hub:5780/api/gyms/gym-1/logs"
        );
    }

    #[test]
    fn test_denied_publish_envelope_decodes_without_data() {
        let envelope: ApiResponse<PublishReceipt> =
            serde_json::from_str(r#"{"success":false,"message":"gym_id mismatch"}"#).unwrap();
        assert!(matches!(
            into_data(envelope),
            Err(ClientError::Rejected(ref m)) if m == "gym_id mismatch"
        ));
    }
}
