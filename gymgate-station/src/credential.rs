//! Member pass: rotating credential
//!
//! Keeps one valid access token on display for a `(member, gym)` pair. The
//! countdown ticks once a second; at zero the pass flips to `Generating`
//! and a fresh token is requested straight away. Failed requests retry
//! after a fixed delay. A token that is already expired when it arrives is
//! never shown.

use async_trait::async_trait;
use gymgate_common::api::IssuedToken;
use gymgate_common::timing::{COUNTDOWN_TICK, EXPIRING_SOON_SECS, ISSUANCE_RETRY_DELAY};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::ClientError;

/// Issues access tokens
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn issue_token(&self, gym_id: &str, member_id: &str) -> Result<IssuedToken, ClientError>;
}

/// What the member pass shows
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PassState {
    Generating,
    Active { token: String, remaining_secs: u64 },
}

impl PassState {
    pub fn token(&self) -> Option<&str> {
        match self {
            PassState::Active { token, .. } => Some(token),
            PassState::Generating => None,
        }
    }

    /// Five seconds or less left on the current token
    pub fn is_expiring_soon(&self) -> bool {
        matches!(
            self,
            PassState::Active { remaining_secs, .. } if *remaining_secs <= EXPIRING_SOON_SECS
        )
    }
}

/// Running rotation for one pass; dropping it stops the countdown
pub struct CredentialRotator {
    state: watch::Receiver<PassState>,
    task: JoinHandle<()>,
}

impl CredentialRotator {
    pub fn start(
        source: Arc<dyn TokenSource>,
        gym_id: impl Into<String>,
        member_id: impl Into<String>,
    ) -> Self {
        Self::with_retry_delay(source, gym_id, member_id, ISSUANCE_RETRY_DELAY)
    }

    pub fn with_retry_delay(
        source: Arc<dyn TokenSource>,
        gym_id: impl Into<String>,
        member_id: impl Into<String>,
        retry_delay: Duration,
    ) -> Self {
        let (tx, rx) = watch::channel(PassState::Generating);
        let gym_id = gym_id.into();
        let member_id = member_id.into();

        let task = tokio::spawn(async move {
            rotate(source, gym_id, member_id, retry_delay, tx).await;
        });

        Self { state: rx, task }
    }

    pub fn subscribe(&self) -> watch::Receiver<PassState> {
        self.state.clone()
    }

    pub fn current(&self) -> PassState {
        self.state.borrow().clone()
    }

    pub fn stop(&self) {
        self.task.abort();
    }
}

impl Drop for CredentialRotator {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn rotate(
    source: Arc<dyn TokenSource>,
    gym_id: String,
    member_id: String,
    retry_delay: Duration,
    tx: watch::Sender<PassState>,
) {
    loop {
        tx.send_replace(PassState::Generating);

        let issued = match source.issue_token(&gym_id, &member_id).await {
            Ok(issued) => issued,
            Err(e) => {
                warn!("Token issuance failed for member {}: {}", member_id, e);
                tokio::time::sleep(retry_delay).await;
                continue;
            }
        };

        let lifetime = issued.expires_at - gymgate_common::time::now();
        let lifetime = match lifetime.to_std() {
            Ok(lifetime) if !lifetime.is_zero() => lifetime,
            _ => {
                warn!("Received token already expired at {}, retrying", issued.expires_at);
                tokio::time::sleep(retry_delay).await;
                continue;
            }
        };
        debug!("New token for member {}, valid {}ms", member_id, lifetime.as_millis());

        let deadline = Instant::now() + lifetime;
        loop {
            let left = deadline.saturating_duration_since(Instant::now());
            if left.is_zero() {
                break;
            }
            tx.send_replace(PassState::Active {
                token: issued.token.clone(),
                remaining_secs: ceil_secs(left),
            });
            tokio::time::sleep(left.min(COUNTDOWN_TICK)).await;
        }
    }
}

fn ceil_secs(d: Duration) -> u64 {
    d.as_secs() + u64::from(d.subsec_nanos() > 0)
}
