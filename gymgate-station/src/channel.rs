//! Gym channel subscriber
//!
//! A dashboard session joins its gym's channel and, for every scan event:
//! - invalidates the attendance log cache
//! - presents the result like a local scan, unless this session produced it
//!
//! When the connection drops it reconnects with exponential backoff capped
//! at 30 seconds. Events missed while disconnected are not replayed.

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use gymgate_common::timing::{
    CHANNEL_CONNECT_TIMEOUT, CHANNEL_READ_TIMEOUT, RECONNECT_BACKOFF_MAX,
};
use gymgate_common::{GymChannels, GymEvent};
use reqwest_eventsource::{retry, Event as SseEvent, EventSource};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::ChannelError;
use crate::logs::AttendanceLogCache;
use crate::presentation::ResultPresenter;

pub type EventStream = BoxStream<'static, Result<GymEvent, ChannelError>>;

/// Way of joining a gym channel
#[async_trait]
pub trait ChannelTransport: Send + Sync {
    /// Join `gym_id`; the stream ends (or yields an error) on disconnect
    async fn connect(&self, gym_id: &str) -> Result<EventStream, ChannelError>;
}

/// Joins over the hub's SSE endpoint
pub struct SseTransport {
    client: reqwest::Client,
    base_url: String,
}

impl SseTransport {
    /// Transport with its own HTTP client
    ///
    /// The stream is long-lived, so only connecting and idle reads are
    /// bounded; there is no whole-request timeout.
    pub fn new(base_url: impl Into<String>) -> Result<Self, ChannelError> {
        let client = reqwest::Client::builder()
            .connect_timeout(CHANNEL_CONNECT_TIMEOUT)
            .read_timeout(CHANNEL_READ_TIMEOUT)
            .build()
            .map_err(|e| ChannelError::Connect(e.to_string()))?;
        Ok(Self::with_client(client, base_url))
    }

    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl ChannelTransport for SseTransport {
    async fn connect(&self, gym_id: &str) -> Result<EventStream, ChannelError> {
        let url = format!("{}/api/gyms/{}/events", self.base_url, gym_id);
        debug!("Opening gym event stream {}", url);

        let mut source = EventSource::new(self.client.get(&url))
            .map_err(|e| ChannelError::Connect(e.to_string()))?;
        // Reconnection is handled by DashboardSession
        source.set_retry_policy(Box::new(retry::Never));

        let events = stream::unfold(Some(source), |source| async move {
            let mut source = source?;
            loop {
                match source.next().await {
                    None => return Some((Err(ChannelError::Closed), None)),
                    Some(Ok(SseEvent::Open)) => continue,
                    Some(Ok(SseEvent::Message(message))) => {
                        match serde_json::from_str::<GymEvent>(&message.data) {
                            Ok(event) => return Some((Ok(event), Some(source))),
                            Err(e) => {
                                warn!("Ignoring unparseable {} event: {}", message.event, e);
                                continue;
                            }
                        }
                    }
                    Some(Err(e)) => {
                        source.close();
                        return Some((Err(ChannelError::Connect(e.to_string())), None));
                    }
                }
            }
        });

        Ok(events.boxed())
    }
}

/// Joins an in-process `GymChannels` registry
pub struct LocalTransport {
    channels: GymChannels,
}

impl LocalTransport {
    pub fn new(channels: GymChannels) -> Self {
        Self { channels }
    }
}

#[async_trait]
impl ChannelTransport for LocalTransport {
    async fn connect(&self, gym_id: &str) -> Result<EventStream, ChannelError> {
        Ok(self.channels.join(gym_id).into_stream().map(Ok).boxed())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Connected,
    /// Waiting before reconnect attempt `attempt`
    Backoff { attempt: u32 },
}

/// Delay before reconnect attempt `attempt` (1-based): 1s, 2s, 4s ... 30s
pub fn backoff_delay(attempt: u32) -> Duration {
    let max = RECONNECT_BACKOFF_MAX.as_secs();
    let secs = 2u64.saturating_pow(attempt.saturating_sub(1)).min(max);
    Duration::from_secs(secs)
}

/// One dashboard's membership of a gym channel
pub struct DashboardSession {
    gym_id: String,
    session_id: Uuid,
    transport: Arc<dyn ChannelTransport>,
    presenter: ResultPresenter,
    logs: AttendanceLogCache,
}

impl DashboardSession {
    pub fn new(
        gym_id: impl Into<String>,
        session_id: Uuid,
        transport: Arc<dyn ChannelTransport>,
        presenter: ResultPresenter,
        logs: AttendanceLogCache,
    ) -> Self {
        Self {
            gym_id: gym_id.into(),
            session_id,
            transport,
            presenter,
            logs,
        }
    }

    /// Run until the returned handle is dropped
    pub fn spawn(self) -> SubscriptionHandle {
        let (tx, rx) = watch::channel(ConnectionState::Connecting);
        let task = tokio::spawn(self.run(tx));
        SubscriptionHandle { state: rx, task }
    }

    async fn run(self, state: watch::Sender<ConnectionState>) {
        let mut attempt: u32 = 0;
        loop {
            if attempt > 0 {
                let delay = backoff_delay(attempt);
                info!(
                    "Rejoining gym {} in {}s (attempt #{})",
                    self.gym_id,
                    delay.as_secs(),
                    attempt + 1
                );
                state.send_replace(ConnectionState::Backoff { attempt });
                tokio::time::sleep(delay).await;
            }
            state.send_replace(ConnectionState::Connecting);

            let mut events = match self.transport.connect(&self.gym_id).await {
                Ok(events) => events,
                Err(e) => {
                    error!("Failed to join gym {}: {}", self.gym_id, e);
                    attempt = attempt.saturating_add(1);
                    continue;
                }
            };
            info!("Joined gym channel {}", self.gym_id);
            state.send_replace(ConnectionState::Connected);
            attempt = 0;

            while let Some(event) = events.next().await {
                match event {
                    Ok(event) => self.handle_event(event),
                    Err(e) => {
                        warn!("Gym channel {} error: {}", self.gym_id, e);
                        break;
                    }
                }
            }

            warn!("Gym channel {} disconnected", self.gym_id);
            attempt = attempt.saturating_add(1);
        }
    }

    fn handle_event(&self, event: GymEvent) {
        match event {
            GymEvent::ScanResolved(scan) => {
                if scan.gym_id != self.gym_id {
                    debug!("Ignoring scan for gym {}", scan.gym_id);
                    return;
                }
                self.logs.invalidate();

                if scan.origin == Some(self.session_id) {
                    debug!("Skipping echo of own scan");
                    return;
                }
                if !scan.result.is_terminal() {
                    return;
                }
                self.presenter.present(scan.result);
            }
        }
    }
}

/// Keeps a dashboard subscription alive; dropping it leaves the channel
pub struct SubscriptionHandle {
    state: watch::Receiver<ConnectionState>,
    task: JoinHandle<()>,
}

impl SubscriptionHandle {
    pub fn connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    pub fn stop(&self) {
        self.task.abort();
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}
