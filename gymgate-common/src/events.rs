//! Gym-scoped event channels
//!
//! One `tokio::sync::broadcast` channel per gym. Joining returns a
//! `GymSubscription`; dropping it leaves the channel, and the last one out
//! tears the gym's channel down. Events published on one gym never reach
//! subscribers of another.

use crate::scan::ScanResult;
use crate::timing::CHANNEL_CAPACITY;
use futures::stream::{self, Stream};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, RwLock, Weak};
use tokio::sync::broadcast;
use tracing::{debug, warn};
use uuid::Uuid;

/// A classified scan announced on a gym channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanEvent {
    pub gym_id: String,
    /// Session that performed the scan, so it can skip its own echo
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<Uuid>,
    #[serde(flatten)]
    pub result: ScanResult,
}

/// Events carried on a gym channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum GymEvent {
    /// A gate finished verifying a scan
    ///
    /// Triggers:
    /// - Dashboards: show the result card, invalidate attendance logs
    ScanResolved(ScanEvent),
}

impl GymEvent {
    /// Gym the event belongs to
    pub fn gym_id(&self) -> &str {
        match self {
            GymEvent::ScanResolved(scan) => &scan.gym_id,
        }
    }

    /// Event name used as the SSE `event:` field
    pub fn event_type(&self) -> &'static str {
        match self {
            GymEvent::ScanResolved(_) => "ScanResolved",
        }
    }
}

type ChannelMap = RwLock<HashMap<String, broadcast::Sender<GymEvent>>>;

/// Registry of per-gym broadcast channels
///
/// Cheap to clone; clones share the same channels.
#[derive(Clone)]
pub struct GymChannels {
    channels: Arc<ChannelMap>,
    capacity: usize,
}

impl std::fmt::Debug for GymChannels {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GymChannels")
            .field("gym_count", &self.gym_count())
            .field("capacity", &self.capacity)
            .finish()
    }
}

impl Default for GymChannels {
    fn default() -> Self {
        Self::new(CHANNEL_CAPACITY)
    }
}

impl GymChannels {
    /// Create a registry whose channels buffer `capacity` events each
    pub fn new(capacity: usize) -> Self {
        Self {
            channels: Arc::new(RwLock::new(HashMap::new())),
            capacity: capacity.max(1),
        }
    }

    /// Join a gym's channel
    ///
    /// Only events published after joining are received; nothing is
    /// backfilled.
    pub fn join(&self, gym_id: &str) -> GymSubscription {
        let rx = {
            let mut channels = self.channels.write().unwrap_or_else(|p| p.into_inner());
            channels
                .entry(gym_id.to_string())
                .or_insert_with(|| broadcast::channel(self.capacity).0)
                .subscribe()
        };
        debug!("Joined gym channel {}", gym_id);

        GymSubscription {
            gym_id: gym_id.to_string(),
            rx: Some(rx),
            channels: Arc::downgrade(&self.channels),
        }
    }

    /// Publish on `gym_id`'s channel, returning how many sessions received it
    pub fn publish(&self, gym_id: &str, event: GymEvent) -> usize {
        let channels = self.channels.read().unwrap_or_else(|p| p.into_inner());
        match channels.get(gym_id) {
            Some(tx) => tx.send(event).unwrap_or(0),
            None => 0,
        }
    }

    /// Sessions currently joined to `gym_id`
    pub fn subscriber_count(&self, gym_id: &str) -> usize {
        let channels = self.channels.read().unwrap_or_else(|p| p.into_inner());
        channels.get(gym_id).map(|tx| tx.receiver_count()).unwrap_or(0)
    }

    /// Gyms with at least one joined session
    pub fn gym_count(&self) -> usize {
        self.channels.read().map(|c| c.len()).unwrap_or(0)
    }
}

/// Membership of one session in one gym channel; leaving happens on drop
pub struct GymSubscription {
    gym_id: String,
    rx: Option<broadcast::Receiver<GymEvent>>,
    channels: Weak<ChannelMap>,
}

impl std::fmt::Debug for GymSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GymSubscription")
            .field("gym_id", &self.gym_id)
            .finish()
    }
}

impl GymSubscription {
    pub fn gym_id(&self) -> &str {
        &self.gym_id
    }

    /// Next event, or `None` once the channel is gone
    ///
    /// A subscriber that falls more than the channel capacity behind skips
    /// the overwritten events and carries on.
    pub async fn recv(&mut self) -> Option<GymEvent> {
        let rx = self.rx.as_mut()?;
        loop {
            match rx.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(
                        "Gym channel {} subscriber lagged, skipped {} events",
                        self.gym_id, skipped
                    );
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Turn the subscription into a stream of events
    pub fn into_stream(self) -> impl Stream<Item = GymEvent> + Send + 'static {
        stream::unfold(self, |mut sub| async move {
            let event = sub.recv().await?;
            Some((event, sub))
        })
    }
}

impl Drop for GymSubscription {
    fn drop(&mut self) {
        // Release our receiver first so the count below excludes it
        drop(self.rx.take());

        if let Some(channels) = self.channels.upgrade() {
            let mut channels = channels.write().unwrap_or_else(|p| p.into_inner());
            if channels
                .get(&self.gym_id)
                .is_some_and(|tx| tx.receiver_count() == 0)
            {
                channels.remove(&self.gym_id);
                debug!("Gym channel {} closed (no subscribers)", self.gym_id);
            }
        }
    }
}
