//! Attendance log cache
//!
//! Dashboards show the newest attendance records. Every scan event seen on
//! the gym channel marks the cache stale; the next read refetches.

use async_trait::async_trait;
use gymgate_common::AttendanceRecord;
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tracing::debug;

use crate::error::ClientError;

/// Source of attendance records for a gym
#[async_trait]
pub trait AttendanceSource: Send + Sync {
    async fn fetch_logs(&self, gym_id: &str) -> Result<Vec<AttendanceRecord>, ClientError>;
}

#[derive(Default)]
struct CacheSlot {
    generation: u64,
    records: Option<Vec<AttendanceRecord>>,
}

#[derive(Clone)]
pub struct AttendanceLogCache {
    gym_id: String,
    source: Arc<dyn AttendanceSource>,
    slot: Arc<Mutex<CacheSlot>>,
    /// Bumped on every invalidation so views know to refetch
    invalidations: Arc<watch::Sender<u64>>,
}

impl AttendanceLogCache {
    pub fn new(gym_id: impl Into<String>, source: Arc<dyn AttendanceSource>) -> Self {
        let (tx, _) = watch::channel(0);
        Self {
            gym_id: gym_id.into(),
            source,
            slot: Arc::new(Mutex::new(CacheSlot::default())),
            invalidations: Arc::new(tx),
        }
    }

    /// Mark the cached records stale
    pub fn invalidate(&self) {
        let mut slot = self.slot.lock().unwrap_or_else(|p| p.into_inner());
        slot.generation += 1;
        slot.records = None;
        let generation = slot.generation;
        drop(slot);

        self.invalidations.send_replace(generation);
        debug!("Attendance log cache for gym {} invalidated", self.gym_id);
    }

    /// Watch for invalidations
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.invalidations.subscribe()
    }

    pub fn is_fresh(&self) -> bool {
        self.slot.lock().map(|s| s.records.is_some()).unwrap_or(false)
    }

    /// Cached records, fetching them first if stale
    pub async fn get(&self) -> Result<Vec<AttendanceRecord>, ClientError> {
        let generation = {
            let slot = self.slot.lock().unwrap_or_else(|p| p.into_inner());
            if let Some(records) = &slot.records {
                return Ok(records.clone());
            }
            slot.generation
        };

        let records = self.source.fetch_logs(&self.gym_id).await?;

        // Drop the result if an invalidation raced the fetch
        let mut slot = self.slot.lock().unwrap_or_else(|p| p.into_inner());
        if slot.generation == generation {
            slot.records = Some(records.clone());
        }
        Ok(records)
    }
}
