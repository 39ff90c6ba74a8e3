//! Per-gym attendance log
//!
//! Every check-in attempt is appended, granted or denied. Queries return the
//! newest records first.

use gymgate_common::timing::ATTENDANCE_LOG_LIMIT;
use gymgate_common::AttendanceRecord;
use std::collections::{HashMap, VecDeque};
use std::sync::RwLock;

/// Records retained per gym before the oldest are discarded
const RETAINED_PER_GYM: usize = 1000;

#[derive(Debug, Default)]
pub struct AttendanceLog {
    gyms: RwLock<HashMap<String, VecDeque<AttendanceRecord>>>,
}

impl AttendanceLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, record: AttendanceRecord) {
        let mut gyms = self.gyms.write().unwrap_or_else(|p| p.into_inner());
        let log = gyms.entry(record.gym_id.clone()).or_default();
        log.push_front(record);
        log.truncate(RETAINED_PER_GYM);
    }

    /// Newest records for `gym_id`, at most `ATTENDANCE_LOG_LIMIT`
    pub fn recent(&self, gym_id: &str) -> Vec<AttendanceRecord> {
        let gyms = self.gyms.read().unwrap_or_else(|p| p.into_inner());
        gyms.get(gym_id)
            .map(|log| log.iter().take(ATTENDANCE_LOG_LIMIT).cloned().collect())
            .unwrap_or_default()
    }
}
