//! Gym status watcher
//!
//! Re-evaluates the operating schedule once a minute and publishes the
//! result through a watch channel. Independent of scanning.

use chrono::NaiveDateTime;
use gymgate_common::schedule::evaluate_optional;
use gymgate_common::timing::STATUS_REFRESH_INTERVAL;
use gymgate_common::{GymStatus, OperatingSchedule};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::info;

/// Gym-local wall clock
pub type WallClock = Arc<dyn Fn() -> NaiveDateTime + Send + Sync>;

pub fn local_clock() -> WallClock {
    Arc::new(gymgate_common::time::local_wall_clock)
}

pub struct ScheduleWatcher {
    status: watch::Receiver<GymStatus>,
    task: JoinHandle<()>,
}

impl ScheduleWatcher {
    pub fn start(schedule: Option<OperatingSchedule>, clock: WallClock) -> Self {
        Self::with_interval(schedule, clock, STATUS_REFRESH_INTERVAL)
    }

    pub fn with_interval(
        schedule: Option<OperatingSchedule>,
        clock: WallClock,
        interval: Duration,
    ) -> Self {
        let initial = evaluate_optional(schedule.as_ref(), clock());
        let (tx, rx) = watch::channel(initial);

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // First tick completes immediately; the initial value is already set
            ticker.tick().await;

            loop {
                ticker.tick().await;
                let status = evaluate_optional(schedule.as_ref(), clock());
                tx.send_if_modified(|current| {
                    if *current == status {
                        return false;
                    }
                    info!(
                        "Gym status changed: {} -> {}",
                        current.current_session, status.current_session
                    );
                    *current = status;
                    true
                });
            }
        });

        Self { status: rx, task }
    }

    pub fn subscribe(&self) -> watch::Receiver<GymStatus> {
        self.status.clone()
    }

    pub fn current(&self) -> GymStatus {
        self.status.borrow().clone()
    }

    pub fn stop(&self) {
        self.task.abort();
    }
}

impl Drop for ScheduleWatcher {
    fn drop(&mut self) {
        self.task.abort();
    }
}
