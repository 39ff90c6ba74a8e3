//! Access station
//!
//! Wires one gate together: scanner -> pipeline -> presenter, the gym
//! channel subscription feeding the same presenter, and the schedule
//! watcher. Unmounting stops the camera and cancels every timer.

use gymgate_common::config::StationConfig;
use gymgate_common::{GymStatus, OperatingSchedule, ScanResult};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;
use uuid::Uuid;

use crate::channel::{ChannelTransport, DashboardSession, SubscriptionHandle};
use crate::feedback::FeedbackSink;
use crate::ingest::{AccessVerifier, IngestSettings, ScanPublisher, ScanPipeline};
use crate::logs::{AttendanceLogCache, AttendanceSource};
use crate::presentation::ResultPresenter;
use crate::scanner::{CameraDriver, DecodeSettings, ScannerEngine, ScannerSession, ScannerTiming};
use crate::status::{ScheduleWatcher, WallClock};

/// External collaborators of a station
pub struct StationDeps {
    pub camera: Arc<dyn CameraDriver>,
    pub verifier: Arc<dyn AccessVerifier>,
    pub publisher: Arc<dyn ScanPublisher>,
    pub attendance: Arc<dyn AttendanceSource>,
    pub transport: Arc<dyn ChannelTransport>,
    pub feedback: Arc<dyn FeedbackSink>,
    pub clock: WallClock,
}

pub struct AccessStation {
    session_id: Uuid,
    scanner: ScannerEngine,
    pipeline: ScanPipeline,
    presenter: ResultPresenter,
    logs: AttendanceLogCache,
    schedule: ScheduleWatcher,
    subscription: SubscriptionHandle,
}

impl AccessStation {
    /// Start everything; the camera comes up after the settle delay
    pub fn mount(
        gym_id: &str,
        config: &StationConfig,
        schedule: Option<OperatingSchedule>,
        deps: StationDeps,
    ) -> Self {
        let session_id = Uuid::new_v4();
        info!("Mounting access station for gym {} (session {})", gym_id, session_id);

        let presenter = ResultPresenter::new(config.display_window());
        let pipeline = ScanPipeline::new(
            gym_id,
            session_id,
            deps.verifier,
            deps.publisher,
            deps.feedback,
            presenter.clone(),
            IngestSettings {
                cooldown: config.scan_cooldown(),
                verify_timeout: config.verify_timeout(),
            },
        );

        let scanner = ScannerEngine::with_timing(
            deps.camera,
            pipeline.decode_callback(),
            DecodeSettings::default(),
            ScannerTiming {
                settle_delay: config.settle_delay(),
                ..ScannerTiming::default()
            },
        );
        scanner.mount();

        let logs = AttendanceLogCache::new(gym_id, deps.attendance);
        let subscription = DashboardSession::new(
            gym_id,
            session_id,
            deps.transport,
            presenter.clone(),
            logs.clone(),
        )
        .spawn();

        let schedule = ScheduleWatcher::start(schedule, deps.clock);

        Self {
            session_id,
            scanner,
            pipeline,
            presenter,
            logs,
            schedule,
            subscription,
        }
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn scanner(&self) -> &ScannerEngine {
        &self.scanner
    }

    pub fn logs(&self) -> &AttendanceLogCache {
        &self.logs
    }

    pub fn results(&self) -> watch::Receiver<Option<ScanResult>> {
        self.presenter.subscribe()
    }

    pub fn scanner_session(&self) -> watch::Receiver<ScannerSession> {
        self.scanner.subscribe()
    }

    pub fn gym_status(&self) -> watch::Receiver<GymStatus> {
        self.schedule.subscribe()
    }

    /// Stop the camera and cancel all timers
    pub async fn unmount(self) {
        info!("Unmounting access station (session {})", self.session_id);
        self.scanner.unmount().await;
        self.pipeline.shutdown();
        self.presenter.shutdown();
        self.schedule.stop();
        self.subscription.stop();
    }
}
