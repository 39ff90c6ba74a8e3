//! Scanner engine
//!
//! Owns one camera through a `CameraDriver` and forwards every decoded
//! frame to a callback. Lifecycle is an explicit state machine:
//!
//! ```text
//! Idle -> Starting -> Running -> Stopping -> Idle
//!            |  \         |
//!            |   +--> Error --(retry)--> Starting
//!            +--> Idle       (driver busy, or stop requested and start failed)
//!            +--> Stopping   (stop requested while acquiring)
//! ```
//!
//! A running camera that the driver reports lost (device gone, decode
//! source ended) drops to `Error` with the same retry path.
//!
//! Starting tries the rear camera, then the front camera once. A stop that
//! arrives while starting is remembered and carried out as soon as the
//! acquisition settles, so a camera is never left running.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::error::CameraError;
use gymgate_common::timing::{CAMERA_FALLBACK_DELAY, SCANNER_SETTLE_DELAY};

/// Message shown when no camera could be acquired
pub const CAMERA_ERROR_MESSAGE: &str =
    "Unable to access the camera. Check permissions and retry.";

/// Receives each decoded payload; must not block
pub type DecodeCallback = Arc<dyn Fn(String) + Send + Sync>;

/// Told when a started camera stops delivering; must not block
pub type FaultCallback = Arc<dyn Fn(CameraError) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CameraFacing {
    /// Rear camera
    Environment,
    /// Front camera
    User,
}

/// Decoder settings passed to the driver
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecodeSettings {
    pub fps: u32,
    /// Scan box edge as a fraction of the shorter viewfinder edge
    pub qrbox_ratio: f32,
}

impl Default for DecodeSettings {
    fn default() -> Self {
        Self {
            fps: 20,
            qrbox_ratio: 0.75,
        }
    }
}

impl DecodeSettings {
    /// Square scan box edge in pixels for a viewfinder
    pub fn qrbox_edge(&self, width: u32, height: u32) -> u32 {
        (width.min(height) as f32 * self.qrbox_ratio).floor() as u32
    }
}

/// Camera plus QR decoder backend
#[async_trait]
pub trait CameraDriver: Send + Sync + 'static {
    /// Open the camera and begin decoding into `on_decode`
    ///
    /// `on_fault` is called at most once if the camera is lost after a
    /// successful start; not after `stop`.
    async fn start(
        &self,
        facing: CameraFacing,
        settings: DecodeSettings,
        on_decode: DecodeCallback,
        on_fault: FaultCallback,
    ) -> Result<(), CameraError>;

    /// Stop decoding and release the camera
    async fn stop(&self) -> Result<(), CameraError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScannerState {
    Idle,
    Starting,
    Running { facing: CameraFacing },
    Stopping,
    Error { message: String },
}

impl ScannerState {
    /// Transition table
    pub fn can_transition_to(&self, next: &ScannerState) -> bool {
        use ScannerState::*;
        matches!(
            (self, next),
            (Idle, Starting)
                | (Starting, Running { .. })
                | (Starting, Error { .. })
                | (Starting, Idle)
                | (Starting, Stopping)
                | (Running { .. }, Stopping)
                | (Running { .. }, Error { .. })
                | (Stopping, Idle)
                | (Error { .. }, Starting)
                | (Error { .. }, Idle)
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            ScannerState::Idle => "idle",
            ScannerState::Starting => "starting",
            ScannerState::Running { .. } => "running",
            ScannerState::Stopping => "stopping",
            ScannerState::Error { .. } => "error",
        }
    }
}

/// Observable state of one camera binding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannerSession {
    pub state: ScannerState,
    /// Display-only horizontal flip
    pub is_mirrored: bool,
    pub last_error: Option<String>,
}

impl Default for ScannerSession {
    fn default() -> Self {
        Self {
            state: ScannerState::Idle,
            is_mirrored: true,
            last_error: None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ScannerTiming {
    /// Delay between mount and the first start
    pub settle_delay: Duration,
    /// Pause between the rear and front camera attempts
    pub fallback_delay: Duration,
}

impl Default for ScannerTiming {
    fn default() -> Self {
        Self {
            settle_delay: SCANNER_SETTLE_DELAY,
            fallback_delay: CAMERA_FALLBACK_DELAY,
        }
    }
}

struct EngineInner {
    driver: Arc<dyn CameraDriver>,
    on_decode: DecodeCallback,
    settings: DecodeSettings,
    timing: ScannerTiming,
    session: watch::Sender<ScannerSession>,
    stop_requested: Mutex<bool>,
    /// Fault reported before the start settled
    early_fault: Mutex<Option<CameraError>>,
    settle_task: Mutex<Option<JoinHandle<()>>>,
}

enum StopAction {
    Release,
    Deferred,
    Nothing,
}

#[derive(Clone)]
pub struct ScannerEngine {
    inner: Arc<EngineInner>,
}

impl ScannerEngine {
    pub fn new(driver: Arc<dyn CameraDriver>, on_decode: DecodeCallback) -> Self {
        Self::with_timing(driver, on_decode, DecodeSettings::default(), ScannerTiming::default())
    }

    pub fn with_timing(
        driver: Arc<dyn CameraDriver>,
        on_decode: DecodeCallback,
        settings: DecodeSettings,
        timing: ScannerTiming,
    ) -> Self {
        let (session, _) = watch::channel(ScannerSession::default());
        Self {
            inner: Arc::new(EngineInner {
                driver,
                on_decode,
                settings,
                timing,
                session,
                stop_requested: Mutex::new(false),
                early_fault: Mutex::new(None),
                settle_task: Mutex::new(None),
            }),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<ScannerSession> {
        self.inner.session.subscribe()
    }

    pub fn session(&self) -> ScannerSession {
        self.inner.session.borrow().clone()
    }

    pub fn state(&self) -> ScannerState {
        self.inner.session.borrow().state.clone()
    }

    /// Schedule a start after the settle delay
    pub fn mount(&self) {
        let engine = self.clone();
        let delay = self.inner.timing.settle_delay;
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            // Acquisition runs detached so aborting this task never interrupts it
            if engine.enter_starting() {
                tokio::spawn(async move { engine.acquire_and_settle().await });
            }
        });

        let mut slot = self.inner.settle_task.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(previous) = slot.replace(task) {
            previous.abort();
        }
    }

    /// Cancel a pending mount start and release the camera
    pub async fn unmount(&self) {
        let pending = self
            .inner
            .settle_task
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .take();
        if let Some(task) = pending {
            task.abort();
        }
        self.stop().await;
    }

    /// Acquire the camera; a no-op unless `Idle` or `Error`
    pub async fn start(&self) {
        if self.enter_starting() {
            self.acquire_and_settle().await;
        }
    }

    fn enter_starting(&self) -> bool {
        let entered = self.inner.session.send_if_modified(|session| {
            if matches!(session.state, ScannerState::Idle | ScannerState::Error { .. }) {
                session.state = ScannerState::Starting;
                self.set_stop_requested(false);
                self.take_early_fault();
                true
            } else {
                false
            }
        });
        if !entered {
            debug!("Scanner start ignored in state {}", self.state().name());
        }
        entered
    }

    async fn acquire_and_settle(&self) {
        let outcome = self.acquire().await;

        // Settle under the session lock so a concurrent stop is either seen
        // here or finds the scanner already Running
        let mut release_now = false;
        let mut lost: Option<String> = None;
        self.inner.session.send_modify(|session| {
            let stop_requested = self.take_stop_requested();
            let early_fault = self.take_early_fault();
            match &outcome {
                Ok(_) if stop_requested => {
                    session.state = ScannerState::Stopping;
                    release_now = true;
                }
                Ok(_) if early_fault.is_some() => {
                    session.state = ScannerState::Error {
                        message: CAMERA_ERROR_MESSAGE.to_string(),
                    };
                    lost = early_fault.map(|e| e.to_string());
                    session.last_error = lost.clone();
                }
                Ok(facing) => {
                    session.state = ScannerState::Running { facing: *facing };
                    session.last_error = None;
                }
                Err(CameraError::TransitionInProgress) => session.state = ScannerState::Idle,
                Err(_) if stop_requested => session.state = ScannerState::Idle,
                Err(e) => {
                    session.state = ScannerState::Error {
                        message: CAMERA_ERROR_MESSAGE.to_string(),
                    };
                    session.last_error = Some(e.to_string());
                }
            }
        });

        match outcome {
            Ok(facing) if release_now => {
                info!("Stop requested during start, releasing {:?} camera", facing);
                self.release().await;
            }
            Ok(facing) if lost.is_some() => {
                let reason = lost.unwrap_or_default();
                error!("{:?} camera lost while starting: {}", facing, reason);
            }
            Ok(facing) => info!("Scanner running on {:?} camera", facing),
            Err(CameraError::TransitionInProgress) => {
                info!("Camera busy with another transition, start abandoned")
            }
            Err(e) => error!("Failed to start scanner: {}", e),
        }
    }

    /// Retry after an error
    pub async fn retry(&self) {
        if matches!(self.state(), ScannerState::Error { .. }) {
            self.start().await;
        }
    }

    /// Release the camera
    ///
    /// While starting, the stop is deferred until acquisition completes.
    pub async fn stop(&self) {
        let mut action = StopAction::Nothing;
        self.inner.session.send_if_modified(|session| match session.state {
            ScannerState::Running { .. } => {
                session.state = ScannerState::Stopping;
                action = StopAction::Release;
                true
            }
            ScannerState::Error { .. } => {
                session.state = ScannerState::Idle;
                true
            }
            ScannerState::Starting => {
                self.set_stop_requested(true);
                action = StopAction::Deferred;
                false
            }
            ScannerState::Idle | ScannerState::Stopping => false,
        });

        match action {
            StopAction::Release => self.release().await,
            StopAction::Deferred => debug!("Scanner still starting, stop deferred"),
            StopAction::Nothing => {}
        }
    }

    pub fn toggle_mirror(&self) -> bool {
        let mut mirrored = true;
        self.inner.session.send_modify(|session| {
            session.is_mirrored = !session.is_mirrored;
            mirrored = session.is_mirrored;
        });
        mirrored
    }

    async fn acquire(&self) -> Result<CameraFacing, CameraError> {
        let driver = &self.inner.driver;
        let settings = self.inner.settings;
        let on_decode = &self.inner.on_decode;

        match driver
            .start(CameraFacing::Environment, settings, on_decode.clone(), self.fault_callback())
            .await
        {
            Ok(()) => return Ok(CameraFacing::Environment),
            Err(CameraError::TransitionInProgress) => {
                return Err(CameraError::TransitionInProgress)
            }
            Err(e) => warn!("Rear camera failed, falling back to front camera: {}", e),
        }

        tokio::time::sleep(self.inner.timing.fallback_delay).await;

        driver
            .start(CameraFacing::User, settings, on_decode.clone(), self.fault_callback())
            .await
            .map(|()| CameraFacing::User)
    }

    fn fault_callback(&self) -> FaultCallback {
        let inner = Arc::downgrade(&self.inner);
        Arc::new(move |fault| {
            if let Some(inner) = inner.upgrade() {
                ScannerEngine { inner }.camera_lost(fault);
            }
        })
    }

    /// Driver reported the camera gone
    fn camera_lost(&self, fault: CameraError) {
        let mut deferred = false;
        let lost = self.inner.session.send_if_modified(|session| match session.state {
            ScannerState::Running { .. } => {
                session.state = ScannerState::Error {
                    message: CAMERA_ERROR_MESSAGE.to_string(),
                };
                session.last_error = Some(fault.to_string());
                true
            }
            ScannerState::Starting => {
                *self.inner.early_fault.lock().unwrap_or_else(|p| p.into_inner()) =
                    Some(fault.clone());
                deferred = true;
                false
            }
            _ => false,
        });

        if lost {
            error!("Camera lost: {}", fault);
        } else if deferred {
            debug!("Camera fault before start settled: {}", fault);
        }
    }

    async fn release(&self) {
        if let Err(e) = self.inner.driver.stop().await {
            warn!("Camera stop failed: {}", e);
        }
        self.transition(ScannerState::Idle);
        debug!("Scanner stopped");
    }

    fn transition(&self, next: ScannerState) {
        self.inner.session.send_if_modified(|session| {
            if session.state.can_transition_to(&next) {
                session.state = next;
                true
            } else {
                warn!("Ignored scanner transition {} -> {}", session.state.name(), next.name());
                false
            }
        });
    }

    fn set_stop_requested(&self, value: bool) {
        *self.inner.stop_requested.lock().unwrap_or_else(|p| p.into_inner()) = value;
    }

    fn take_stop_requested(&self) -> bool {
        std::mem::take(&mut *self.inner.stop_requested.lock().unwrap_or_else(|p| p.into_inner()))
    }

    fn take_early_fault(&self) -> Option<CameraError> {
        self.inner.early_fault.lock().unwrap_or_else(|p| p.into_inner()).take()
    }
}
