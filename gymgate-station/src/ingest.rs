//! Scan ingestion pipeline
//!
//! Takes raw decodes from the scanner and turns at most one of them at a
//! time into a verification:
//! 1. Discard unless the cooldown since the last accepted scan has passed
//!    and no verification is in flight
//! 2. Present `Verifying`, verify against the authority with a timeout
//! 3. Classify into `Granted`/`Denied`, play one cue, present the result
//! 4. Publish the result on the gym channel (failures only logged)

use async_trait::async_trait;
use gymgate_common::api::CheckInData;
use gymgate_common::events::ScanEvent;
use gymgate_common::timing::{SCAN_COOLDOWN, VERIFY_TIMEOUT};
use gymgate_common::{ScanAttempt, ScanResult};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::ClientError;
use crate::feedback::{Cue, FeedbackSink};
use crate::presentation::ResultPresenter;
use crate::scanner::DecodeCallback;

/// Verifies a scanned payload for a gym
#[async_trait]
pub trait AccessVerifier: Send + Sync {
    async fn check_in(&self, gym_id: &str, token: &str) -> Result<CheckInData, ClientError>;
}

/// Announces classified scans to the rest of the gym
#[async_trait]
pub trait ScanPublisher: Send + Sync {
    async fn publish(&self, event: ScanEvent) -> Result<(), ClientError>;
}

#[derive(Debug, Clone, Copy)]
pub struct IngestSettings {
    /// Minimum gap between accepted scans
    pub cooldown: Duration,
    /// Longest wait for the authority before denying
    pub verify_timeout: Duration,
}

impl Default for IngestSettings {
    fn default() -> Self {
        Self {
            cooldown: SCAN_COOLDOWN,
            verify_timeout: VERIFY_TIMEOUT,
        }
    }
}

#[derive(Default)]
struct Gate {
    last_accepted: Option<Instant>,
    in_flight: bool,
}

struct PipelineInner {
    gym_id: String,
    session_id: Uuid,
    verifier: Arc<dyn AccessVerifier>,
    publisher: Arc<dyn ScanPublisher>,
    feedback: Arc<dyn FeedbackSink>,
    presenter: ResultPresenter,
    settings: IngestSettings,
    gate: Mutex<Gate>,
    task: Mutex<Option<JoinHandle<()>>>,
}

/// Cloneable handle to one gate's pipeline
#[derive(Clone)]
pub struct ScanPipeline {
    inner: Arc<PipelineInner>,
}

impl ScanPipeline {
    pub fn new(
        gym_id: impl Into<String>,
        session_id: Uuid,
        verifier: Arc<dyn AccessVerifier>,
        publisher: Arc<dyn ScanPublisher>,
        feedback: Arc<dyn FeedbackSink>,
        presenter: ResultPresenter,
        settings: IngestSettings,
    ) -> Self {
        Self {
            inner: Arc::new(PipelineInner {
                gym_id: gym_id.into(),
                session_id,
                verifier,
                publisher,
                feedback,
                presenter,
                settings,
                gate: Mutex::new(Gate::default()),
                task: Mutex::new(None),
            }),
        }
    }

    pub fn gym_id(&self) -> &str {
        &self.inner.gym_id
    }

    pub fn session_id(&self) -> Uuid {
        self.inner.session_id
    }

    /// Callback to hand to the scanner engine
    pub fn decode_callback(&self) -> DecodeCallback {
        let pipeline = self.clone();
        Arc::new(move |payload: String| {
            pipeline.submit(ScanAttempt::new(payload));
        })
    }

    /// Offer a decode; returns whether it was accepted for verification
    ///
    /// Must be called from within a tokio runtime.
    pub fn submit(&self, attempt: ScanAttempt) -> bool {
        if !self.try_accept() {
            debug!("Scan discarded (cooldown or verification in flight)");
            return false;
        }

        self.inner.presenter.present(ScanResult::verifying());

        let pipeline = self.clone();
        let task = tokio::spawn(async move { pipeline.process(attempt).await });
        *self.inner.task.lock().unwrap_or_else(|p| p.into_inner()) = Some(task);
        true
    }

    /// True while a verification is outstanding
    pub fn is_verifying(&self) -> bool {
        self.inner.gate.lock().map(|g| g.in_flight).unwrap_or(false)
    }

    /// Abandon any verification in flight
    pub fn shutdown(&self) {
        if let Some(task) = self.inner.task.lock().unwrap_or_else(|p| p.into_inner()).take() {
            task.abort();
        }
        let mut gate = self.inner.gate.lock().unwrap_or_else(|p| p.into_inner());
        gate.in_flight = false;
    }

    fn try_accept(&self) -> bool {
        let mut gate = self.inner.gate.lock().unwrap_or_else(|p| p.into_inner());
        if gate.in_flight {
            return false;
        }
        let now = Instant::now();
        if let Some(last) = gate.last_accepted {
            if now.duration_since(last) < self.inner.settings.cooldown {
                return false;
            }
        }
        gate.last_accepted = Some(now);
        gate.in_flight = true;
        true
    }

    async fn process(&self, attempt: ScanAttempt) {
        let inner = &self.inner;
        let verification = inner.verifier.check_in(&inner.gym_id, &attempt.raw_payload);

        let result = match tokio::time::timeout(inner.settings.verify_timeout, verification).await {
            Ok(Ok(data)) => ScanResult::granted(data),
            Ok(Err(e)) => {
                debug!("Verification refused: {}", e);
                ScanResult::denied(e.display_reason())
            }
            Err(_) => {
                warn!(
                    "Verification timed out after {}ms",
                    inner.settings.verify_timeout.as_millis()
                );
                ScanResult::denied(None)
            }
        };

        info!("Scan at gym {}: {}", inner.gym_id, result.status_str());
        inner
            .feedback
            .play(if result.is_granted() { Cue::Granted } else { Cue::Denied });
        inner.presenter.present(result.clone());

        inner.gate.lock().unwrap_or_else(|p| p.into_inner()).in_flight = false;

        let event = ScanEvent {
            gym_id: inner.gym_id.clone(),
            origin: Some(inner.session_id),
            result,
        };
        if let Err(e) = inner.publisher.publish(event).await {
            warn!("Failed to publish scan result to gym {}: {}", inner.gym_id, e);
        }
    }
}
