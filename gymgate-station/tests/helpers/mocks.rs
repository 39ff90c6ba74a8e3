//! Mock collaborators
//!
//! Each mock records how it was called and answers from a script. Delays
//! use tokio time so tests can run with the clock paused.

use async_trait::async_trait;
use chrono::Utc;
use gymgate_common::api::{CheckInData, IssuedToken};
use gymgate_common::events::ScanEvent;
use gymgate_common::AttendanceRecord;
use gymgate_station::credential::TokenSource;
use gymgate_station::error::{CameraError, ClientError};
use gymgate_station::ingest::{AccessVerifier, ScanPublisher};
use gymgate_station::logs::AttendanceSource;
use gymgate_station::scanner::{
    CameraDriver, CameraFacing, DecodeCallback, DecodeSettings, FaultCallback,
};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

/// Camera whose start results are scripted per call
#[derive(Default)]
pub struct MockCamera {
    script: Mutex<VecDeque<Result<(), CameraError>>>,
    starts: Mutex<Vec<(CameraFacing, Instant)>>,
    stops: AtomicUsize,
    start_delay: Mutex<Duration>,
    callback: Mutex<Option<DecodeCallback>>,
    fault: Mutex<Option<FaultCallback>>,
}

impl MockCamera {
    /// Start results in call order; calls beyond the script succeed
    pub fn scripted(results: Vec<Result<(), CameraError>>) -> Self {
        let camera = Self::default();
        *camera.script.lock().unwrap() = results.into();
        camera
    }

    pub fn with_start_delay(self, delay: Duration) -> Self {
        *self.start_delay.lock().unwrap() = delay;
        self
    }

    pub fn push_result(&self, result: Result<(), CameraError>) {
        self.script.lock().unwrap().push_back(result);
    }

    pub fn starts(&self) -> Vec<(CameraFacing, Instant)> {
        self.starts.lock().unwrap().clone()
    }

    pub fn facings(&self) -> Vec<CameraFacing> {
        self.starts().into_iter().map(|(facing, _)| facing).collect()
    }

    pub fn stop_count(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    /// Simulate the running camera going away
    pub fn lose(&self, fault: CameraError) {
        let callback = self.fault.lock().unwrap().take();
        if let Some(callback) = callback {
            callback(fault);
        }
    }

    /// Simulate the decoder reading a QR code
    pub fn decode(&self, payload: &str) {
        let callback = self.callback.lock().unwrap().clone();
        if let Some(callback) = callback {
            callback(payload.to_string());
        }
    }
}

#[async_trait]
impl CameraDriver for MockCamera {
    async fn start(
        &self,
        facing: CameraFacing,
        _settings: DecodeSettings,
        on_decode: DecodeCallback,
        on_fault: FaultCallback,
    ) -> Result<(), CameraError> {
        self.starts.lock().unwrap().push((facing, Instant::now()));
        let delay = *self.start_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let result = self.script.lock().unwrap().pop_front().unwrap_or(Ok(()));
        if result.is_ok() {
            *self.callback.lock().unwrap() = Some(on_decode);
            *self.fault.lock().unwrap() = Some(on_fault);
        }
        result
    }

    async fn stop(&self) -> Result<(), CameraError> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        *self.callback.lock().unwrap() = None;
        Ok(())
    }
}

/// Verifier answering every call the same way after `delay`
pub struct MockVerifier {
    response: Mutex<Result<CheckInData, String>>,
    delay: Duration,
    calls: Mutex<Vec<String>>,
}

impl MockVerifier {
    pub fn granting(name: &str) -> Self {
        Self {
            response: Mutex::new(Ok(CheckInData {
                member_name: Some(name.to_string()),
                photo_url: None,
                subscription_expiry: Some(Utc::now() + chrono::Duration::days(10)),
            })),
            delay: Duration::from_millis(50),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Hub rejection with `message`; empty means no message
    pub fn rejecting(message: &str) -> Self {
        Self {
            response: Mutex::new(Err(message.to_string())),
            delay: Duration::from_millis(50),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl AccessVerifier for MockVerifier {
    async fn check_in(&self, _gym_id: &str, token: &str) -> Result<CheckInData, ClientError> {
        self.calls.lock().unwrap().push(token.to_string());
        tokio::time::sleep(self.delay).await;
        let response = self.response.lock().unwrap().clone();
        response.map_err(ClientError::Rejected)
    }
}

/// Publisher that records events, optionally failing every call
#[derive(Default)]
pub struct MockPublisher {
    events: Mutex<Vec<ScanEvent>>,
    fail: bool,
}

impl MockPublisher {
    pub fn failing() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn events(&self) -> Vec<ScanEvent> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl ScanPublisher for MockPublisher {
    async fn publish(&self, event: ScanEvent) -> Result<(), ClientError> {
        if self.fail {
            return Err(ClientError::Protocol("hub unreachable".to_string()));
        }
        self.events.lock().unwrap().push(event);
        Ok(())
    }
}

/// Token source issuing `ttl` tokens, with scripted failures first
pub struct MockTokenSource {
    ttl: chrono::Duration,
    failures_left: AtomicUsize,
    calls: AtomicUsize,
}

impl MockTokenSource {
    pub fn new(ttl: chrono::Duration) -> Self {
        Self {
            ttl,
            failures_left: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing_first(self, failures: usize) -> Self {
        self.failures_left.store(failures, Ordering::SeqCst);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TokenSource for MockTokenSource {
    async fn issue_token(
        &self,
        _gym_id: &str,
        member_id: &str,
    ) -> Result<IssuedToken, ClientError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if failing {
            return Err(ClientError::Protocol("issuer down".to_string()));
        }

        let now = Utc::now();
        Ok(IssuedToken {
            token: format!("{}-token-{}", member_id, n),
            issued_at: now,
            expires_at: now + self.ttl,
        })
    }
}

/// Attendance source returning nothing, counting fetches
#[derive(Default)]
pub struct StaticLogs {
    fetches: AtomicUsize,
}

impl StaticLogs {
    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AttendanceSource for StaticLogs {
    async fn fetch_logs(&self, _gym_id: &str) -> Result<Vec<AttendanceRecord>, ClientError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        Ok(Vec::new())
    }
}
