//! Line-oriented decode backend
//!
//! Stands in for a camera plus QR decoder: every non-empty line read from
//! the source is delivered as one decoded payload. A handheld barcode
//! scanner in keyboard mode produces exactly this on stdin.
//!
//! End of input or a read error counts as the camera being lost.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, Lines};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::CameraError;
use crate::scanner::{CameraDriver, CameraFacing, DecodeCallback, DecodeSettings, FaultCallback};

pub struct LineCamera<R> {
    lines: Arc<Mutex<Lines<R>>>,
    /// Only this facing is "present"
    facing: CameraFacing,
    reader: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl<R> LineCamera<R>
where
    R: AsyncBufRead + Unpin + Send + 'static,
{
    pub fn new(source: R, facing: CameraFacing) -> Self {
        Self {
            lines: Arc::new(Mutex::new(source.lines())),
            facing,
            reader: std::sync::Mutex::new(None),
        }
    }
}

#[async_trait]
impl<R> CameraDriver for LineCamera<R>
where
    R: AsyncBufRead + Unpin + Send + 'static,
{
    async fn start(
        &self,
        facing: CameraFacing,
        settings: DecodeSettings,
        on_decode: DecodeCallback,
        on_fault: FaultCallback,
    ) -> Result<(), CameraError> {
        if facing != self.facing {
            return Err(CameraError::NotFound(format!("{:?}", facing)));
        }

        let mut reader = self.reader.lock().unwrap_or_else(|p| p.into_inner());
        if reader.as_ref().is_some_and(|task| !task.is_finished()) {
            return Err(CameraError::TransitionInProgress);
        }

        let lines = Arc::clone(&self.lines);
        *reader = Some(tokio::spawn(async move {
            let mut lines = lines.lock().await;
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        let payload = line.trim();
                        if !payload.is_empty() {
                            on_decode(payload.to_string());
                        }
                    }
                    Ok(None) => {
                        warn!("Decode source reached end of input");
                        on_fault(CameraError::Disconnected("end of input".to_string()));
                        break;
                    }
                    Err(e) => {
                        warn!("Decode source failed: {}", e);
                        on_fault(CameraError::Disconnected(e.to_string()));
                        break;
                    }
                }
            }
        }));
        debug!("Line decoder started ({:?}, {} fps nominal)", facing, settings.fps);
        Ok(())
    }

    async fn stop(&self) -> Result<(), CameraError> {
        if let Some(task) = self.reader.lock().unwrap_or_else(|p| p.into_inner()).take() {
            task.abort();
        }
        Ok(())
    }
}
