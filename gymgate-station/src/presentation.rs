//! Result presentation state
//!
//! Holds the scan result currently on screen. Local scans and broadcast
//! scans go through the same `present` call. Terminal results clear
//! themselves after the display window; presenting anything newer cancels
//! the pending clear.

use gymgate_common::ScanResult;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

#[derive(Default)]
struct ClearTimer {
    generation: u64,
    task: Option<JoinHandle<()>>,
}

struct PresenterInner {
    tx: watch::Sender<Option<ScanResult>>,
    timer: Mutex<ClearTimer>,
    display_window: Duration,
}

/// Shared handle to the on-screen result
#[derive(Clone)]
pub struct ResultPresenter {
    inner: Arc<PresenterInner>,
}

impl ResultPresenter {
    pub fn new(display_window: Duration) -> Self {
        let (tx, _) = watch::channel(None);
        Self {
            inner: Arc::new(PresenterInner {
                tx,
                timer: Mutex::new(ClearTimer::default()),
                display_window,
            }),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<ScanResult>> {
        self.inner.tx.subscribe()
    }

    pub fn current(&self) -> Option<ScanResult> {
        self.inner.tx.borrow().clone()
    }

    /// Show `result`, scheduling its removal if it is terminal
    ///
    /// Must be called from within a tokio runtime.
    pub fn present(&self, result: ScanResult) {
        let mut timer = self.inner.timer.lock().unwrap_or_else(|p| p.into_inner());
        timer.generation += 1;
        if let Some(task) = timer.task.take() {
            task.abort();
        }

        let terminal = result.is_terminal();
        debug!("Presenting {} result", result.status_str());
        self.inner.tx.send_replace(Some(result));

        if terminal {
            let generation = timer.generation;
            let inner = Arc::downgrade(&self.inner);
            let window = self.inner.display_window;
            timer.task = Some(tokio::spawn(async move {
                tokio::time::sleep(window).await;
                if let Some(inner) = inner.upgrade() {
                    let timer = inner.timer.lock().unwrap_or_else(|p| p.into_inner());
                    if timer.generation == generation {
                        inner.tx.send_replace(None);
                    }
                }
            }));
        }
    }

    /// Remove whatever is showing now
    pub fn clear(&self) {
        let mut timer = self.inner.timer.lock().unwrap_or_else(|p| p.into_inner());
        timer.generation += 1;
        if let Some(task) = timer.task.take() {
            task.abort();
        }
        self.inner.tx.send_replace(None);
    }

    /// Cancel the pending auto-clear, leaving the current result in place
    pub fn shutdown(&self) {
        let mut timer = self.inner.timer.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(task) = timer.task.take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gymgate_common::api::CheckInData;

    const WINDOW: Duration = Duration::from_secs(4);

    #[tokio::test(start_paused = true)]
    async fn test_terminal_result_clears_after_window() {
        let presenter = ResultPresenter::new(WINDOW);
        presenter.present(ScanResult::denied(None));

        tokio::time::sleep(Duration::from_millis(3900)).await;
        assert!(presenter.current().is_some());

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(presenter.current().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_verifying_is_not_auto_cleared() {
        let presenter = ResultPresenter::new(WINDOW);
        presenter.present(ScanResult::verifying());

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(!presenter.current().unwrap().is_terminal());
    }

    #[tokio::test(start_paused = true)]
    async fn test_newer_result_restarts_the_window() {
        let presenter = ResultPresenter::new(WINDOW);
        presenter.present(ScanResult::denied(None));

        tokio::time::sleep(Duration::from_secs(3)).await;
        presenter.present(ScanResult::granted(CheckInData::default()));

        // The first result's timer would have fired here
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(presenter.current().unwrap().is_granted());

        tokio::time::sleep(Duration::from_millis(2100)).await;
        assert!(presenter.current().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_and_watchers() {
        let presenter = ResultPresenter::new(WINDOW);
        let mut rx = presenter.subscribe();

        presenter.present(ScanResult::denied(None));
        rx.changed().await.unwrap();
        assert!(rx.borrow_and_update().is_some());

        presenter.clear();
        rx.changed().await.unwrap();
        assert!(rx.borrow().is_none());
    }
}
