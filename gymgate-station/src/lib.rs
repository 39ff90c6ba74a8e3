//! gymgate-station library interface
//!
//! Gate-side engines (scanner, ingestion pipeline, result presentation,
//! gym channel subscriber, schedule watcher) and the member pass rotator.

pub mod camera;
pub mod channel;
pub mod client;
pub mod credential;
pub mod error;
pub mod feedback;
pub mod ingest;
pub mod logs;
pub mod presentation;
pub mod scanner;
pub mod station;
pub mod status;

pub use crate::credential::{CredentialRotator, PassState};
pub use crate::error::{CameraError, ChannelError, ClientError};
pub use crate::ingest::ScanPipeline;
pub use crate::presentation::ResultPresenter;
pub use crate::scanner::{ScannerEngine, ScannerState};
pub use crate::station::{AccessStation, StationDeps};
