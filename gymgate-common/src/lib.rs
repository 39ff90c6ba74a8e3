//! # GymGate Common Library
//!
//! Shared code for the GymGate access-control services:
//! - Scan result and attendance types shared by gate stations and the hub
//! - Rotating access token format (signing and verification)
//! - Gym-scoped event channels (`GymChannels`)
//! - Operating-schedule evaluation
//! - Configuration loading
//! - Timing constants and time helpers

pub mod api;
pub mod config;
pub mod error;
pub mod events;
pub mod scan;
pub mod schedule;
pub mod time;
pub mod timing;
pub mod token;

pub use error::{Error, Result};
pub use events::{GymChannels, GymEvent, GymSubscription};
pub use scan::{AttendanceRecord, AttendanceStatus, ScanAttempt, ScanOutcome, ScanResult};
pub use schedule::{evaluate, GymStatus, OperatingSchedule, SessionKind};
pub use token::{AccessToken, TokenClaims, TokenError, TokenKey};
