//! Test Helper Utilities
//!
//! Scriptable stand-ins for the station's collaborators

#![allow(dead_code)]

pub mod mocks;

pub use mocks::{MockCamera, MockPublisher, MockTokenSource, MockVerifier, StaticLogs};
