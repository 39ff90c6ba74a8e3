//! HTTP API handlers for gymgate-hub
//!
//! REST endpoints for token issuance, check-in and attendance logs, plus
//! one SSE stream per gym for scan broadcasts.

pub mod access;
pub mod events;
pub mod health;

pub use access::access_routes;
pub use events::event_routes;
pub use health::health_routes;
