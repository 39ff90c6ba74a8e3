//! gymgate-hub library interface
//!
//! Reference access authority plus the gym channel server. Exposed as a
//! library so the router can be driven in integration tests.

pub mod api;
pub mod attendance;
pub mod authority;
pub mod directory;
pub mod error;

pub use crate::authority::{AccessAuthority, AccessDenied};
pub use crate::error::{ApiError, ApiResult};

use axum::Router;
use chrono::{DateTime, Utc};
use gymgate_common::GymChannels;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub authority: Arc<AccessAuthority>,
    /// Per-gym broadcast channels behind the SSE endpoints
    pub channels: GymChannels,
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(authority: AccessAuthority, channels: GymChannels) -> Self {
        Self {
            authority: Arc::new(authority),
            channels,
            startup_time: Utc::now(),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::health_routes())
        .merge(api::access_routes())
        .merge(api::event_routes())
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
