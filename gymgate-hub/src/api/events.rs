//! Gym channel endpoints
//!
//! `GET /api/gyms/:gym_id/events` joins the gym's channel for as long as
//! the SSE connection stays open. `POST` on the same path publishes a
//! classified scan to everyone joined.

use axum::{
    extract::{Path, State},
    response::sse::{Event, KeepAlive, Sse},
    routing::get,
    Json, Router,
};
use futures::stream::Stream;
use gymgate_common::api::ApiResponse;
use gymgate_common::events::ScanEvent;
use gymgate_common::timing::CHANNEL_KEEPALIVE;
use gymgate_common::GymEvent;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use tracing::{debug, info, warn};

use crate::error::{ApiError, ApiResult};
use crate::AppState;

/// Publish acknowledgement
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishReceipt {
    /// Sessions the event was delivered to
    pub delivered: usize,
}

/// GET /api/gyms/:gym_id/events
///
/// Streams:
/// - ScanResolved
pub async fn gym_event_stream(
    State(state): State<AppState>,
    Path(gym_id): Path<String>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    info!("SSE client joined gym {}", gym_id);

    // Leaving happens when axum drops the stream on disconnect
    let mut subscription = state.channels.join(&gym_id);

    let stream = async_stream::stream! {
        yield Ok(Event::default().comment(format!("joined {}", gym_id)));

        while let Some(event) = subscription.recv().await {
            let event_type = event.event_type();
            match serde_json::to_string(&event) {
                Ok(json) => {
                    debug!("SSE: Sending {} to gym {}", event_type, gym_id);
                    yield Ok(Event::default().event(event_type).data(json));
                }
                Err(e) => {
                    warn!("SSE: Failed to serialize event {}: {}", event_type, e);
                }
            }
        }
    };

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(CHANNEL_KEEPALIVE)
            .text("heartbeat"),
    )
}

/// POST /api/gyms/:gym_id/events
///
/// The path decides the channel; a `gym_id` in the body is overwritten.
pub async fn publish_scan(
    State(state): State<AppState>,
    Path(gym_id): Path<String>,
    Json(mut scan): Json<ScanEvent>,
) -> ApiResult<Json<ApiResponse<PublishReceipt>>> {
    if !scan.result.is_terminal() {
        return Err(ApiError::BadRequest(
            "only granted or denied results can be published".to_string(),
        ));
    }

    scan.gym_id = gym_id.clone();
    let status = scan.result.status_str();
    let delivered = state.channels.publish(&gym_id, GymEvent::ScanResolved(scan));
    debug!("Published {} scan to gym {} ({} sessions)", status, gym_id, delivered);

    Ok(Json(ApiResponse::ok(PublishReceipt { delivered }, "Published")))
}

pub fn event_routes() -> Router<AppState> {
    Router::new().route(
        "/api/gyms/:gym_id/events",
        get(gym_event_stream).post(publish_scan),
    )
}
