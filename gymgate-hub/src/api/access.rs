//! Token issuance, check-in and attendance log endpoints

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use gymgate_common::api::{ApiResponse, CheckInData, CheckInRequest, IssueTokenRequest, IssuedToken};
use gymgate_common::AttendanceRecord;
use tracing::debug;

use crate::error::{ApiError, ApiResult};
use crate::AppState;

/// POST /api/gyms/:gym_id/access-token
///
/// Issue a fresh rotating token for a member of this gym.
pub async fn issue_token(
    State(state): State<AppState>,
    Path(gym_id): Path<String>,
    Json(req): Json<IssueTokenRequest>,
) -> ApiResult<Json<ApiResponse<IssuedToken>>> {
    if req.member_id.trim().is_empty() {
        return Err(ApiError::BadRequest("member_id is required".to_string()));
    }

    let issued = state
        .authority
        .issue(&gym_id, req.member_id.trim(), gymgate_common::time::now())
        .await?;

    Ok(Json(ApiResponse::ok(
        IssuedToken {
            token: issued.token,
            issued_at: issued.issued_at,
            expires_at: issued.expires_at,
        },
        "Token issued",
    )))
}

/// POST /api/gyms/:gym_id/check-in
///
/// Verify a scanned token. Denials come back as 403 with the reason in
/// `message`.
pub async fn check_in(
    State(state): State<AppState>,
    Path(gym_id): Path<String>,
    Json(req): Json<CheckInRequest>,
) -> ApiResult<Json<ApiResponse<CheckInData>>> {
    debug!("Check-in request for gym {}", gym_id);
    let data = state
        .authority
        .check_in(&gym_id, &req.token, gymgate_common::time::now())
        .await?;

    Ok(Json(ApiResponse::ok(data, "Check-in successful")))
}

/// GET /api/gyms/:gym_id/logs
///
/// Newest attendance records first, at most 50.
pub async fn attendance_logs(
    State(state): State<AppState>,
    Path(gym_id): Path<String>,
) -> Json<ApiResponse<Vec<AttendanceRecord>>> {
    let records = state.authority.attendance().recent(&gym_id);
    let count = records.len();
    Json(ApiResponse::ok(records, format!("{} records", count)))
}

pub fn access_routes() -> Router<AppState> {
    Router::new()
        .route("/api/gyms/:gym_id/access-token", post(issue_token))
        .route("/api/gyms/:gym_id/check-in", post(check_in))
        .route("/api/gyms/:gym_id/logs", get(attendance_logs))
}
