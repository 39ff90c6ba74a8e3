//! Error types for gymgate-hub

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use gymgate_common::api::ApiResponse;
use thiserror::Error;

use crate::authority::AccessDenied;

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Issuance or check-in refused (403)
    #[error(transparent)]
    Denied(#[from] AccessDenied),

    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code) = match &self {
            ApiError::Denied(_) => (StatusCode::FORBIDDEN, "ACCESS_DENIED"),
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
        };

        let body: ApiResponse<()> = ApiResponse::error(error_code, self.to_string());
        (status, Json(body)).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
