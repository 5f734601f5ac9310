//! Single `IntoResponse` boundary: every handler returns `Result<_, ApiError>`
//! and every domain/storage error collapses to an HTTP status here, rather
//! than mapping `StatusCode` inline at each call site.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use agentctl_core::CoreError;

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn not_found(message: impl Into<String>) -> Self {
        Self { status: StatusCode::NOT_FOUND, message: message.into() }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        tracing::error!(status = %self.status, message = %self.message, "request failed");
        (self.status, Json(ErrorBody { error: self.message })).into_response()
    }
}

impl From<CoreError> for ApiError {
    fn from(error: CoreError) -> Self {
        let status = match &error {
            CoreError::Client(_) => StatusCode::BAD_REQUEST,
            CoreError::DuplicateItem(_) => StatusCode::CONFLICT,
            CoreError::NotFound(_) => StatusCode::NOT_FOUND,
            CoreError::Service(_) | CoreError::WorkflowFailure(_) | CoreError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        Self { status, message: error.to_string() }
    }
}

/// Repository calls return `anyhow::Result`; a bare `anyhow::Error` here is
/// always a storage-layer failure, not a domain-level 4xx.
impl From<anyhow::Error> for ApiError {
    fn from(error: anyhow::Error) -> Self {
        Self { status: StatusCode::INTERNAL_SERVER_ERROR, message: error.to_string() }
    }
}
