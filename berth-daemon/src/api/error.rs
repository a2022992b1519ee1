//! API error mapping.
//!
//! Wraps core errors for the HTTP layer: NotFound-family → 404,
//! Conflict-family → 409, disallowed/invalid input → 400, everything else →
//! 500 with a diagnostic message (never a raw library error).

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use berth_core::BerthError;
use serde::Serialize;

/// API result type.
pub type ApiResult<T> = Result<T, ApiError>;

/// Error carried through handlers to the response mapper.
#[derive(Debug)]
pub struct ApiError(pub BerthError);

/// Error response body.
#[derive(Serialize)]
pub struct ErrorResponse {
    pub code: &'static str,
    pub message: String,
}

impl ApiError {
    /// HTTP status for this error.
    pub fn status_code(&self) -> StatusCode {
        match self.0 {
            BerthError::NotFound { .. }
            | BerthError::RepositoryNotFound { .. }
            | BerthError::BranchNotFound { .. }
            | BerthError::FileNotFound { .. } => StatusCode::NOT_FOUND,
            BerthError::Conflict { .. } | BerthError::RepositoryExists { .. } => {
                StatusCode::CONFLICT
            }
            BerthError::NotAllowed { .. }
            | BerthError::ValidationFailed { .. }
            | BerthError::InvalidConfig { .. } => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable error code string.
    pub fn error_code(&self) -> &'static str {
        match self.0 {
            BerthError::NotFound { .. }
            | BerthError::RepositoryNotFound { .. }
            | BerthError::BranchNotFound { .. }
            | BerthError::FileNotFound { .. } => "NOT_FOUND",
            BerthError::Conflict { .. } | BerthError::RepositoryExists { .. } => "CONFLICT",
            BerthError::NotAllowed { .. } => "NOT_ALLOWED",
            BerthError::ValidationFailed { .. } => "VALIDATION_FAILED",
            BerthError::InvalidConfig { .. } => "INVALID_CONFIG",
            BerthError::AuthenticationFailed { .. } => "AUTHENTICATION_FAILED",
            BerthError::CloneFailed { .. } => "CLONE_FAILED",
            BerthError::PullFailed { .. } => "PULL_FAILED",
            BerthError::DiskSpace { .. } => "DISK_SPACE",
            BerthError::Timeout { .. } => "TIMEOUT",
            _ => "INTERNAL_ERROR",
        }
    }
}

impl From<BerthError> for ApiError {
    fn from(err: BerthError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self.0, "request failed");
        }
        let body = ErrorResponse { code: self.error_code(), message: self.0.to_string() };
        (status, Json(body)).into_response()
    }
}
