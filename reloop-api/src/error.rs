//! Error types for reloop-api
//!
//! Handlers return `ApiResult<T>`; every error renders as
//! `{"error": {"code": ..., "message": ...}}` with a matching status code.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::auth::AuthError;
use crate::services::WorkflowError;

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Resource not found (404)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Missing or invalid credentials (401)
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Conflict (409) - e.g., session already finished
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Internal server error (500)
    #[error("Internal server error: {0}")]
    Internal(String),

    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// reloop-common error
    #[error("Common error: {0}")]
    Common(#[from] reloop_common::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", msg),
            ApiError::Database(ref err) => {
                tracing::error!(error = %err, "Database error while handling request");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "DATABASE_ERROR",
                    err.to_string(),
                )
            }
            ApiError::Common(reloop_common::Error::NotFound(msg)) => {
                (StatusCode::NOT_FOUND, "NOT_FOUND", msg)
            }
            ApiError::Common(reloop_common::Error::InvalidInput(msg)) => {
                (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg)
            }
            ApiError::Common(ref err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "COMMON_ERROR",
                err.to_string(),
            ),
        };

        let body = Json(json!({
            "error": {
                "code": error_code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

impl From<WorkflowError> for ApiError {
    fn from(err: WorkflowError) -> Self {
        match err {
            WorkflowError::DeviceNotFound(_)
            | WorkflowError::TeardownUnavailable(_)
            | WorkflowError::SessionNotFound(_)
            | WorkflowError::ComponentNotFound { .. } => ApiError::NotFound(err.to_string()),
            WorkflowError::AlreadyCompleted(_)
            | WorkflowError::NotVerified(_)
            | WorkflowError::BypassUnavailable
            | WorkflowError::Transition(_)
            | WorkflowError::Runner(_) => ApiError::Conflict(err.to_string()),
            WorkflowError::Image(e) => ApiError::BadRequest(e.to_string()),
            WorkflowError::Common(e) => ApiError::Common(e),
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::EmailTaken => ApiError::Conflict(err.to_string()),
            AuthError::InvalidCredentials => ApiError::Unauthorized(err.to_string()),
            AuthError::InvalidInput(msg) => ApiError::BadRequest(msg),
            AuthError::Hash(msg) => ApiError::Internal(msg),
            AuthError::Common(e) => ApiError::Common(e),
        }
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (ApiError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (ApiError::BadRequest("x".into()), StatusCode::BAD_REQUEST),
            (ApiError::Unauthorized("x".into()), StatusCode::UNAUTHORIZED),
            (ApiError::Conflict("x".into()), StatusCode::CONFLICT),
            (
                ApiError::Common(reloop_common::Error::NotFound("device".into())),
                StatusCode::NOT_FOUND,
            ),
            (
                ApiError::Common(reloop_common::Error::Config("bad".into())),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (error, expected) in cases {
            assert_eq!(error.into_response().status(), expected);
        }
    }

    #[test]
    fn test_workflow_and_auth_errors_map() {
        let id = uuid::Uuid::new_v4();
        let cases = [
            (ApiError::from(WorkflowError::SessionNotFound(id)), StatusCode::NOT_FOUND),
            (ApiError::from(WorkflowError::TeardownUnavailable(id)), StatusCode::NOT_FOUND),
            (ApiError::from(WorkflowError::AlreadyCompleted(id)), StatusCode::CONFLICT),
            (ApiError::from(WorkflowError::BypassUnavailable), StatusCode::CONFLICT),
            (ApiError::from(AuthError::EmailTaken), StatusCode::CONFLICT),
            (ApiError::from(AuthError::InvalidCredentials), StatusCode::UNAUTHORIZED),
            (ApiError::from(AuthError::InvalidInput("x".into())), StatusCode::BAD_REQUEST),
        ];

        for (error, expected) in cases {
            assert_eq!(error.into_response().status(), expected);
        }
    }
}
