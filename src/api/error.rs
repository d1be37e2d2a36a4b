//! Shared error handling for API endpoints.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tracing::error;

use crate::auth::{AuthError, error_body};

/// Extension trait for concise error mapping on Results.
pub trait ResultExt<T> {
    fn db_err(self, msg: &str) -> Result<T, ApiError>;
}

impl<T, E: std::fmt::Display> ResultExt<T> for Result<T, E> {
    fn db_err(self, msg: &str) -> Result<T, ApiError> {
        self.map_err(|e| ApiError::db_error(msg, e))
    }
}

/// Endpoint error type with automatic response conversion. Uses the same
/// wire envelope as [`AuthError`].
pub enum ApiError {
    Validation(String),
    UserExists(&'static str),
    InvalidCredentials,
    Auth(AuthError),
    Internal,
}

impl ApiError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn db_error(context: &str, e: impl std::fmt::Display) -> Self {
        error!("{}: {}", context, e);
        Self::Internal
    }
}

impl From<AuthError> for ApiError {
    fn from(e: AuthError) -> Self {
        Self::Auth(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            ApiError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg),
            ApiError::UserExists(msg) => (StatusCode::CONFLICT, "USER_EXISTS", msg.to_string()),
            ApiError::InvalidCredentials => (
                StatusCode::UNAUTHORIZED,
                "INVALID_CREDENTIALS",
                "Invalid email or password".to_string(),
            ),
            ApiError::Auth(e) => return e.into_response(),
            ApiError::Internal => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "AUTH_ERROR",
                "Internal server error".to_string(),
            ),
        };
        (status, Json(error_body(code, &message, false))).into_response()
    }
}
