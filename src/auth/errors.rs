//! Authentication error taxonomy and its wire envelope.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::db::{timestamp_to_iso8601, unix_now};

/// Every way a request can fail authentication, each with a stable machine
/// code. Clients are expected to branch on the code, never the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthError {
    MissingToken,
    InvalidAccessToken,
    AccessTokenExpired,
    MissingRefreshToken,
    InvalidRefreshToken,
    RefreshTokenExpired,
    UserNotFound,
    SessionExpired,
    RateLimitExceeded,
    Internal,
}

impl AuthError {
    pub fn code(&self) -> &'static str {
        match self {
            AuthError::MissingToken => "MISSING_TOKEN",
            AuthError::InvalidAccessToken => "INVALID_ACCESS_TOKEN",
            AuthError::AccessTokenExpired => "ACCESS_TOKEN_EXPIRED",
            AuthError::MissingRefreshToken => "MISSING_REFRESH_TOKEN",
            AuthError::InvalidRefreshToken => "INVALID_REFRESH_TOKEN",
            AuthError::RefreshTokenExpired => "REFRESH_TOKEN_EXPIRED",
            AuthError::UserNotFound => "USER_NOT_FOUND",
            AuthError::SessionExpired => "SESSION_EXPIRED",
            AuthError::RateLimitExceeded => "RATE_LIMIT_EXCEEDED",
            AuthError::Internal => "AUTH_ERROR",
        }
    }

    fn status_code(&self) -> StatusCode {
        match self {
            AuthError::MissingToken
            | AuthError::InvalidAccessToken
            | AuthError::AccessTokenExpired
            | AuthError::InvalidRefreshToken
            | AuthError::RefreshTokenExpired
            | AuthError::UserNotFound
            | AuthError::SessionExpired => StatusCode::UNAUTHORIZED,
            AuthError::MissingRefreshToken => StatusCode::BAD_REQUEST,
            AuthError::RateLimitExceeded => StatusCode::TOO_MANY_REQUESTS,
            AuthError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn message(&self) -> &'static str {
        match self {
            AuthError::MissingToken => "Authentication required",
            AuthError::InvalidAccessToken => "Invalid access token",
            AuthError::AccessTokenExpired => "Access token has expired",
            AuthError::MissingRefreshToken => "Refresh token is required",
            AuthError::InvalidRefreshToken => "Invalid refresh token",
            AuthError::RefreshTokenExpired => "Refresh token has expired or been revoked",
            AuthError::UserNotFound => "User not found",
            AuthError::SessionExpired => "Session has expired",
            AuthError::RateLimitExceeded => "Too many requests. Please try again later.",
            AuthError::Internal => "Authentication error",
        }
    }

    /// Only an expired access token invites the client to retry with its
    /// refresh token.
    fn requires_refresh(&self) -> bool {
        matches!(self, AuthError::AccessTokenExpired)
    }
}

/// Build the error envelope shared by every failing endpoint.
pub(crate) fn error_body(code: &str, message: &str, requires_refresh: bool) -> serde_json::Value {
    let mut error = serde_json::json!({
        "code": code,
        "message": message,
    });
    if requires_refresh {
        error["requiresRefresh"] = serde_json::Value::Bool(true);
    }
    serde_json::json!({
        "success": false,
        "error": error,
        "timestamp": timestamp_to_iso8601(unix_now()),
    })
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let body = error_body(self.code(), self.message(), self.requires_refresh());
        (self.status_code(), Json(body)).into_response()
    }
}
