//! Authentication and session lifecycle endpoints.
//!
//! Routes (nested under /api/auth):
//! - POST /register: create an account, start a session
//! - POST /login: verify credentials, start a session
//! - POST /refresh: exchange a refresh token for a rotated pair
//! - POST /logout: end the session named by the request
//! - POST /logout-all: revoke every session for the caller
//! - GET /me: the caller's identity, freshly loaded
//! - GET /sessions: the caller's live sessions, without token values
//!
//! register, login, and refresh sit behind the strict auth limiter; the
//! rest are covered by the general limiter applied to the whole API.

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::error;

use super::error::{ApiError, ResultExt};
use crate::auth::{AuthError, AuthGate, ClientKey, rotate_refresh_session};
use crate::db::{Database, Identity, UserRole, datetime_to_iso8601, timestamp_to_iso8601};
use crate::impl_has_auth_backend;
use crate::jwt::{TokenIssuer, TokenPair};
use crate::password::{hash_password, verify_password};
use crate::rate_limit::{RateLimiter, enforce};
use crate::revocation;

#[derive(Clone)]
pub struct AuthApiState {
    pub db: Database,
    pub issuer: Arc<TokenIssuer>,
    pub auth_limiter: Arc<RateLimiter>,
    /// When false, a successful login clears the caller's auth window so
    /// only failed attempts accumulate.
    pub count_successful_logins: bool,
}

impl_has_auth_backend!(AuthApiState);

pub fn router(state: AuthApiState) -> Router {
    let credential_router = Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/refresh", post(refresh))
        .with_state(state.clone())
        .layer(middleware::from_fn_with_state(
            state.auth_limiter.clone(),
            enforce,
        ));

    let session_router = Router::new()
        .route("/logout", post(logout))
        .route("/logout-all", post(logout_all))
        .route("/me", get(me))
        .route("/sessions", get(sessions))
        .with_state(state);

    Router::new().merge(credential_router).merge(session_router)
}

const MAX_USERNAME_LENGTH: usize = 32;
const MAX_EMAIL_LENGTH: usize = 254;
const MIN_PASSWORD_LENGTH: usize = 8;
const MAX_PASSWORD_LENGTH: usize = 128;

#[derive(Deserialize)]
struct RegisterRequest {
    username: String,
    email: String,
    password: String,
}

#[derive(Deserialize)]
struct LoginRequest {
    email: String,
    password: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RefreshRequest {
    #[serde(default)]
    refresh_token: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LogoutRequest {
    #[serde(default)]
    refresh_token: Option<String>,
}

/// Body returned by every endpoint that starts or renews a session.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AuthResponse {
    identity: Identity,
    access_token: String,
    refresh_token: String,
    access_token_expires_at: String,
    refresh_token_expires_at: String,
}

impl AuthResponse {
    fn new(identity: Identity, pair: TokenPair) -> Self {
        Self {
            identity,
            access_token_expires_at: timestamp_to_iso8601(pair.access_expires_at),
            refresh_token_expires_at: timestamp_to_iso8601(pair.refresh_expires_at),
            access_token: pair.access_token,
            refresh_token: pair.refresh_token,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SessionInfo {
    id: i64,
    created_at: String,
    expires_at: String,
}

#[derive(Serialize)]
struct SessionsResponse {
    sessions: Vec<SessionInfo>,
}

fn validate_username(username: &str) -> Result<(), ApiError> {
    if username.is_empty() {
        return Err(ApiError::validation("Username cannot be empty"));
    }

    if username.len() > MAX_USERNAME_LENGTH {
        return Err(ApiError::validation(
            "Username cannot be longer than 32 characters",
        ));
    }

    // Only allow alphanumeric and underscores
    if !username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        return Err(ApiError::validation(
            "Username can only contain letters, numbers, and underscores",
        ));
    }

    Ok(())
}

fn validate_email(email: &str) -> Result<(), ApiError> {
    if email.is_empty() {
        return Err(ApiError::validation("Email cannot be empty"));
    }

    if email.len() > MAX_EMAIL_LENGTH {
        return Err(ApiError::validation("Email is too long"));
    }

    if !email.contains('@') {
        return Err(ApiError::validation("Email must be a valid address"));
    }

    Ok(())
}

fn validate_password(password: &str) -> Result<(), ApiError> {
    // Counted in characters, not bytes.
    let length = password.chars().count();

    if length < MIN_PASSWORD_LENGTH {
        return Err(ApiError::validation(
            "Password must be at least 8 characters",
        ));
    }

    if length > MAX_PASSWORD_LENGTH {
        return Err(ApiError::validation(
            "Password cannot be longer than 128 characters",
        ));
    }

    Ok(())
}

/// Mint a pair for the identity and persist the refresh half as a session.
async fn start_session(state: &AuthApiState, identity: &Identity) -> Result<TokenPair, ApiError> {
    let pair = state.issuer.issue_pair(identity).map_err(|e| {
        error!("Failed to mint token pair: {}", e);
        ApiError::Internal
    })?;

    state
        .db
        .sessions()
        .create(identity.id, &pair.refresh_token, pair.refresh_expires_at)
        .await
        .db_err("Failed to persist session")?;

    Ok(pair)
}

async fn register(
    State(state): State<AuthApiState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let username = payload.username.trim();
    let email = payload.email.trim();

    validate_username(username)?;
    validate_email(email)?;
    validate_password(&payload.password)?;

    if state
        .db
        .users()
        .get_by_username(username)
        .await
        .db_err("Failed to check username")?
        .is_some()
    {
        return Err(ApiError::UserExists("Username is already taken"));
    }

    if state
        .db
        .users()
        .get_by_email(email)
        .await
        .db_err("Failed to check email")?
        .is_some()
    {
        return Err(ApiError::UserExists("Email is already registered"));
    }

    let password_hash = hash_password(&payload.password).map_err(|e| {
        error!("Failed to hash password: {}", e);
        ApiError::Internal
    })?;

    let id = state
        .db
        .users()
        .create(username, email, &password_hash)
        .await
        .db_err("Failed to create user")?;

    let identity = Identity {
        id,
        username: username.to_string(),
        email: email.to_string(),
        role: UserRole::User,
    };
    let pair = start_session(&state, &identity).await?;

    Ok((StatusCode::CREATED, Json(AuthResponse::new(identity, pair))))
}

async fn login(
    State(state): State<AuthApiState>,
    ClientKey(client_key): ClientKey,
    Json(payload): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let email = payload.email.trim();

    // Unknown email and wrong password are indistinguishable to the caller.
    let user = state
        .db
        .users()
        .get_by_email(email)
        .await
        .db_err("Failed to look up user")?
        .ok_or(ApiError::InvalidCredentials)?;

    if !verify_password(&payload.password, &user.password_hash) {
        return Err(ApiError::InvalidCredentials);
    }

    let identity = user.identity();
    let pair = start_session(&state, &identity).await?;

    if !state.count_successful_logins {
        state.auth_limiter.reset(&client_key);
    }

    Ok(Json(AuthResponse::new(identity, pair)))
}

async fn refresh(
    State(state): State<AuthApiState>,
    Json(payload): Json<RefreshRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let token = payload.refresh_token.as_deref().map(str::trim).unwrap_or("");
    if token.is_empty() {
        return Err(AuthError::MissingRefreshToken.into());
    }

    let (identity, pair) = rotate_refresh_session(&state, token).await?;

    Ok(Json(AuthResponse::new(identity, pair)))
}

async fn logout(
    State(state): State<AuthApiState>,
    AuthGate(_identity): AuthGate,
    payload: Option<Json<LogoutRequest>>,
) -> Result<impl IntoResponse, ApiError> {
    // Idempotent: deleting an unknown or already-rotated token still
    // reports success, since the end state is the same.
    if let Some(token) = payload.and_then(|Json(p)| p.refresh_token) {
        let token = token.trim();
        if !token.is_empty() {
            state
                .db
                .sessions()
                .delete_by_token(token)
                .await
                .db_err("Failed to delete session")?;
        }
    }

    Ok(Json(serde_json::json!({ "success": true })))
}

async fn logout_all(
    State(state): State<AuthApiState>,
    AuthGate(identity): AuthGate,
) -> Result<impl IntoResponse, ApiError> {
    let revoked = revocation::revoke_all(&state.db, identity.id)
        .await
        .db_err("Failed to revoke sessions")?;

    Ok(Json(serde_json::json!({ "success": true, "revoked": revoked })))
}

async fn me(AuthGate(identity): AuthGate) -> Json<Identity> {
    Json(identity)
}

async fn sessions(
    State(state): State<AuthApiState>,
    AuthGate(identity): AuthGate,
) -> Result<impl IntoResponse, ApiError> {
    let records = state
        .db
        .sessions()
        .list_valid_by_user(identity.id)
        .await
        .db_err("Failed to list sessions")?;

    let sessions = records
        .into_iter()
        .map(|record| SessionInfo {
            id: record.id,
            created_at: datetime_to_iso8601(&record.created_at),
            expires_at: datetime_to_iso8601(&record.expires_at),
        })
        .collect();

    Ok(Json(SessionsResponse { sessions }))
}
