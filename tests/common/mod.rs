#![allow(dead_code)]

use axum::{
    Router,
    body::Body,
    http::{Request, Response, StatusCode, header},
};
use gatewarden::db::{Database, Identity};
use gatewarden::jwt::{AuthConfig, Claims, TokenIssuer, TokenPair, TokenType};
use gatewarden::password::hash_password;
use gatewarden::rate_limit::RateLimiter;
use gatewarden::{ServerConfig, create_app};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

pub const TEST_ACCESS_SECRET: &str = "test-access-secret-0123456789abcdef";
pub const TEST_REFRESH_SECRET: &str = "test-refresh-secret-0123456789abcdef";

pub fn test_auth_config() -> AuthConfig {
    AuthConfig::new(TEST_ACCESS_SECRET, TEST_REFRESH_SECRET)
}

/// Server config with rate limits high enough to never trip in tests that
/// are not about rate limiting.
pub fn test_server_config(db: Database) -> ServerConfig {
    let window = Duration::from_secs(900);
    ServerConfig {
        db,
        auth: test_auth_config(),
        auth_limiter: Arc::new(RateLimiter::new(1000, window)),
        general_limiter: Arc::new(RateLimiter::new(10_000, window)),
        count_successful_logins: false,
    }
}

/// Create a test app and return (app, db, issuer). The issuer signs with the
/// same secrets as the app, so tests can mint their own tokens.
pub async fn create_test_app() -> (Router, Database, TokenIssuer) {
    let db = Database::open(":memory:")
        .await
        .expect("Failed to open test database");
    let config = test_server_config(db.clone());
    let issuer = TokenIssuer::new(&config.auth);
    (create_app(&config), db, issuer)
}

/// Insert a user directly, bypassing the register endpoint. Returns the
/// user id.
pub async fn seed_user(db: &Database, username: &str, email: &str, password: &str) -> i64 {
    let hash = hash_password(password).expect("Failed to hash password");
    db.users()
        .create(username, email, &hash)
        .await
        .expect("Failed to create user")
}

/// Load the credential-free projection of a seeded user.
pub async fn identity_of(db: &Database, user_id: i64) -> Identity {
    db.users()
        .get_by_id(user_id)
        .await
        .expect("Failed to load user")
        .expect("User not found")
        .identity()
}

/// Mint a token pair for an existing user and persist the refresh half as a
/// live session, the same way login does.
pub async fn issue_session(db: &Database, issuer: &TokenIssuer, user_id: i64) -> TokenPair {
    let identity = identity_of(db, user_id).await;
    let pair = issuer
        .issue_pair(&identity)
        .expect("Failed to issue token pair");
    db.sessions()
        .create(user_id, &pair.refresh_token, pair.refresh_expires_at)
        .await
        .expect("Failed to persist session");
    pair
}

fn expired_claims(identity: &Identity, token_type: TokenType) -> Claims {
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("clock before epoch")
        .as_secs();
    Claims {
        sub: identity.id.to_string(),
        username: identity.username.clone(),
        email: identity.email.clone(),
        role: identity.role,
        token_type,
        jti: uuid::Uuid::new_v4().to_string(),
        iat: now - 3600,
        exp: now - 60,
    }
}

/// Sign an access token that expired a minute ago.
pub fn expired_access_token(identity: &Identity) -> String {
    let claims = expired_claims(identity, TokenType::Access);
    jsonwebtoken::encode(
        &jsonwebtoken::Header::default(),
        &claims,
        &jsonwebtoken::EncodingKey::from_secret(TEST_ACCESS_SECRET.as_bytes()),
    )
    .expect("Failed to sign token")
}

/// Sign a refresh token that expired a minute ago.
pub fn expired_refresh_token(identity: &Identity) -> String {
    let claims = expired_claims(identity, TokenType::Refresh);
    jsonwebtoken::encode(
        &jsonwebtoken::Header::default(),
        &claims,
        &jsonwebtoken::EncodingKey::from_secret(TEST_REFRESH_SECRET.as_bytes()),
    )
    .expect("Failed to sign token")
}

/// Build a POST request with a JSON body.
pub fn json_post(uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

/// Build a GET request with a bearer access token.
pub fn authed_get(uri: &str, access_token: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", access_token))
        .body(Body::empty())
        .unwrap()
}

/// Build a GET request carrying both the bearer access token and the
/// refresh token header.
pub fn authed_get_with_refresh(
    uri: &str,
    access_token: &str,
    refresh_token: &str,
) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", access_token))
        .header("x-refresh-token", refresh_token)
        .body(Body::empty())
        .unwrap()
}

/// Read a response body as JSON.
pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("Failed to read body");
    serde_json::from_slice(&bytes).expect("Body was not valid JSON")
}

/// Pull the error code out of an error envelope.
pub fn error_code(body: &serde_json::Value) -> &str {
    body["error"]["code"].as_str().unwrap_or("")
}

/// Register a user through the API and return the response body.
pub async fn register(app: &Router, username: &str, email: &str, password: &str) -> serde_json::Value {
    let response = app
        .clone()
        .oneshot(json_post(
            "/api/auth/register",
            serde_json::json!({ "username": username, "email": email, "password": password }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    body_json(response).await
}

/// Log in through the API and return the response body.
pub async fn login(app: &Router, email: &str, password: &str) -> serde_json::Value {
    let response = app
        .clone()
        .oneshot(json_post(
            "/api/auth/login",
            serde_json::json!({ "email": email, "password": password }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    body_json(response).await
}
