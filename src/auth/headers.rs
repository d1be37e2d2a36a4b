//! Token headers: inbound parsing and the rotated-pair hand-off.
//!
//! A silent refresh happens inside the auth extractor, long before the
//! response exists. The fresh pair is parked in a task-local so the
//! [`add_rotation_headers`] middleware can attach it on the way out.

use std::cell::RefCell;

use axum::{
    extract::Request,
    http::{HeaderMap, HeaderValue, header},
    middleware::Next,
    response::Response,
};

use crate::db::timestamp_to_iso8601;
use crate::jwt::TokenPair;

/// Header clients send alongside an expired access token to request a
/// silent refresh.
pub const REFRESH_TOKEN_HEADER: &str = "x-refresh-token";

/// Response header carrying a freshly rotated access token.
pub const NEW_ACCESS_TOKEN_HEADER: &str = "x-new-access-token";

/// Response header carrying the rotated refresh token that replaces the one
/// just consumed.
pub const NEW_REFRESH_TOKEN_HEADER: &str = "x-new-refresh-token";

/// Response header with the new access token's expiry (ISO 8601).
pub const ACCESS_EXPIRES_AT_HEADER: &str = "x-access-token-expires-at";

tokio::task_local! {
    /// Pair minted by a silent refresh during extraction, waiting to be
    /// surfaced as response headers.
    static ROTATED_PAIR: RefCell<Option<TokenPair>>;
}

/// Extract the bearer token from the Authorization header.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let token = value.strip_prefix("Bearer ")?.trim();
    if token.is_empty() { None } else { Some(token) }
}

/// Extract the refresh token header, if present and non-empty.
pub fn refresh_token_header(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(REFRESH_TOKEN_HEADER)?.to_str().ok()?.trim();
    if value.is_empty() { None } else { Some(value) }
}

/// Park a rotated pair for the response middleware. No-op outside a request
/// scope (direct extractor tests).
pub(super) fn stash_rotated_pair(pair: &TokenPair) {
    let _ = ROTATED_PAIR.try_with(|cell| {
        cell.borrow_mut().replace(pair.clone());
    });
}

/// Middleware surfacing a silently rotated pair as response headers. Must
/// wrap every route that uses the auth extractor or rotated tokens would be
/// minted, persisted, and then lost.
pub async fn add_rotation_headers(request: Request, next: Next) -> Response {
    ROTATED_PAIR
        .scope(RefCell::new(None), async move {
            let mut response = next.run(request).await;

            let pair = ROTATED_PAIR.with(|cell| cell.borrow_mut().take());
            if let Some(pair) = pair {
                let expires_at = timestamp_to_iso8601(pair.access_expires_at);
                let headers = response.headers_mut();
                if let Ok(value) = HeaderValue::from_str(&pair.access_token) {
                    headers.insert(NEW_ACCESS_TOKEN_HEADER, value);
                }
                if let Ok(value) = HeaderValue::from_str(&pair.refresh_token) {
                    headers.insert(NEW_REFRESH_TOKEN_HEADER, value);
                }
                if let Ok(value) = HeaderValue::from_str(&expires_at) {
                    headers.insert(ACCESS_EXPIRES_AT_HEADER, value);
                }
            }

            response
        })
        .await
}
