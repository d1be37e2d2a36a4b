//! The per-request authentication gate.
//!
//! Every protected request passes through here: the bearer token is
//! verified, the user is re-fetched from the store (claims are never
//! trusted as current), and an expired access token falls back to a silent
//! refresh when the client supplied its refresh token. Rotation uses a
//! check-and-set update so concurrent refreshes of the same token produce
//! exactly one winner.

use std::future::Future;
use std::time::Duration;

use axum::{extract::FromRequestParts, http::request::Parts};
use tracing::error;

use super::errors::AuthError;
use super::headers::{bearer_token, refresh_token_header, stash_rotated_pair};
use super::state::HasAuthBackend;
use crate::db::Identity;
use crate::jwt::{JwtError, TokenPair, TokenType};

/// Upper bound on any single store call made while authenticating. A hung
/// store surfaces as AUTH_ERROR instead of a stalled request.
const STORE_TIMEOUT: Duration = Duration::from_secs(5);

/// Extractor for endpoints that require authentication.
/// On success the handler receives the freshly loaded [`Identity`], never
/// claims copied out of the token.
pub struct AuthGate(pub Identity);

impl<S> FromRequestParts<S> for AuthGate
where
    S: HasAuthBackend + Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        authenticate_request(parts, state).await.map(AuthGate)
    }
}

/// Core authentication logic: verify the access token, or rotate the
/// refresh token when the access token has merely expired.
async fn authenticate_request<S>(parts: &Parts, state: &S) -> Result<Identity, AuthError>
where
    S: HasAuthBackend + Send + Sync,
{
    let Some(access_token) = bearer_token(&parts.headers) else {
        return Err(AuthError::MissingToken);
    };

    match state.issuer().verify(access_token, TokenType::Access) {
        Ok(claims) => {
            let user_id = claims.user_id().ok_or(AuthError::InvalidAccessToken)?;
            resolve_identity(state, user_id).await
        }
        // Only a validly signed but expired access token may fall back to
        // the refresh path; anything else is terminal.
        Err(JwtError::Expired) => {
            let Some(refresh_token) = refresh_token_header(&parts.headers) else {
                return Err(AuthError::AccessTokenExpired);
            };
            let (identity, pair) = rotate_refresh_session(state, refresh_token).await?;
            stash_rotated_pair(&pair);
            Ok(identity)
        }
        Err(_) => Err(AuthError::InvalidAccessToken),
    }
}

/// Re-fetch the user behind a verified access token and require at least
/// one live session, so logout-everywhere cuts off in-flight access tokens.
async fn resolve_identity<S>(state: &S, user_id: i64) -> Result<Identity, AuthError>
where
    S: HasAuthBackend + Send + Sync,
{
    let user = store_call("look up user", state.db().users().get_by_id(user_id))
        .await?
        .ok_or(AuthError::UserNotFound)?;

    let live = store_call(
        "check live sessions",
        state.db().sessions().has_valid_for_user(user.id),
    )
    .await?;
    if !live {
        return Err(AuthError::SessionExpired);
    }

    Ok(user.identity())
}

/// Consume a refresh token: verify it, match it to a live session, re-fetch
/// the user, mint a replacement pair, and swap the session to the new token.
/// A concurrent refresh of the same token loses the swap and is rejected.
pub(crate) async fn rotate_refresh_session<S>(
    state: &S,
    refresh_token: &str,
) -> Result<(Identity, TokenPair), AuthError>
where
    S: HasAuthBackend + Send + Sync,
{
    let claims = state
        .issuer()
        .verify(refresh_token, TokenType::Refresh)
        .map_err(|e| match e {
            JwtError::Expired => AuthError::RefreshTokenExpired,
            _ => AuthError::InvalidRefreshToken,
        })?;
    let claimed_user = claims.user_id().ok_or(AuthError::InvalidRefreshToken)?;

    let record = store_call(
        "look up refresh session",
        state.db().sessions().find_valid_by_token(refresh_token),
    )
    .await?
    .ok_or(AuthError::RefreshTokenExpired)?;

    // A signed token pointing at someone else's session row means the store
    // and the token disagree; trust neither.
    if record.user_id != claimed_user {
        return Err(AuthError::InvalidRefreshToken);
    }

    let user = store_call("look up user", state.db().users().get_by_id(record.user_id))
        .await?
        .ok_or(AuthError::UserNotFound)?;
    let identity = user.identity();

    let pair = state.issuer().issue_pair(&identity).map_err(|e| {
        error!("Failed to mint token pair: {}", e);
        AuthError::Internal
    })?;

    let rotated = store_call(
        "rotate refresh session",
        state.db().sessions().rotate(
            record.id,
            refresh_token,
            &pair.refresh_token,
            pair.refresh_expires_at,
        ),
    )
    .await?;
    if !rotated {
        // Lost the race: another request consumed this token first.
        return Err(AuthError::RefreshTokenExpired);
    }

    // Same liveness rule as the non-refresh path, so a logout-everywhere
    // racing this rotation still invalidates the request.
    let live = store_call(
        "check live sessions",
        state.db().sessions().has_valid_for_user(record.user_id),
    )
    .await?;
    if !live {
        return Err(AuthError::SessionExpired);
    }

    Ok((identity, pair))
}

async fn store_call<T, F>(context: &'static str, call: F) -> Result<T, AuthError>
where
    F: Future<Output = Result<T, sqlx::Error>>,
{
    match tokio::time::timeout(STORE_TIMEOUT, call).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => {
            error!("Failed to {}: {}", context, e);
            Err(AuthError::Internal)
        }
        Err(_) => {
            error!("Timed out trying to {}", context);
            Err(AuthError::Internal)
        }
    }
}
