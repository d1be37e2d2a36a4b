mod auth;
mod error;

use axum::Router;
use std::sync::Arc;

use crate::db::Database;
use crate::jwt::TokenIssuer;
use crate::rate_limit::RateLimiter;

pub use auth::AuthApiState;

/// Create the API router.
pub fn create_api_router(
    db: Database,
    issuer: Arc<TokenIssuer>,
    auth_limiter: Arc<RateLimiter>,
    count_successful_logins: bool,
) -> Router {
    let auth_state = AuthApiState {
        db,
        issuer,
        auth_limiter,
        count_successful_logins,
    };

    Router::new().nest("/auth", auth::router(auth_state))
}
