pub mod api;
pub mod auth;
pub mod cli;
pub mod db;
pub mod jwt;
pub mod password;
pub mod rate_limit;
pub mod revocation;

use api::create_api_router;
use auth::add_rotation_headers;
use axum::{Router, middleware};
use db::Database;
use jwt::{AuthConfig, TokenIssuer};
use rate_limit::RateLimiter;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

pub struct ServerConfig {
    /// Database connection (cloneable, uses connection pool internally)
    pub db: Database,
    /// Signing secrets and token lifetimes
    pub auth: AuthConfig,
    /// Limiter guarding credential endpoints (register/login/refresh)
    pub auth_limiter: Arc<RateLimiter>,
    /// Limiter covering the whole API surface
    pub general_limiter: Arc<RateLimiter>,
    /// Count successful logins against the auth window instead of clearing it
    pub count_successful_logins: bool,
}

/// Create the application router with the given configuration.
pub fn create_app(config: &ServerConfig) -> Router {
    let issuer = Arc::new(TokenIssuer::new(&config.auth));

    let api_router = create_api_router(
        config.db.clone(),
        issuer,
        config.auth_limiter.clone(),
        config.count_successful_logins,
    )
    .layer(middleware::from_fn(add_rotation_headers));

    Router::new().nest("/api", api_router).layer(
        middleware::from_fn_with_state(config.general_limiter.clone(), rate_limit::enforce),
    )
}

/// Run an initial sweep and spawn the background scheduler.
/// Call this before starting the server.
pub async fn init_sweeper(config: &ServerConfig) {
    let limiters = vec![config.auth_limiter.clone(), config.general_limiter.clone()];
    revocation::run_sweep(&config.db, &limiters).await;
    revocation::spawn_sweep_scheduler(config.db.clone(), limiters);
}

/// Run the server on the given listener. This function blocks until the
/// server exits. Call `init_sweeper` before this to sweep on startup.
pub async fn run_server(config: ServerConfig, listener: TcpListener) -> Result<(), std::io::Error> {
    let app = create_app(&config);
    let make_service = app.into_make_service_with_connect_info::<SocketAddr>();
    axum::serve(listener, make_service).await
}
