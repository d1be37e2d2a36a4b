//! CLI argument parsing, validation, and startup helpers.

use crate::ServerConfig;
use crate::db::Database;
use crate::jwt::AuthConfig;
use crate::rate_limit::RateLimiter;
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

const MIN_SECRET_LENGTH: usize = 32;

#[derive(clap::ValueEnum, Clone, Debug, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
    Compact,
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "Gatewarden",
    about = "Token-based authentication and session service"
)]
pub struct Args {
    /// Port to listen on
    #[arg(short, long, default_value = "3001")]
    pub port: u16,

    /// Path to SQLite database file
    #[arg(short, long, default_value = "gatewarden.db")]
    pub database: String,

    /// Path to file containing the access-token secret. Prefer using the
    /// ACCESS_TOKEN_SECRET env var instead
    #[arg(long)]
    pub access_secret_file: Option<String>,

    /// Path to file containing the refresh-token secret. Prefer using the
    /// REFRESH_TOKEN_SECRET env var instead
    #[arg(long)]
    pub refresh_secret_file: Option<String>,

    /// Access token lifetime in seconds
    #[arg(long, default_value = "900")]
    pub access_ttl_secs: u64,

    /// Refresh token lifetime in seconds
    #[arg(long, default_value = "604800")]
    pub refresh_ttl_secs: u64,

    /// Attempts allowed per window on register/login/refresh, per client
    #[arg(long, default_value = "5")]
    pub auth_rate_limit: u32,

    /// Requests allowed per window across the whole API, per client
    #[arg(long, default_value = "100")]
    pub general_rate_limit: u32,

    /// Rate-limit window in seconds
    #[arg(long, default_value = "900")]
    pub rate_window_secs: u64,

    /// Count successful logins against the auth rate limit instead of
    /// clearing the caller's window
    #[arg(long)]
    pub count_successful_logins: bool,

    /// Log output format
    #[arg(short, long, default_value = "pretty")]
    pub log_format: LogFormat,
}

/// Initialize logging based on the specified format.
pub fn init_logging(format: &LogFormat) {
    match format {
        LogFormat::Pretty => tracing_subscriber::fmt::init(),
        LogFormat::Json => tracing_subscriber::fmt().json().init(),
        LogFormat::Compact => tracing_subscriber::fmt().compact().init(),
    }
}

fn load_secret(env_var: &'static str, secret_file: Option<&str>) -> Option<String> {
    let secret = if let Ok(secret) = std::env::var(env_var) {
        // Clear the environment variable to prevent leaking
        // SAFETY: We're single-threaded at this point during startup,
        // and no other code is reading this environment variable.
        unsafe { std::env::remove_var(env_var) };
        secret
    } else if let Some(path) = secret_file {
        match std::fs::read_to_string(path) {
            Ok(content) => content.trim().to_string(),
            Err(e) => {
                error!(path = %path, error = %e, "Failed to read secret file");
                return None;
            }
        }
    } else {
        error!(
            "{} is required. Set the environment variable (recommended) or pass the matching secret file flag",
            env_var
        );
        return None;
    };

    if secret.len() < MIN_SECRET_LENGTH {
        error!(
            "{} is shorter than {} characters. Use a longer secret",
            env_var, MIN_SECRET_LENGTH
        );
        return None;
    }

    Some(secret)
}

/// Load both signing secrets from the environment or files.
/// Returns None and logs an error if either is missing or too short, or if
/// the two are identical. Distinct secrets keep a leaked access token from
/// ever verifying as a refresh token.
pub fn load_token_secrets(
    access_secret_file: Option<&str>,
    refresh_secret_file: Option<&str>,
) -> Option<(String, String)> {
    let access = load_secret("ACCESS_TOKEN_SECRET", access_secret_file)?;
    let refresh = load_secret("REFRESH_TOKEN_SECRET", refresh_secret_file)?;

    if access == refresh {
        error!("ACCESS_TOKEN_SECRET and REFRESH_TOKEN_SECRET must differ");
        return None;
    }

    Some((access, refresh))
}

/// Build ServerConfig from validated arguments.
pub fn build_config(
    args: &Args,
    db: Database,
    access_secret: String,
    refresh_secret: String,
) -> ServerConfig {
    let auth = AuthConfig {
        access_secret,
        refresh_secret,
        access_ttl_secs: args.access_ttl_secs,
        refresh_ttl_secs: args.refresh_ttl_secs,
    };

    let window = Duration::from_secs(args.rate_window_secs);

    ServerConfig {
        db,
        auth,
        auth_limiter: Arc::new(RateLimiter::new(args.auth_rate_limit, window)),
        general_limiter: Arc::new(RateLimiter::new(args.general_rate_limit, window)),
        count_successful_logins: args.count_successful_logins,
    }
}

/// Open the database, logging errors if it fails.
pub async fn open_database(path: &str) -> Option<Database> {
    match Database::open(path).await {
        Ok(db) => {
            info!(path = %path, "Database opened");
            Some(db)
        }
        Err(e) => {
            error!(path = %path, error = %e, "Failed to open database");
            None
        }
    }
}
