//! Session revocation and scheduled cleanup of expired state.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info};

use crate::db::Database;
use crate::rate_limit::RateLimiter;

/// Interval between sweep runs.
const SWEEP_INTERVAL: Duration = Duration::from_secs(60 * 60); // 1 hour

/// Revoke every session for a user (logout everywhere). Any refresh token
/// issued to them stops working immediately; in-flight access tokens fail
/// the gate's liveness check on their next request. Returns the number of
/// sessions revoked, which is zero on repeat calls.
pub async fn revoke_all(db: &Database, user_id: i64) -> Result<u64, sqlx::Error> {
    db.sessions().delete_by_user(user_id).await
}

/// Run one sweep: drop sessions past their expiry and lapsed rate-limit
/// windows. Deleting nothing is not an error, so repeated sweeps are safe.
pub async fn run_sweep(db: &Database, limiters: &[Arc<RateLimiter>]) {
    match db.sessions().delete_expired().await {
        Ok(count) if count > 0 => info!("Swept {} expired sessions", count),
        Ok(_) => {}
        Err(e) => error!("Failed to sweep expired sessions: {}", e),
    }

    let pruned: usize = limiters.iter().map(|limiter| limiter.prune()).sum();
    if pruned > 0 {
        debug!("Pruned {} lapsed rate-limit windows", pruned);
    }
}

/// Spawn a background task that sweeps periodically.
/// Returns a handle that can be used to abort the task.
pub fn spawn_sweep_scheduler(
    db: Database,
    limiters: Vec<Arc<RateLimiter>>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(SWEEP_INTERVAL);

        loop {
            interval.tick().await;
            run_sweep(&db, &limiters).await;
        }
    })
}
