//! Rate limiting for the API surface.
//!
//! Fixed-window counters keyed by client, sharded to keep lock contention
//! low. Limiters are constructed per deployment and injected where needed,
//! never reached through a global, so tests and embedders can run several
//! side by side with different budgets.

use std::collections::HashMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::auth::{AuthError, client_key};

const SHARD_COUNT: usize = 16;

struct Window {
    count: u32,
    started_at: Instant,
}

/// Keyed fixed-window rate limiter.
///
/// The first hit of a lapsed window restarts the count, so a burst of
/// `max_attempts` is allowed per window and nothing in between. Windows are
/// tracked per key and reclaimed by [`RateLimiter::prune`] once lapsed.
pub struct RateLimiter {
    shards: Vec<Mutex<HashMap<String, Window>>>,
    max_attempts: u32,
    window: Duration,
}

impl RateLimiter {
    pub fn new(max_attempts: u32, window: Duration) -> Self {
        Self {
            shards: (0..SHARD_COUNT).map(|_| Mutex::new(HashMap::new())).collect(),
            max_attempts,
            window,
        }
    }

    fn shard(&self, key: &str) -> &Mutex<HashMap<String, Window>> {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        &self.shards[hasher.finish() as usize % SHARD_COUNT]
    }

    /// Record an attempt for the key. Returns whether it fits the window.
    pub fn check(&self, key: &str) -> bool {
        if self.max_attempts == 0 {
            return false;
        }

        let mut windows = self.shard(key).lock().expect("rate limiter lock poisoned");
        match windows.get_mut(key) {
            Some(window) if window.started_at.elapsed() < self.window => {
                if window.count < self.max_attempts {
                    window.count += 1;
                    true
                } else {
                    false
                }
            }
            _ => {
                windows.insert(
                    key.to_string(),
                    Window {
                        count: 1,
                        started_at: Instant::now(),
                    },
                );
                true
            }
        }
    }

    /// Forget the key's window entirely, e.g. after a successful login.
    pub fn reset(&self, key: &str) {
        let mut windows = self.shard(key).lock().expect("rate limiter lock poisoned");
        windows.remove(key);
    }

    /// Drop windows that have lapsed. Returns how many were removed.
    pub fn prune(&self) -> usize {
        let mut removed = 0;
        for shard in &self.shards {
            let mut windows = shard.lock().expect("rate limiter lock poisoned");
            let before = windows.len();
            windows.retain(|_, window| window.started_at.elapsed() < self.window);
            removed += before - windows.len();
        }
        removed
    }
}

/// Middleware enforcing a limiter. Runs before the handler, so a rejected
/// request never reaches credential checks and the 429 cannot leak whether
/// a credential exists.
pub async fn enforce(
    State(limiter): State<Arc<RateLimiter>>,
    request: Request,
    next: Next,
) -> Response {
    let key = client_key(request.headers(), request.extensions());
    if limiter.check(&key) {
        next.run(request).await
    } else {
        AuthError::RateLimitExceeded.into_response()
    }
}
