//! In-memory sliding-window rate limiter for the auth endpoints.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

#[derive(Clone)]
pub struct RateLimiter {
    hits: Arc<RwLock<HashMap<String, VecDeque<Instant>>>>,
    max_hits: usize,
    window: Duration,
}

impl RateLimiter {
    pub fn new(max_hits: usize, window_secs: u64) -> Self {
        Self {
            hits: Arc::new(RwLock::new(HashMap::new())),
            max_hits,
            window: Duration::from_secs(window_secs),
        }
    }

    /// Record an attempt for `key` (client IP) and report whether it is
    /// still inside the window's budget.
    pub async fn allow(&self, key: &str) -> bool {
        let now = Instant::now();
        let mut hits = self.hits.write().await;
        let history = hits.entry(key.to_string()).or_default();

        while let Some(&oldest) = history.front() {
            if now.duration_since(oldest) >= self.window {
                history.pop_front();
            } else {
                break;
            }
        }

        if history.len() < self.max_hits {
            history.push_back(now);
            true
        } else {
            false
        }
    }

    /// Drop identifiers whose whole history has aged out. Called from the
    /// periodic cleanup job.
    pub async fn evict_idle(&self) -> usize {
        let now = Instant::now();
        let mut hits = self.hits.write().await;
        let before = hits.len();
        hits.retain(|_, history| {
            history
                .back()
                .map(|&last| now.duration_since(last) < self.window)
                .unwrap_or(false)
        });
        before - hits.len()
    }
}
