//! Per-actor sliding-window rate limiter.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tokio::time::Instant;
use tracing::warn;

use crate::bus::OperatorContact;
use crate::config::schema::ResilienceConfig;

/// Reply shown to an actor who hit the limit.
pub const RATE_LIMIT_REFUSAL: &str =
    "⏳ You're sending requests too quickly, so the bot is paused for you for a moment. Please try again shortly!";

/// Tracks recent request timestamps per actor.
///
/// Each window holds at most `max_requests` entries; entries older than
/// `window` are evicted before every check.
pub struct RateLimiter {
    max_requests: usize,
    window: Duration,
    windows: Mutex<HashMap<String, VecDeque<Instant>>>,
    operator: Option<OperatorContact>,
}

impl RateLimiter {
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            max_requests: max_requests.max(1),
            window,
            windows: Mutex::new(HashMap::new()),
            operator: None,
        }
    }

    pub fn from_config(config: &ResilienceConfig) -> Self {
        Self::new(config.rate_limit_count, config.rate_limit_window())
    }

    /// Alert this operator whenever an actor is limited.
    pub fn with_operator(mut self, operator: OperatorContact) -> Self {
        self.operator = Some(operator);
        self
    }

    /// Record a request and report whether the actor is now limited.
    pub fn check(&self, actor_id: &str) -> bool {
        let now = Instant::now();
        let mut windows = self.windows.lock().unwrap_or_else(PoisonError::into_inner);
        let window = windows
            .entry(actor_id.to_string())
            .or_insert_with(|| VecDeque::with_capacity(self.max_requests));

        while window
            .front()
            .is_some_and(|first| now.duration_since(*first) > self.window)
        {
            window.pop_front();
        }

        if window.len() == self.max_requests {
            window.pop_front();
        }
        window.push_back(now);

        window.len() >= self.max_requests
    }

    /// Check the actor and, if limited, alert the operator and return the refusal.
    ///
    /// Alert delivery is best-effort and never fails the caller.
    pub async fn guard(&self, actor_id: &str, context: &str) -> Option<String> {
        if !self.check(actor_id) {
            return None;
        }
        warn!(actor = %actor_id, context = %context, "Rate limit hit");
        if let Some(operator) = &self.operator {
            operator
                .notify_best_effort(format!(
                    "🚨 Rate limit hit\nactor: {actor_id}\nwhere: {context}\nlimit: {} requests / {}s",
                    self.max_requests,
                    self.window.as_secs()
                ))
                .await;
        }
        Some(RATE_LIMIT_REFUSAL.to_string())
    }

    /// Entries currently in an actor's window.
    pub fn window_len(&self, actor_id: &str) -> usize {
        let windows = self.windows.lock().unwrap_or_else(PoisonError::into_inner);
        windows.get(actor_id).map_or(0, VecDeque::len)
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
