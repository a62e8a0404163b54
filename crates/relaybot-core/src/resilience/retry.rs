//! Retry-with-backoff wrapper gated by a shared semaphore.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tracing::warn;

use crate::config::schema::ResilienceConfig;

/// How many times to try and how long to wait first.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the final unguarded one.
    pub retries: u32,
    /// Delay after the first failure; doubled after each further failure.
    pub initial_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: 3,
            initial_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Total time spent sleeping when every attempt but the last fails.
    pub fn total_backoff(&self) -> Duration {
        (0..self.retries.saturating_sub(1))
            .map(|i| self.initial_delay * 2u32.saturating_pow(i))
            .sum()
    }
}

/// Runs fallible async operations with retries while bounding concurrency.
///
/// Every attempt holds one permit from the shared pool, so at most
/// `max_concurrent` external calls are in flight across all clones.
#[derive(Clone, Debug)]
pub struct Backoff {
    policy: RetryPolicy,
    permits: Arc<Semaphore>,
}

impl Backoff {
    pub fn new(policy: RetryPolicy, max_concurrent: usize) -> Self {
        Self {
            policy,
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
        }
    }

    pub fn from_config(config: &ResilienceConfig) -> Self {
        Self::new(
            RetryPolicy {
                retries: config.retries,
                initial_delay: config.initial_delay(),
            },
            config.max_concurrent_calls,
        )
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    pub fn available_permits(&self) -> usize {
        self.permits.available_permits()
    }

    /// Run `op`, retrying failures with exponential delay.
    ///
    /// Failures before the last attempt are logged and absorbed. The last
    /// attempt's outcome is returned as is.
    pub async fn run<T, F, Fut>(&self, label: &str, mut op: F) -> anyhow::Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        let mut remaining = self.policy.retries;
        let mut delay = self.policy.initial_delay;

        while remaining > 1 {
            let outcome = {
                let _permit = self.permits.acquire().await?;
                op().await
            };
            match outcome {
                Ok(value) => return Ok(value),
                Err(e) => {
                    warn!(
                        call = %label,
                        error = %e,
                        retry_in = ?delay,
                        attempts_left = remaining - 1,
                        "External call failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    remaining -= 1;
                    delay *= 2;
                }
            }
        }

        let _permit = self.permits.acquire().await?;
        op().await
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(RetryPolicy::default(), 15)
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
