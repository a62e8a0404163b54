//! Guards around external calls: bounded retry with backoff, a process-wide
//! permit pool, and per-actor rate limiting.

pub mod rate_limit;
pub mod retry;

pub use rate_limit::{RateLimiter, RATE_LIMIT_REFUSAL};
pub use retry::{Backoff, RetryPolicy};
