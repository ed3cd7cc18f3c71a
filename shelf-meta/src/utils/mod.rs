//! Utility modules for shelf-meta

pub mod rate_limiter;
pub mod retry;

pub use rate_limiter::RateLimiter;
pub use retry::{retry_with_backoff, RetryPolicy};
