//! Request retry with capped exponential backoff
//!
//! **Algorithm:**
//! 1. Attempt operation
//! 2. If successful, return result
//! 3. If the error is retryable and retries remain: log WARN, back off, retry
//! 4. Otherwise return the last error
//!
//! **Backoff Strategy:**
//! - Initial delay: `base_delay_ms`
//! - Multiplier: 2.0 (exponential)
//! - Cap: `max_delay_ms`

use crate::error::FetchError;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Retry parameters shared by every outbound client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Additional attempts after the first failure
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay_ms: 500,
            max_delay_ms: 4000,
        }
    }
}

impl RetryPolicy {
    /// Policy that never retries (tests, one-shot tools)
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            base_delay_ms: 0,
            max_delay_ms: 0,
        }
    }

    /// Backoff before retry number `retry` (1-based)
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 1u64.checked_shl(retry.saturating_sub(1)).unwrap_or(u64::MAX);
        let ms = self
            .base_delay_ms
            .saturating_mul(factor)
            .min(self.max_delay_ms);
        Duration::from_millis(ms)
    }
}

/// Run `operation` until it succeeds, fails permanently, or retries run out.
///
/// A cancellation during backoff returns `FetchError::Cancelled` immediately.
pub async fn retry_with_backoff<F, Fut, T>(
    operation_name: &str,
    policy: &RetryPolicy,
    cancel: Option<&CancellationToken>,
    mut operation: F,
) -> Result<T, FetchError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, FetchError>>,
{
    let mut retry = 0u32;

    loop {
        match operation().await {
            Ok(value) => {
                if retry > 0 {
                    tracing::debug!(operation = operation_name, retry, "Request succeeded after retry");
                }
                return Ok(value);
            }
            Err(err) => {
                if !err.is_retryable() || retry >= policy.max_retries {
                    return Err(err);
                }

                retry += 1;
                let delay = policy.backoff(retry);

                tracing::warn!(
                    operation = operation_name,
                    retry,
                    max_retries = policy.max_retries,
                    backoff_ms = delay.as_millis() as u64,
                    error = %err,
                    "Request failed, will retry after backoff"
                );

                match cancel {
                    Some(token) => {
                        tokio::select! {
                            _ = token.cancelled() => return Err(FetchError::Cancelled),
                            _ = tokio::time::sleep(delay) => {}
                        }
                    }
                    None => tokio::time::sleep(delay).await,
                }
            }
        }
    }
}
