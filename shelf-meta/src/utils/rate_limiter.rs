//! Per-source outbound rate limiter
//!
//! Enforces a minimum delay plus random jitter between successive calls on
//! the same instance. Concurrent callers serialize on the internal lock, so
//! each waits for the previous caller's slot before computing its own.

use rand::Rng;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};

/// Rate limiter with minimum spacing and jitter
#[derive(Debug)]
pub struct RateLimiter {
    last_call: Mutex<Option<Instant>>,
    min_delay: Duration,
    jitter_ms: u64,
}

impl RateLimiter {
    pub fn new(min_delay_ms: u64, jitter_ms: u64) -> Self {
        Self {
            last_call: Mutex::new(None),
            min_delay: Duration::from_millis(min_delay_ms),
            jitter_ms,
        }
    }

    pub fn min_delay(&self) -> Duration {
        self.min_delay
    }

    /// Wait until this instance may issue its next call.
    ///
    /// Jitter is applied even when the minimum delay already elapsed.
    pub async fn wait(&self) {
        let mut last = self.last_call.lock().await;

        let remaining = match *last {
            Some(last_time) => self.min_delay.saturating_sub(last_time.elapsed()),
            None => Duration::ZERO,
        };
        let delay = remaining + self.jitter();

        if !delay.is_zero() {
            tracing::debug!(wait_ms = delay.as_millis() as u64, "Rate limiting: waiting");
            sleep(delay).await;
        }

        *last = Some(Instant::now());
    }

    fn jitter(&self) -> Duration {
        if self.jitter_ms == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::thread_rng().gen_range(0..self.jitter_ms))
    }
}
