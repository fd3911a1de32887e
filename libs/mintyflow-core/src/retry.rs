//! Retry policies shared by the identity gate and the outbox worker.

use std::time::Duration;

/// Decides how many times to retry and how long to wait before each retry.
pub trait RetryPolicy: Send + Sync {
    /// Retries allowed after the first attempt.
    fn max_retries(&self) -> u32;

    /// Delay before retry number `retry` (1-based).
    fn delay_for(&self, retry: u32) -> Duration;
}

/// Same delay before every retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedBackoff {
    pub retries: u32,
    pub delay: Duration,
}

impl FixedBackoff {
    pub fn new(retries: u32, delay: Duration) -> Self {
        Self { retries, delay }
    }
}

impl Default for FixedBackoff {
    /// Five retries, 300 ms apart.
    fn default() -> Self {
        Self::new(5, Duration::from_millis(300))
    }
}

impl RetryPolicy for FixedBackoff {
    fn max_retries(&self) -> u32 {
        self.retries
    }

    fn delay_for(&self, _retry: u32) -> Duration {
        self.delay
    }
}

/// Doubling delay, capped at `max_delay`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExponentialBackoff {
    pub base: Duration,
    pub max_delay: Duration,
    pub retries: u32,
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(1),
            max_delay: Duration::from_secs(300),
            retries: u32::MAX,
        }
    }
}

impl RetryPolicy for ExponentialBackoff {
    fn max_retries(&self) -> u32 {
        self.retries
    }

    fn delay_for(&self, retry: u32) -> Duration {
        let shift = retry.saturating_sub(1).min(31);
        self.base
            .checked_mul(1u32 << shift)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}
