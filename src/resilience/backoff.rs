//! Exponential backoff with optional jitter.

use std::time::Duration;

use rand::Rng;

use crate::config::RetryConfig;

/// Delay schedule for server-error retries.
///
/// `delay(n) = base * 2^n`, capped at `max`. With a one-second base the
/// schedule is 1s, 2s, 4s for attempts 0, 1, 2.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffPolicy {
    base: Duration,
    max: Duration,
    max_attempts: u32,
    jitter_ratio: f64,
}

impl BackoffPolicy {
    pub fn new(base: Duration, max: Duration, max_attempts: u32) -> Self {
        Self {
            base,
            max,
            max_attempts,
            jitter_ratio: 0.0,
        }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(
            Duration::from_millis(config.base_delay_ms),
            Duration::from_millis(config.max_delay_ms),
            config.max_attempts,
        )
        .with_jitter(config.jitter_ratio)
    }

    /// Add up to `ratio * delay` of random jitter to each delay.
    pub fn with_jitter(mut self, ratio: f64) -> Self {
        self.jitter_ratio = ratio.clamp(0.0, 1.0);
        self
    }

    /// Delay to wait before retry number `attempt` (zero-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        let capped = self.base.saturating_mul(factor).min(self.max);

        if self.jitter_ratio <= 0.0 {
            return capped;
        }

        let jitter_range = capped.mul_f64(self.jitter_ratio);
        if jitter_range.is_zero() {
            return capped;
        }
        let jitter = rand::thread_rng().gen_range(Duration::ZERO..jitter_range);
        capped + jitter
    }

    /// Whether another retry is allowed after `attempt` retries were made.
    pub fn should_retry(&self, attempt: u32, max_attempts: u32) -> bool {
        attempt < max_attempts
    }

    /// `should_retry` against the configured budget.
    pub fn allows(&self, attempt: u32) -> bool {
        self.should_retry(attempt, self.max_attempts)
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}
