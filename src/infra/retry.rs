//! Bounded retry with configurable backoff growth
//!
//! Connection and publish retries share one policy. The growth curve is
//! configuration, not code: deployments that want gentler recovery pick
//! linear, the rest get exponential doubling.

use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BackoffStrategy {
    #[default]
    Linear,
    Exponential,
}

/// Retry ceiling plus the delay curve between attempts.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    strategy: BackoffStrategy,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, strategy: BackoffStrategy) -> Self {
        Self { max_attempts: max_attempts.max(1), base_delay, strategy }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn strategy(&self) -> BackoffStrategy {
        self.strategy
    }

    /// Delay to sleep after a failed attempt (1-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        let attempt = attempt.max(1);
        match self.strategy {
            BackoffStrategy::Linear => self.base_delay * attempt,
            BackoffStrategy::Exponential => {
                self.base_delay * 2u32.saturating_pow(attempt - 1)
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(500), BackoffStrategy::Linear)
    }
}
