//! Retry policy for remote fetches.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Backoff strategy for retries.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// No backoff
    None,
    /// Fixed delay
    Fixed { delay_ms: u64 },
    /// Exponential backoff
    Exponential {
        base_ms: u64,
        multiplier: f64,
        max_ms: u64,
    },
}

impl Default for BackoffStrategy {
    fn default() -> Self {
        Self::Exponential {
            base_ms: 1_000,
            multiplier: 2.0,
            max_ms: 30_000,
        }
    }
}

impl BackoffStrategy {
    /// Delay to wait after failed attempt number `attempt` (1-based) before
    /// the next one.
    ///
    /// Exponential: `base * multiplier^(attempt - 1)`, capped at `max_ms`.
    pub fn delay_after_attempt(&self, attempt: u32) -> Duration {
        let millis = match self {
            BackoffStrategy::None => 0,
            BackoffStrategy::Fixed { delay_ms } => *delay_ms,
            BackoffStrategy::Exponential {
                base_ms,
                multiplier,
                max_ms,
            } => {
                let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
                let delay = (*base_ms as f64) * multiplier.powi(exponent);
                if delay.is_finite() {
                    (delay as u64).min(*max_ms)
                } else {
                    *max_ms
                }
            }
        };
        Duration::from_millis(millis)
    }
}

/// Policy for retrying failed fetches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    pub backoff: BackoffStrategy,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: BackoffStrategy::default(),
        }
    }
}

impl RetryPolicy {
    /// A policy that tries exactly once.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            backoff: BackoffStrategy::None,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_backoff(mut self, backoff: BackoffStrategy) -> Self {
        self.backoff = backoff;
        self
    }

    /// Upper bound on the time spent sleeping between attempts.
    pub fn total_backoff(&self) -> Duration {
        (1..self.max_attempts)
            .map(|attempt| self.backoff.delay_after_attempt(attempt))
            .sum()
    }
}
