//! Bounded retry with exponential backoff for generator calls.
//!
//! The engine itself never retries a snapshot operation. Only the content
//! generator, whose failures are often transient, is retried.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Initial retry delay in milliseconds.
pub const RETRY_INITIAL_DELAY_MS: u64 = 2000;

/// Backoff factor for exponential delay.
pub const RETRY_BACKOFF_FACTOR: u64 = 2;

/// Upper bound for a single delay.
pub const RETRY_MAX_DELAY_MS: u64 = 30_000;

/// Maximum number of retry attempts.
pub const RETRY_MAX_ATTEMPTS: u32 = 5;

/// How often and how patiently to retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub initial_delay_ms: u64,
    pub backoff_factor: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: RETRY_MAX_ATTEMPTS,
            initial_delay_ms: RETRY_INITIAL_DELAY_MS,
            backoff_factor: RETRY_BACKOFF_FACTOR,
            max_delay_ms: RETRY_MAX_DELAY_MS,
        }
    }
}

impl RetryPolicy {
    /// Never retry.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Delay before retry number `attempt` (1-based), capped.
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = self
            .backoff_factor
            .saturating_pow(attempt.saturating_sub(1));
        let delay = self.initial_delay_ms.saturating_mul(factor);
        Duration::from_millis(delay.min(self.max_delay_ms))
    }
}

/// Tracks attempts against a [`RetryPolicy`].
pub struct RetryHelper {
    policy: RetryPolicy,
    current_attempt: u32,
}

impl RetryHelper {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            current_attempt: 0,
        }
    }

    /// Delay before the next retry, or `None` once retries are exhausted.
    pub fn next_attempt(&mut self) -> Option<Duration> {
        self.current_attempt += 1;

        if self.current_attempt > self.policy.max_retries {
            debug!(
                attempt = self.current_attempt,
                max = self.policy.max_retries,
                "Max retry attempts reached"
            );
            return None;
        }

        let delay = self.policy.delay(self.current_attempt);
        debug!(
            attempt = self.current_attempt,
            max = self.policy.max_retries,
            delay_ms = delay.as_millis() as u64,
            "Scheduling retry"
        );
        Some(delay)
    }

    /// Retries scheduled so far.
    pub fn current_attempt(&self) -> u32 {
        self.current_attempt
    }
}
