//! Retry policy for transient per-device failures.

use std::time::Duration;

use crate::domain::{BackupError, ErrorClass};

/// Backoff and retry budget consulted by the job state machine.
///
/// One value object instead of conditional logic scattered through the
/// attempt loop: the state machine asks it whether to retry and how long
/// to back off.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries allowed after the first attempt; a job makes at most
    /// `max_retries + 1` attempts.
    pub max_retries: u32,

    /// Delay before the first retry; doubles for each subsequent one.
    pub backoff_base: Duration,

    /// Upper bound on any single backoff delay.
    pub backoff_cap: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_base: Duration::from_secs(5),
            backoff_cap: Duration::from_secs(300),
        }
    }
}

impl RetryPolicy {
    /// Retry classification for an error.
    pub fn classify(&self, error: &BackupError) -> ErrorClass {
        error.class()
    }

    /// Whether another attempt is allowed after `attempts_completed`
    /// attempts ended with `error`.
    pub fn should_retry(&self, error: &BackupError, attempts_completed: u32) -> bool {
        self.classify(error) == ErrorClass::Transient && attempts_completed <= self.max_retries
    }

    /// Exponential backoff delay before retry number `retry` (zero-based).
    pub fn delay(&self, retry: u32) -> Duration {
        let factor = 2u32.checked_pow(retry).unwrap_or(u32::MAX);
        self.backoff_base
            .checked_mul(factor)
            .map(|d| d.min(self.backoff_cap))
            .unwrap_or(self.backoff_cap)
    }
}
