//! Reconnect backoff for the bus connection.
//!
//! The delay before attempt `n + 1` is `min(initial * 2^(n-1), max)` with full
//! jitter applied, so "retry forever" settles at one attempt per `max_backoff`
//! at worst instead of sleeping for days.

use std::time::Duration;
use tokio_retry::strategy::{ExponentialBackoff, jitter};

use crate::consts::{
    DEFAULT_RECONNECT_ATTEMPTS, DEFAULT_RECONNECT_BACKOFF, DEFAULT_RECONNECT_MAX_BACKOFF,
};

/// How hard to try (re)connecting before giving up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    /// Total connection attempts, including the first. `None` retries forever.
    pub max_attempts: Option<usize>,
    /// Delay before the second attempt.
    pub initial_backoff: Duration,
    /// Ceiling for any single delay.
    pub max_backoff: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: Some(DEFAULT_RECONNECT_ATTEMPTS),
            initial_backoff: DEFAULT_RECONNECT_BACKOFF,
            max_backoff: DEFAULT_RECONNECT_MAX_BACKOFF,
        }
    }
}

impl RetryConfig {
    /// Jittered delays between attempts. Yields `max_attempts - 1` delays
    /// when bounded.
    pub fn strategy(&self) -> Box<dyn Iterator<Item = Duration> + Send> {
        let delays = self.backoff().map(jitter);
        match self.max_attempts {
            Some(max) => Box::new(delays.take(max.saturating_sub(1))),
            None => Box::new(delays),
        }
    }

    /// The doubling schedule before jitter, capped at `max_backoff`.
    fn backoff(&self) -> ExponentialBackoff {
        // ExponentialBackoff yields factor * 2^n, starting at n = 1.
        let half_ms = (self.initial_backoff.as_millis() as u64 / 2).max(1);
        let ceiling = self.max_backoff.max(Duration::from_millis(1));
        ExponentialBackoff::from_millis(2)
            .factor(half_ms)
            .max_delay(ceiling)
    }
}
