//! Shared retry policy for calls to external collaborators.
//!
//! Every component that talks to a remote service (transcription, LLM,
//! voice synthesis) runs its calls through a [`RetryPolicy`] configured for
//! its own call site. Errors decide for themselves whether they are
//! transient through the [`Retryable`] trait.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tracing::{info, warn};

/// Classification of an error for retry purposes.
pub trait Retryable {
    /// Whether the failed call may succeed if attempted again.
    fn is_retryable(&self) -> bool;

    /// A server-provided minimum wait before the next attempt.
    fn retry_after(&self) -> Option<Duration> {
        None
    }
}

/// Exponential backoff policy: `base_delay * 2^attempt`, capped at `max_delay`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first one.
    pub max_attempts: u32,
    /// Delay after the first failed attempt.
    pub base_delay: Duration,
    /// Upper bound for any single delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(32),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            ..Self::default()
        }
    }

    /// A policy that makes exactly one attempt.
    pub fn none() -> Self {
        Self::new(1, Duration::ZERO)
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    /// The same policy with every delay multiplied by `factor`.
    pub fn scaled(&self, factor: u32) -> Self {
        Self {
            max_attempts: self.max_attempts,
            base_delay: self.base_delay.saturating_mul(factor),
            max_delay: self.max_delay.saturating_mul(factor),
        }
    }

    /// Delay to wait after the failed attempt with zero-based index `attempt`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.min(16)).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// Run `operation` until it succeeds, fails permanently, or the attempt
    /// budget is spent. The closure receives the zero-based attempt index.
    pub async fn run<T, E, F, Fut>(&self, label: &str, mut operation: F) -> Result<T, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Retryable + Display,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            match operation(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt + 1 < max_attempts => {
                    let backoff = self.delay_for(attempt);
                    let wait = match e.retry_after() {
                        Some(hint) => hint.max(backoff).min(self.max_delay),
                        None => backoff,
                    };
                    info!(
                        operation = label,
                        attempt = attempt + 1,
                        max_attempts,
                        delay_ms = wait.as_millis() as u64,
                        error = %e,
                        "Retrying after transient error"
                    );
                    tokio::time::sleep(wait).await;
                    attempt += 1;
                }
                Err(e) => {
                    if e.is_retryable() {
                        warn!(operation = label, attempts = attempt + 1, error = %e, "Retries exhausted");
                    }
                    return Err(e);
                }
            }
        }
    }
}
