//! Bounded exponential backoff around a single document's enrichment.

use super::classify::{ErrorCategory, classify};
use crate::config::PipelineSettings;
use crate::inference::InferenceError;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Terminal failure of a retry sequence.
#[derive(Debug, Error)]
pub enum RetryError {
    /// Fault classified as permanent; exactly one attempt was made.
    #[error("permanent failure: {source}")]
    Permanent {
        /// Fault returned by the single attempt.
        source: InferenceError,
    },
    /// Every allowed attempt failed with a retryable fault.
    #[error("retries exhausted after {attempts} attempts: {source}")]
    Exhausted {
        /// Number of attempts made.
        attempts: u32,
        /// Fault returned by the final attempt.
        source: InferenceError,
    },
    /// Cancellation was requested while invoking or backing off.
    #[error("cancelled while retrying")]
    Cancelled,
}

/// Backoff bookkeeping for one failed attempt.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryState {
    /// Number of failed attempts so far (1-based).
    pub attempt: u32,
    /// Category of the most recent fault.
    pub category: ErrorCategory,
    /// Delay before the next attempt, jitter included.
    pub delay: Duration,
}

/// Retry parameters applied to every document of a run.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first.
    pub max_retries: u32,
    /// Base delay multiplied by `factor^attempt`.
    pub base_delay: Duration,
    /// Cap applied to the exponential delay.
    pub max_delay: Duration,
    /// Growth factor for transient faults.
    pub transient_factor: f64,
    /// Growth factor for provider throttling.
    pub rate_limit_factor: f64,
    /// Exclusive upper bound of the uniform jitter.
    pub max_jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&PipelineSettings::default())
    }
}

impl From<&PipelineSettings> for RetryPolicy {
    fn from(settings: &PipelineSettings) -> Self {
        Self {
            max_retries: settings.max_retries,
            base_delay: settings.base_delay,
            max_delay: settings.max_delay,
            transient_factor: settings.transient_factor,
            rate_limit_factor: settings.rate_limit_factor,
            max_jitter: settings.max_jitter,
        }
    }
}

impl RetryPolicy {
    /// Growth factor used for `category`.
    pub fn factor(&self, category: ErrorCategory) -> f64 {
        match category {
            ErrorCategory::RateLimit => self.rate_limit_factor,
            _ => self.transient_factor,
        }
    }

    /// Jitter-free delay after the `attempt`-th failure: `min(base * factor^attempt, max)`.
    pub fn backoff(&self, category: ErrorCategory, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let seconds = self.base_delay.as_secs_f64() * self.factor(category).powi(exponent);
        let capped = seconds.min(self.max_delay.as_secs_f64());
        Duration::try_from_secs_f64(capped).unwrap_or(self.max_delay)
    }

    /// Backoff plus uniform jitter in `[0, max_jitter)`.
    pub fn next_state(&self, attempt: u32, category: ErrorCategory) -> RetryState {
        let jitter = if self.max_jitter.is_zero() {
            Duration::ZERO
        } else {
            self.max_jitter.mul_f64(rand::random::<f64>())
        };
        RetryState {
            attempt,
            category,
            delay: self.backoff(category, attempt) + jitter,
        }
    }

    /// Run `operation` until it succeeds, fails permanently, or runs out of attempts.
    ///
    /// Both the attempt and the backoff sleep are abandoned as soon as `cancel` fires.
    pub async fn execute<T, F, Fut>(
        &self,
        cancel: &CancellationToken,
        mut operation: F,
    ) -> Result<T, RetryError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, InferenceError>>,
    {
        let mut attempt = 0u32;
        loop {
            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(RetryError::Cancelled),
                outcome = operation() => outcome,
            };

            let fault = match outcome {
                Ok(value) => return Ok(value),
                Err(fault) => fault,
            };

            let category = classify(&fault);
            if category == ErrorCategory::Permanent {
                tracing::warn!(error = %fault, "Permanent error encountered");
                return Err(RetryError::Permanent { source: fault });
            }

            attempt += 1;
            if attempt >= self.max_retries {
                tracing::error!(
                    attempts = attempt,
                    category = %category,
                    error = %fault,
                    "Max retries reached"
                );
                return Err(RetryError::Exhausted {
                    attempts: attempt,
                    source: fault,
                });
            }

            let state = self.next_state(attempt, category);
            tracing::info!(
                attempt = state.attempt,
                max_retries = self.max_retries,
                category = %state.category,
                delay_ms = u64::try_from(state.delay.as_millis()).unwrap_or(u64::MAX),
                error = %fault,
                "Retrying after backoff"
            );

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(RetryError::Cancelled),
                _ = tokio::time::sleep(state.delay) => {}
            }
        }
    }
}
