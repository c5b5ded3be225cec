//! Retry logic with exponential backoff for startup dependencies.
//!
//! Service bootstrap wraps its fallible bring-up steps (connect to the
//! broker, connect to the database) in [`retry_with_backoff`]. The helper is
//! *only* for startup: once a service is running, message-level failures are
//! governed by the queue's acknowledgement policy, not by this module.
//!
//! # Example
//!
//! ```rust
//! use streamia_runtime::retry::{RetryPolicy, retry_with_backoff};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let policy = RetryPolicy::builder()
//!     .max_retries(5)
//!     .delay(Duration::from_secs(2))
//!     .backoff(2.0)
//!     .build();
//!
//! let value = retry_with_backoff(policy, || async {
//!     Ok::<_, String>(42)
//! }).await?;
//! # Ok(())
//! # }
//! ```

use std::time::Duration;
use thiserror::Error;
use tokio::time::sleep;

/// The operation will not be retried again; carries the final error.
///
/// At startup this is fatal: the process logs it and exits non-zero.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum RetryError<E: std::fmt::Display> {
    /// All attempts failed.
    #[error("Retry budget exhausted after {attempts} attempts: {last_error}")]
    Exhausted {
        /// Total invocations made (initial attempt + retries).
        attempts: usize,
        /// The error from the final attempt.
        last_error: E,
    },

    /// The predicate rejected the error, so no retry was attempted.
    #[error("Not retryable: {last_error}")]
    NotRetryable {
        /// The rejected error.
        last_error: E,
    },
}

impl<E: std::fmt::Display> RetryError<E> {
    /// Unwrap the error from the final attempt.
    pub fn into_last_error(self) -> E {
        match self {
            Self::Exhausted { last_error, .. } | Self::NotRetryable { last_error } => last_error,
        }
    }
}

/// Retry policy configuration for exponential backoff.
///
/// The wait before retry `n` (zero-based) is `delay * backoff^n`, capped at
/// `max_delay`.
///
/// # Default Values
///
/// - `max_retries`: 5
/// - `delay`: 2 seconds
/// - `backoff`: 2.0
/// - `max_delay`: 30 seconds
///
/// The defaults match the broker bring-up settings the services deploy with.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of retries after the initial attempt.
    pub max_retries: usize,
    /// Base delay before the first retry.
    pub delay: Duration,
    /// Multiplier applied per retry.
    pub backoff: f64,
    /// Cap on the computed delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            delay: Duration::from_secs(2),
            backoff: 2.0,
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Create a new policy builder.
    #[must_use]
    pub const fn builder() -> RetryPolicyBuilder {
        RetryPolicyBuilder {
            max_retries: None,
            delay: None,
            backoff: None,
            max_delay: None,
        }
    }

    /// Delay before the given zero-based retry: `delay * backoff^attempt`,
    /// capped at `max_delay`.
    #[must_use]
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn delay_for_attempt(&self, attempt: usize) -> Duration {
        let delay_ms = self.delay.as_millis() as f64 * self.backoff.powi(attempt as i32);
        let delay = Duration::from_millis(delay_ms as u64);

        if delay > self.max_delay {
            self.max_delay
        } else {
            delay
        }
    }
}

/// Builder for [`RetryPolicy`].
#[derive(Debug, Clone)]
pub struct RetryPolicyBuilder {
    max_retries: Option<usize>,
    delay: Option<Duration>,
    backoff: Option<f64>,
    max_delay: Option<Duration>,
}

impl RetryPolicyBuilder {
    /// Set the maximum number of retries after the initial attempt.
    #[must_use]
    pub const fn max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    /// Set the base delay before the first retry.
    #[must_use]
    pub const fn delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Set the backoff multiplier.
    #[must_use]
    pub const fn backoff(mut self, backoff: f64) -> Self {
        self.backoff = Some(backoff);
        self
    }

    /// Set the delay cap.
    #[must_use]
    pub const fn max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = Some(max_delay);
        self
    }

    /// Build the [`RetryPolicy`], filling unset fields from the defaults.
    #[must_use]
    pub fn build(self) -> RetryPolicy {
        let defaults = RetryPolicy::default();
        RetryPolicy {
            max_retries: self.max_retries.unwrap_or(defaults.max_retries),
            delay: self.delay.unwrap_or(defaults.delay),
            backoff: self.backoff.unwrap_or(defaults.backoff),
            max_delay: self.max_delay.unwrap_or(defaults.max_delay),
        }
    }
}

/// Retry an async operation with exponential backoff.
///
/// Invokes `operation` up to `1 + max_retries` times. On success the value is
/// returned immediately; once the budget is exhausted the last error is
/// propagated wrapped in [`RetryError::Exhausted`].
///
/// # Errors
///
/// Returns [`RetryError::Exhausted`] after `1 + max_retries` failed attempts.
pub async fn retry_with_backoff<F, Fut, T, E>(
    policy: RetryPolicy,
    operation: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    retry_with_predicate(policy, operation, |_| true).await
}

/// Retry an async operation, consulting a predicate before each retry.
///
/// Errors the predicate rejects fail immediately without consuming the
/// budget's remaining attempts: topology mismatches, for example, are
/// deployment errors that retrying cannot fix.
///
/// # Errors
///
/// Returns [`RetryError::Exhausted`] when attempts run out, or
/// [`RetryError::NotRetryable`] immediately for an error the predicate
/// rejects.
pub async fn retry_with_predicate<F, Fut, T, E, P>(
    policy: RetryPolicy,
    mut operation: F,
    is_retryable: P,
) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    P: Fn(&E) -> bool,
{
    let mut attempts = 0;

    loop {
        match operation().await {
            Ok(result) => {
                if attempts > 0 {
                    tracing::info!(attempts, "Operation succeeded after retry");
                }
                return Ok(result);
            }
            Err(err) => {
                attempts += 1;

                if !is_retryable(&err) {
                    tracing::warn!(
                        error = %err,
                        "Error is not retryable, failing immediately"
                    );
                    return Err(RetryError::NotRetryable { last_error: err });
                }

                if attempts > policy.max_retries {
                    tracing::error!(
                        attempts,
                        error = %err,
                        "Operation failed after max retries"
                    );
                    return Err(RetryError::Exhausted {
                        attempts,
                        last_error: err,
                    });
                }

                let delay = policy.delay_for_attempt(attempts - 1);
                tracing::warn!(
                    attempts,
                    delay_ms = delay.as_millis(),
                    error = %err,
                    "Operation failed, retrying..."
                );
                sleep(delay).await;
            }
        }
    }
}
