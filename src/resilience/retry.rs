//! # Retry Executor
//!
//! Bounded retries with attempt-indexed backoff for idempotent operations.
//! Idempotence is the caller's responsibility; the executor only guarantees
//! it never runs more than `max_attempts` times and never retries a success.
//!
//! Composed with a [`CircuitBreaker`], the whole retry sequence wraps the
//! protected call: transient failures on a closed circuit are retried, while
//! an open circuit aborts the sequence immediately instead of burning
//! attempts on calls that would be rejected anyway.

use crate::config::{BackoffKind, RetryConfig};
use crate::resilience::{CircuitBreaker, CircuitBreakerError};
use rand::Rng;
use std::fmt;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Errors returned once the retry loop gives up
#[derive(Debug, thiserror::Error)]
pub enum RetryError<E> {
    /// Every attempt failed
    #[error("Retries exhausted after {attempts} attempts: {last_error}")]
    Exhausted { attempts: u32, last_error: E },

    /// A failure classified as non-retryable stopped the loop early
    #[error("Aborted on attempt {attempt}: {error}")]
    Aborted { attempt: u32, error: E },
}

impl<E> RetryError<E> {
    /// Attempts made before giving up
    pub fn attempts(&self) -> u32 {
        match self {
            RetryError::Exhausted { attempts, .. } => *attempts,
            RetryError::Aborted { attempt, .. } => *attempt,
        }
    }

    /// The last underlying error
    pub fn into_inner(self) -> E {
        match self {
            RetryError::Exhausted { last_error, .. } => last_error,
            RetryError::Aborted { error, .. } => error,
        }
    }

    /// Borrow the last underlying error
    pub fn last_error(&self) -> &E {
        match self {
            RetryError::Exhausted { last_error, .. } => last_error,
            RetryError::Aborted { error, .. } => error,
        }
    }
}

/// Delay curve between attempts
#[derive(Debug, Clone, PartialEq)]
pub enum Backoff {
    /// Same delay before every retry
    Fixed { delay: Duration },
    /// `base * retry`, capped at `max`
    Linear { base: Duration, max: Duration },
    /// `base * multiplier^(retry - 1)`, capped at `max`
    Exponential {
        base: Duration,
        multiplier: f64,
        max: Duration,
    },
}

impl Backoff {
    /// Nominal delay before retry number `retry` (1 = first retry)
    pub fn delay_for(&self, retry: u32) -> Duration {
        let retry = retry.max(1);
        match self {
            Backoff::Fixed { delay } => *delay,
            Backoff::Linear { base, max } => base.saturating_mul(retry).min(*max),
            Backoff::Exponential {
                base,
                multiplier,
                max,
            } => {
                let exponent = i32::try_from(retry - 1).unwrap_or(i32::MAX);
                let scaled_ms = base.as_millis() as f64 * multiplier.powi(exponent);
                if !scaled_ms.is_finite() || scaled_ms >= max.as_millis() as f64 {
                    *max
                } else {
                    Duration::from_millis(scaled_ms as u64)
                }
            }
        }
    }
}

/// How many attempts to make and how long to wait between them
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts including the first (at least 1)
    pub max_attempts: u32,
    pub backoff: Backoff,
    /// Randomize each delay uniformly within [50%, 100%] of nominal
    pub jitter: bool,
}

impl RetryPolicy {
    /// Exponential backoff doubling from `base`, capped at `max`, with jitter
    pub fn exponential(max_attempts: u32, base: Duration, max: Duration) -> Self {
        Self {
            max_attempts,
            backoff: Backoff::Exponential {
                base,
                multiplier: 2.0,
                max,
            },
            jitter: true,
        }
    }

    /// Build from the `[retry]` configuration section
    pub fn from_config(config: &RetryConfig) -> Self {
        let base = Duration::from_millis(config.base_delay_ms);
        let max = Duration::from_millis(config.max_delay_ms);
        let backoff = match config.backoff {
            BackoffKind::Fixed => Backoff::Fixed { delay: base },
            BackoffKind::Linear => Backoff::Linear { base, max },
            BackoffKind::Exponential => Backoff::Exponential {
                base,
                multiplier: config.multiplier,
                max,
            },
        };

        Self {
            max_attempts: config.max_attempts,
            backoff,
            jitter: config.jitter,
        }
    }

    /// Disable jitter (deterministic delays)
    pub fn without_jitter(mut self) -> Self {
        self.jitter = false;
        self
    }

    /// Actual delay before retry number `retry`, jitter applied
    pub fn delay_for(&self, retry: u32) -> Duration {
        let nominal = self.backoff.delay_for(retry);
        if !self.jitter || nominal.is_zero() {
            return nominal;
        }
        let nominal_ms = nominal.as_millis() as u64;
        let jittered = rand::thread_rng().gen_range(nominal_ms / 2..=nominal_ms);
        Duration::from_millis(jittered)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

/// Runs an operation under a [`RetryPolicy`]
#[derive(Debug, Clone)]
pub struct RetryExecutor {
    name: String,
    policy: RetryPolicy,
}

impl RetryExecutor {
    /// Create an executor; `name` labels log records
    pub fn new(name: impl Into<String>, policy: RetryPolicy) -> Self {
        Self {
            name: name.into(),
            policy,
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Retry on every failure
    pub async fn with_retry<F, Fut, T, E>(&self, operation: F) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        self.with_retry_if(operation, |_| true).await
    }

    /// Retry only failures for which `is_retryable` returns true
    pub async fn with_retry_if<F, Fut, T, E, P>(
        &self,
        mut operation: F,
        is_retryable: P,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
        P: Fn(&E) -> bool,
    {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            match operation().await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(operation = %self.name, attempt = attempt, "Succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(error) if !is_retryable(&error) => {
                    debug!(
                        operation = %self.name,
                        attempt = attempt,
                        error = %error,
                        "Non-retryable failure, aborting retries"
                    );
                    return Err(RetryError::Aborted { attempt, error });
                }
                Err(error) if attempt >= max_attempts => {
                    warn!(
                        operation = %self.name,
                        attempts = attempt,
                        error = %error,
                        "Retries exhausted"
                    );
                    return Err(RetryError::Exhausted {
                        attempts: attempt,
                        last_error: error,
                    });
                }
                Err(error) => {
                    let delay = self.policy.delay_for(attempt);
                    warn!(
                        operation = %self.name,
                        attempt = attempt,
                        max_attempts = max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "Attempt failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    /// Retry a call routed through `breaker`; an open circuit aborts at once
    pub async fn with_retry_protected<F, Fut, T, E>(
        &self,
        breaker: &CircuitBreaker,
        operation: F,
    ) -> Result<T, RetryError<CircuitBreakerError<E>>>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        self.with_retry_if(
            || breaker.execute(&operation),
            |error: &CircuitBreakerError<E>| !error.is_circuit_open(),
        )
        .await
    }
}

/// Free-function form: `max_attempts` tries, `backoff(retry)` between them
pub async fn with_retry<F, Fut, T, E, B>(
    mut operation: F,
    max_attempts: u32,
    backoff: B,
) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: fmt::Display,
    B: Fn(u32) -> Duration,
{
    let max_attempts = max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(error) if attempt >= max_attempts => {
                return Err(RetryError::Exhausted {
                    attempts: attempt,
                    last_error: error,
                });
            }
            Err(error) => {
                let delay = backoff(attempt);
                warn!(
                    attempt = attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "Attempt failed, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
