//! Retry logic.
//!
//! # Responsibilities
//! - Run an operation up to `max_attempts` times with exponential backoff
//! - Classify failures: retryable ones are retried, the rest bail immediately
//! - Report every attempt to an optional observer (visibility only)
//!
//! # Design Decisions
//! - One policy per call-site, built once and reused
//! - The observer never influences control flow
//! - Exhaustion keeps the last error so callers can still classify it

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use thiserror::Error;

use crate::config::RetryConfig;
use crate::observability::metrics;
use crate::resilience::backoff::BackoffSchedule;

/// Decides whether a failure is worth another attempt.
pub type Classifier<E> = Arc<dyn Fn(&E) -> bool + Send + Sync>;

/// Called once per attempt with its outcome.
pub type AttemptObserver<E> = Arc<dyn Fn(&Attempt<'_, E>) + Send + Sync>;

/// Outcome of a single attempt, as seen by an observer.
#[derive(Debug)]
pub struct Attempt<'a, E> {
    /// 1-based attempt number.
    pub number: u32,
    /// `Ok` on success, the failure otherwise.
    pub outcome: Result<(), &'a E>,
    /// Whether another attempt follows.
    pub will_retry: bool,
}

/// Immutable retry configuration for one call-site.
pub struct RetryPolicy<E> {
    name: String,
    max_attempts: u32,
    schedule: BackoffSchedule,
    retryable: Classifier<E>,
    observer: Option<AttemptObserver<E>>,
}

impl<E> Clone for RetryPolicy<E> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            max_attempts: self.max_attempts,
            schedule: self.schedule.clone(),
            retryable: self.retryable.clone(),
            observer: self.observer.clone(),
        }
    }
}

impl<E> fmt::Debug for RetryPolicy<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("name", &self.name)
            .field("max_attempts", &self.max_attempts)
            .field("schedule", &self.schedule)
            .finish()
    }
}

impl<E> RetryPolicy<E> {
    /// A policy that treats every failure as retryable.
    pub fn new(name: impl Into<String>, max_attempts: u32, schedule: BackoffSchedule) -> Self {
        Self {
            name: name.into(),
            max_attempts: max_attempts.max(1),
            schedule,
            retryable: Arc::new(|_| true),
            observer: None,
        }
    }

    pub fn from_config(name: impl Into<String>, config: &RetryConfig) -> Self {
        Self::new(name, config.max_attempts, config.schedule())
    }

    /// Only failures matching `predicate` are retried; others bail.
    pub fn retry_if<P>(mut self, predicate: P) -> Self
    where
        P: Fn(&E) -> bool + Send + Sync + 'static,
    {
        self.retryable = Arc::new(predicate);
        self
    }

    pub fn observe<O>(mut self, observer: O) -> Self
    where
        O: Fn(&Attempt<'_, E>) + Send + Sync + 'static,
    {
        self.observer = Some(Arc::new(observer));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn schedule(&self) -> &BackoffSchedule {
        &self.schedule
    }

    pub fn is_retryable(&self, error: &E) -> bool {
        (self.retryable)(error)
    }

    fn notify(&self, attempt: Attempt<'_, E>) {
        if let Some(observer) = &self.observer {
            observer(&attempt);
        }
    }
}

/// Terminal failure of a retried operation.
#[derive(Debug, Error)]
pub enum RetryError<E> {
    /// The failure was classified non-retryable.
    #[error("attempt {attempt} failed with a non-retryable error: {error}")]
    Bailed { attempt: u32, error: E },

    /// Every attempt failed.
    #[error("retries exhausted after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: E },
}

impl<E> RetryError<E> {
    /// The error that ended the run.
    pub fn into_inner(self) -> E {
        match self {
            RetryError::Bailed { error, .. } => error,
            RetryError::Exhausted { last, .. } => last,
        }
    }

    pub fn attempts(&self) -> u32 {
        match self {
            RetryError::Bailed { attempt, .. } => *attempt,
            RetryError::Exhausted { attempts, .. } => *attempts,
        }
    }
}

/// Run `operation` under `policy`.
pub async fn execute<T, E, F, Fut>(policy: &RetryPolicy<E>, mut operation: F) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: fmt::Display,
{
    let mut attempt = 0;

    loop {
        attempt += 1;

        let delay = policy.schedule.delay_before(attempt);
        if !delay.is_zero() {
            tracing::debug!(policy = %policy.name, attempt, delay = ?delay, "Backing off before retry");
            tokio::time::sleep(delay).await;
        }

        match operation().await {
            Ok(value) => {
                policy.notify(Attempt { number: attempt, outcome: Ok(()), will_retry: false });
                metrics::record_retry_attempt(&policy.name, "success");
                if attempt > 1 {
                    tracing::info!(policy = %policy.name, attempt, "Operation succeeded after retry");
                }
                return Ok(value);
            }
            Err(error) => {
                if !policy.is_retryable(&error) {
                    policy.notify(Attempt { number: attempt, outcome: Err(&error), will_retry: false });
                    metrics::record_retry_attempt(&policy.name, "bail");
                    tracing::debug!(policy = %policy.name, attempt, error = %error, "Non-retryable failure");
                    return Err(RetryError::Bailed { attempt, error });
                }

                let will_retry = attempt < policy.max_attempts;
                policy.notify(Attempt { number: attempt, outcome: Err(&error), will_retry });
                metrics::record_retry_attempt(&policy.name, "failure");

                if !will_retry {
                    tracing::warn!(
                        policy = %policy.name,
                        attempts = attempt,
                        error = %error,
                        "Retries exhausted"
                    );
                    return Err(RetryError::Exhausted { attempts: attempt, last: error });
                }

                tracing::warn!(
                    policy = %policy.name,
                    attempt,
                    max_attempts = policy.max_attempts,
                    error = %error,
                    "Attempt failed, retrying"
                );
            }
        }
    }
}
