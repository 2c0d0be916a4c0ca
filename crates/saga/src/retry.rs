//! Bounded retry for the completion commit.
//!
//! The completion commit is the saga's pivot: once payment went through the
//! saga tries to move forward rather than undo. It gets a fixed number of
//! attempts, each bounded by a deadline, with a fixed pause in between.

use std::future::Future;
use std::time::Duration;

use common::FaultToggles;

/// Attempts the completion commit gets before compensation takes over.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Pause between completion attempts.
pub const DEFAULT_BACKOFF: Duration = Duration::from_secs(1);

/// Deadline for a single attempt.
pub const DEFAULT_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(5);

/// How the completion commit is retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
    pub attempt_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff: DEFAULT_BACKOFF,
            attempt_timeout: DEFAULT_ATTEMPT_TIMEOUT,
        }
    }
}

/// Result of a retried operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryOutcome<T> {
    /// An attempt succeeded.
    Succeeded { value: T, attempts: u32 },

    /// Every attempt failed.
    Exhausted {
        attempts: u32,
        last_error: Option<String>,
    },
}

impl<T> RetryOutcome<T> {
    pub fn attempts(&self) -> u32 {
        match self {
            RetryOutcome::Succeeded { attempts, .. } | RetryOutcome::Exhausted { attempts, .. } => {
                *attempts
            }
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, RetryOutcome::Succeeded { .. })
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: Duration, attempt_timeout: Duration) -> Self {
        Self {
            max_attempts,
            backoff,
            attempt_timeout,
        }
    }

    /// Runs the completion commit until it succeeds or attempts run out.
    ///
    /// Attempts are 1-indexed and continue after `previous`, the count a
    /// redelivered command already used up. `record` is awaited with each
    /// attempt number before that attempt runs. `commit` is only invoked
    /// once the toggle threshold is reached
    /// (`completion_retry_threshold <= attempt`); earlier attempts count as
    /// simulated transient failures.
    pub async fn run_completion<T, E, F, Fut, R, RFut>(
        &self,
        toggles: &FaultToggles,
        previous: u32,
        mut record: R,
        mut commit: F,
    ) -> RetryOutcome<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
        R: FnMut(u32) -> RFut,
        RFut: Future<Output = ()>,
    {
        let mut attempt = previous;
        let mut last_error = None;

        if attempt >= self.max_attempts {
            tracing::warn!(attempt, "completion attempts already used up");
            return RetryOutcome::Exhausted {
                attempts: attempt,
                last_error: Some(format!("{attempt} attempts already made")),
            };
        }

        while attempt < self.max_attempts {
            attempt += 1;
            metrics::counter!("saga_completion_attempts_total").increment(1);
            record(attempt).await;

            if toggles.completion_succeeds_on(attempt) {
                match tokio::time::timeout(self.attempt_timeout, commit(attempt)).await {
                    Ok(Ok(value)) => {
                        tracing::info!(attempt, "completion commit succeeded");
                        return RetryOutcome::Succeeded {
                            value,
                            attempts: attempt,
                        };
                    }
                    Ok(Err(e)) => {
                        tracing::warn!(attempt, error = %e, "completion commit failed");
                        last_error = Some(e.to_string());
                    }
                    Err(_) => {
                        tracing::warn!(
                            attempt,
                            timeout_ms = self.attempt_timeout.as_millis() as u64,
                            "completion commit timed out"
                        );
                        last_error = Some(format!("attempt {attempt} timed out"));
                    }
                }
            } else {
                tracing::info!(
                    attempt,
                    threshold = toggles.completion_retry_threshold,
                    "completion commit not yet allowed, retrying"
                );
                last_error = Some(format!("attempt {attempt} below retry threshold"));
            }

            if attempt < self.max_attempts {
                tokio::time::sleep(self.backoff).await;
            }
        }

        RetryOutcome::Exhausted {
            attempts: attempt,
            last_error,
        }
    }
}
