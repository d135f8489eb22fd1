use std::fmt::Display;
use std::thread;
use std::time::Duration;

use serde::Serialize;
use tracing::debug;

pub trait Retryable {
    fn is_transient(&self) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RetryPolicy {
    /// Total attempts including the first one; values below 1 are treated as 1.
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl RetryPolicy {
    #[cfg(test)]
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_backoff_ms: 0,
            max_backoff_ms: 0,
        }
    }

    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(32);
        let delay = self
            .initial_backoff_ms
            .saturating_mul(1_u64 << exponent)
            .min(self.max_backoff_ms.max(self.initial_backoff_ms));
        Duration::from_millis(delay)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RetryOutcome<T, E> {
    Succeeded {
        value: T,
        attempts: u32,
    },
    Failed {
        error: E,
        attempts: u32,
        exhausted: bool,
    },
}

/// Runs `op` until it succeeds, fails permanently, or uses up the attempt budget.
///
/// `op` receives the 1-based attempt number.
pub fn retry_with_backoff<T, E, F>(policy: &RetryPolicy, mut op: F) -> RetryOutcome<T, E>
where
    E: Retryable + Display,
    F: FnMut(u32) -> Result<T, E>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match op(attempt) {
            Ok(value) => {
                return RetryOutcome::Succeeded {
                    value,
                    attempts: attempt,
                };
            }
            Err(error) => {
                let transient = error.is_transient();
                if !transient || attempt >= max_attempts {
                    return RetryOutcome::Failed {
                        error,
                        attempts: attempt,
                        exhausted: transient,
                    };
                }

                let delay = policy.backoff_for(attempt);
                debug!(
                    attempt,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "transient failure, retrying"
                );
                if !delay.is_zero() {
                    thread::sleep(delay);
                }
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    enum TestError {
        Flaky,
        Fatal,
    }

    impl Display for TestError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "{self:?}")
        }
    }

    impl Retryable for TestError {
        fn is_transient(&self) -> bool {
            matches!(self, Self::Flaky)
        }
    }

    #[test]
    fn succeeds_after_transient_failures_within_budget() {
        let mut calls = 0;
        let outcome = retry_with_backoff(&RetryPolicy::immediate(3), |attempt| {
            calls += 1;
            if attempt < 3 { Err(TestError::Flaky) } else { Ok("done") }
        });
        assert_eq!(
            outcome,
            RetryOutcome::Succeeded {
                value: "done",
                attempts: 3
            }
        );
        assert_eq!(calls, 3);
    }

    #[test]
    fn stops_when_budget_is_exhausted() {
        let mut calls = 0;
        let outcome: RetryOutcome<(), _> = retry_with_backoff(&RetryPolicy::immediate(2), |_| {
            calls += 1;
            Err(TestError::Flaky)
        });
        assert_eq!(
            outcome,
            RetryOutcome::Failed {
                error: TestError::Flaky,
                attempts: 2,
                exhausted: true
            }
        );
        assert_eq!(calls, 2);
    }

    #[test]
    fn permanent_errors_are_not_retried() {
        let mut calls = 0;
        let outcome: RetryOutcome<(), _> = retry_with_backoff(&RetryPolicy::immediate(5), |_| {
            calls += 1;
            Err(TestError::Fatal)
        });
        assert_eq!(
            outcome,
            RetryOutcome::Failed {
                error: TestError::Fatal,
                attempts: 1,
                exhausted: false
            }
        );
        assert_eq!(calls, 1);
    }

    #[test]
    fn zero_attempt_budget_still_tries_once() {
        let mut calls = 0;
        let _: RetryOutcome<(), _> = retry_with_backoff(&RetryPolicy::immediate(0), |_| {
            calls += 1;
            Err(TestError::Flaky)
        });
        assert_eq!(calls, 1);
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 6,
            initial_backoff_ms: 500,
            max_backoff_ms: 3000,
        };
        assert_eq!(policy.backoff_for(1), Duration::from_millis(500));
        assert_eq!(policy.backoff_for(2), Duration::from_millis(1000));
        assert_eq!(policy.backoff_for(3), Duration::from_millis(2000));
        assert_eq!(policy.backoff_for(4), Duration::from_millis(3000));
        assert_eq!(policy.backoff_for(40), Duration::from_millis(3000));
    }
}
