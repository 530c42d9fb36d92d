//! Bounded fixed-delay retry policy for remote store operations.
//!
//! A policy value carries the attempt cap and the wait between attempts;
//! the caller supplies a predicate deciding which errors are transient.
//! Transient failures are logged and retried; anything else, or running out
//! of attempts, is fatal.

use std::time::Duration;

use crate::error::UrnError;
use crate::logging::{JsonlLogger, LogEvent};

/// Retry policy applied uniformly to every remote operation.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
        }
    }

    /// Run `attempt_fn` until it succeeds, fails with a non-transient error,
    /// or the attempt cap is reached.
    ///
    /// Each transient failure emits a [`LogEvent::Retry`] before sleeping.
    pub fn run<T, E>(
        &self,
        op: &str,
        logger: &JsonlLogger,
        is_transient: impl Fn(&E) -> bool,
        mut attempt_fn: impl FnMut() -> Result<T, E>,
    ) -> Result<T, UrnError>
    where
        UrnError: From<E>,
    {
        for attempt in 1..=self.max_attempts {
            match attempt_fn() {
                Ok(value) => return Ok(value),
                Err(err) if is_transient(&err) => {
                    logger.log(&LogEvent::Retry {
                        op,
                        attempt,
                        max_attempts: self.max_attempts,
                    });
                    if attempt < self.max_attempts {
                        std::thread::sleep(self.delay);
                    }
                }
                Err(err) => return Err(err.into()),
            }
        }
        Err(UrnError::RetriesExhausted {
            op: op.to_string(),
            attempts: self.max_attempts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    fn transient(err: &io::Error) -> bool {
        err.kind() == io::ErrorKind::Interrupted
    }

    fn policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(max_attempts, Duration::from_millis(0))
    }

    #[test]
    fn returns_first_success() {
        let result = policy(3).run("get", &JsonlLogger::disabled(), transient, || {
            Ok::<_, io::Error>(7u64)
        });
        assert_eq!(result.unwrap(), 7);
    }

    #[test]
    fn retries_transient_errors_until_success() {
        let mut failures_left = 2;
        let result = policy(5).run("get", &JsonlLogger::disabled(), transient, || {
            if failures_left > 0 {
                failures_left -= 1;
                Err(io::Error::new(io::ErrorKind::Interrupted, "warming up"))
            } else {
                Ok(42u64)
            }
        });
        assert_eq!(result.unwrap(), 42);
        assert_eq!(failures_left, 0);
    }

    #[test]
    fn non_transient_errors_fail_immediately() {
        let mut attempts = 0;
        let result: Result<(), _> = policy(5).run("set", &JsonlLogger::disabled(), transient, || {
            attempts += 1;
            Err(io::Error::new(io::ErrorKind::PermissionDenied, "nope"))
        });
        assert!(matches!(result, Err(UrnError::Io(_))));
        assert_eq!(attempts, 1);
    }

    #[test]
    fn exhaustion_converts_to_a_fatal_error() {
        let mut attempts = 0;
        let result: Result<(), _> = policy(4).run("get", &JsonlLogger::disabled(), transient, || {
            attempts += 1;
            Err(io::Error::new(io::ErrorKind::Interrupted, "still loading"))
        });
        assert_eq!(attempts, 4);
        match result {
            Err(UrnError::RetriesExhausted { op, attempts }) => {
                assert_eq!(op, "get");
                assert_eq!(attempts, 4);
            }
            other => panic!("expected RetriesExhausted, got {:?}", other.err()),
        }
    }
}
