//! Exponential backoff for transient transport failures.

use std::time::Duration;

use tracing::{debug, warn};

use crate::error::{Result, SyncError};

#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    /// Doubles after every failed attempt.
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(250),
            max_backoff: Duration::from_secs(5),
        }
    }
}

/// Run `operation` until it succeeds, fails with an error `retryable`
/// rejects, or runs out of attempts.
pub fn retry_with_backoff<T, F>(
    config: &RetryConfig,
    context: &str,
    retryable: fn(&SyncError) -> bool,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Result<T>,
{
    let mut attempt = 0;
    let mut backoff = config.initial_backoff;

    loop {
        attempt += 1;
        match operation() {
            Ok(value) => {
                if attempt > 1 {
                    debug!(context = %context, attempt, "request succeeded after retry");
                }
                return Ok(value);
            }
            Err(e) if !retryable(&e) || attempt >= config.max_attempts.max(1) => {
                if attempt > 1 {
                    warn!(context = %context, attempts = attempt, error = %e, "giving up after retries");
                }
                return Err(e);
            }
            Err(e) => {
                warn!(
                    context = %context,
                    attempt,
                    max_attempts = config.max_attempts,
                    backoff_ms = backoff.as_millis() as u64,
                    error = %e,
                    "transient failure, backing off"
                );
                std::thread::sleep(backoff);
                backoff = std::cmp::min(backoff * 2, config.max_backoff);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast() -> RetryConfig {
        RetryConfig {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(2),
        }
    }

    #[test]
    fn test_succeeds_first_attempt() {
        let mut calls = 0;
        let result = retry_with_backoff(&fast(), "test", SyncError::is_transient, || {
            calls += 1;
            Ok::<_, SyncError>(42)
        });
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_retries_transient_then_succeeds() {
        let mut calls = 0;
        let result = retry_with_backoff(&fast(), "test", SyncError::is_transient, || {
            calls += 1;
            if calls < 3 {
                Err(SyncError::RetryLater)
            } else {
                Ok(7)
            }
        });
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls, 3);
    }

    #[test]
    fn test_gives_up_after_max_attempts() {
        let mut calls = 0;
        let result: Result<()> = retry_with_backoff(&fast(), "test", SyncError::is_transient, || {
            calls += 1;
            Err(SyncError::Status { status: 503, body: String::new() })
        });
        assert!(result.is_err());
        assert_eq!(calls, 3);
    }

    #[test]
    fn test_permanent_error_is_not_retried() {
        let mut calls = 0;
        let result: Result<()> = retry_with_backoff(&fast(), "test", SyncError::is_transient, || {
            calls += 1;
            Err(SyncError::MissingAccount)
        });
        assert!(matches!(result, Err(SyncError::MissingAccount)));
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_custom_rule_limits_retries() {
        let mut calls = 0;
        let result: Result<()> = retry_with_backoff(&fast(), "test", SyncError::is_undelivered, || {
            calls += 1;
            Err(SyncError::Status { status: 503, body: String::new() })
        });
        assert!(result.is_err());
        assert_eq!(calls, 1);

        let mut calls = 0;
        let result = retry_with_backoff(&fast(), "test", SyncError::is_undelivered, || {
            calls += 1;
            if calls < 2 {
                Err(SyncError::RetryLater)
            } else {
                Ok(1)
            }
        });
        assert_eq!(result.unwrap(), 1);
        assert_eq!(calls, 2);
    }
}
