//! Retry with exponential backoff for transient failures.

use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

/// Configuration for retry behavior.
#[derive(Clone, Debug)]
pub struct RetryConfig {
    /// Total number of attempts, including the first one.
    pub max_attempts: u32,
    /// Backoff before the second attempt.
    pub initial_backoff: Duration,
    /// Upper bound for any single backoff.
    pub max_backoff: Duration,
    /// Multiplier applied per attempt.
    pub backoff_multiplier: f64,
    /// Whether to add up to 25% jitter to each backoff.
    pub add_jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            add_jitter: false,
        }
    }
}

impl RetryConfig {
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }

    /// Backoff for a 1-based attempt number: `initial * multiplier^(n-1)`,
    /// capped at `max_backoff`.
    fn backoff_duration(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1);
        let backoff = self.initial_backoff.as_millis() as f64
            * self.backoff_multiplier.powi(exponent as i32);
        let backoff_ms = backoff.min(self.max_backoff.as_millis() as f64) as u64;

        let mut duration = Duration::from_millis(backoff_ms);

        if self.add_jitter {
            let jitter = rand::thread_rng().gen_range(0..=backoff_ms / 4);
            duration += Duration::from_millis(jitter);
        }

        duration
    }
}

/// Runs `f` until it succeeds, a non-transient error occurs, or the attempt
/// budget is spent. The last error is returned as-is.
pub async fn retry_async<F, Fut, T, E, P>(
    config: &RetryConfig,
    operation_name: &str,
    is_transient: P,
    f: F,
) -> Result<T, E>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    P: Fn(&E) -> bool,
{
    let mut attempt: u32 = 1;

    loop {
        match f().await {
            Ok(result) => {
                if attempt > 1 {
                    info!(
                        operation = operation_name,
                        attempt, "operation succeeded after retry"
                    );
                }
                return Ok(result);
            }
            Err(err) => {
                if attempt >= config.max_attempts {
                    warn!(
                        operation = operation_name,
                        attempt,
                        error = %err,
                        "operation failed, attempt budget exhausted"
                    );
                    return Err(err);
                }

                if !is_transient(&err) {
                    warn!(
                        operation = operation_name,
                        attempt,
                        error = %err,
                        "operation failed with non-transient error, not retrying"
                    );
                    return Err(err);
                }

                let backoff = config.backoff_duration(attempt);
                warn!(
                    operation = operation_name,
                    attempt,
                    error = %err,
                    backoff_ms = backoff.as_millis() as u64,
                    "operation failed, retrying after backoff"
                );

                sleep(backoff).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn default_config_matches_connection_policy() {
        let config = RetryConfig::default();
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.initial_backoff, Duration::from_secs(1));
        assert_eq!(config.backoff_multiplier, 2.0);
    }

    #[test]
    fn backoff_doubles_per_attempt() {
        let config = RetryConfig {
            add_jitter: false,
            ..Default::default()
        };

        assert_eq!(config.backoff_duration(1), Duration::from_secs(1));
        assert_eq!(config.backoff_duration(2), Duration::from_secs(2));
        assert_eq!(config.backoff_duration(3), Duration::from_secs(4));
    }

    #[test]
    fn backoff_is_capped() {
        let config = RetryConfig {
            max_backoff: Duration::from_secs(3),
            add_jitter: false,
            ..Default::default()
        };

        assert_eq!(config.backoff_duration(5), Duration::from_secs(3));
    }

    #[tokio::test]
    async fn succeeds_without_retry() {
        let config = RetryConfig::default();
        let result = retry_async(&config, "test_op", |_: &&str| true, || async {
            Ok::<_, &str>(42)
        })
        .await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn retries_transient_failures_until_success() {
        let config = RetryConfig {
            initial_backoff: Duration::from_millis(1),
            ..Default::default()
        };
        let calls = AtomicU32::new(0);

        let result = retry_async(&config, "test_op", |_: &&str| true, || async {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err("connection refused")
            } else {
                Ok(7)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn does_not_retry_permanent_failures() {
        let config = RetryConfig {
            initial_backoff: Duration::from_millis(1),
            ..Default::default()
        };
        let calls = AtomicU32::new(0);

        let result: Result<i32, &str> =
            retry_async(&config, "test_op", |_: &&str| false, || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err("bad credentials")
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn gives_up_after_attempt_budget() {
        let config = RetryConfig {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(1),
            ..Default::default()
        };
        let calls = AtomicU32::new(0);

        let result: Result<i32, &str> =
            retry_async(&config, "test_op", |_: &&str| true, || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err("connection refused")
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
