//! Bounded retry with fixed or exponential delay

use rand::RngExt;
use std::future::Future;
use std::time::Duration;
use tracing::debug;

use super::ClientError;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    max_attempts: u32,
    delay: Duration,
    /// Multiplier applied to the delay after each failed attempt; 1.0 keeps it fixed
    backoff: f64,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration, backoff: f64) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
            backoff: if backoff.is_finite() && backoff >= 1.0 {
                backoff
            } else {
                1.0
            },
        }
    }

    /// Single attempt, no retry
    pub fn none() -> Self {
        Self::new(1, Duration::ZERO, 1.0)
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay before attempt `failed + 1`, with ±10% jitter
    pub fn delay_for(&self, failed: u32) -> Duration {
        if self.delay.is_zero() {
            return Duration::ZERO;
        }

        let exponent = failed.saturating_sub(1).min(16) as i32;
        let base = self.delay.as_secs_f64() * self.backoff.powi(exponent);
        let jitter = rand::rng().random_range(0.9..=1.1);

        Duration::from_secs_f64((base * jitter).max(0.0))
    }

    /// Run `attempt` until it succeeds, fails with a non-retryable error, or
    /// the attempt budget is spent. The closure receives the 1-based attempt number.
    pub async fn run<T, F, Fut>(&self, operation: &str, mut attempt: F) -> Result<T, ClientError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, ClientError>>,
    {
        let mut current = 1;
        loop {
            match attempt(current).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && current < self.max_attempts => {
                    let wait = self.delay_for(current);
                    debug!(
                        operation,
                        attempt = current,
                        max_attempts = self.max_attempts,
                        error = %e,
                        "attempt failed, retrying in {:?}",
                        wait
                    );
                    tokio::time::sleep(wait).await;
                    current += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_retries_until_success() {
        let policy = RetryPolicy::new(3, Duration::ZERO, 1.0);
        let calls = AtomicU32::new(0);

        let result = policy
            .run("test", |attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt < 3 {
                        Err(ClientError::Status(StatusCode::BAD_GATEWAY))
                    } else {
                        Ok(attempt)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let policy = RetryPolicy::new(3, Duration::ZERO, 1.0);
        let calls = AtomicU32::new(0);

        let result: Result<(), _> = policy
            .run("test", |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(ClientError::ServiceUnavailable("stats-server".to_string())) }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_client_errors_are_not_retried() {
        let policy = RetryPolicy::new(5, Duration::ZERO, 1.0);
        let calls = AtomicU32::new(0);

        let result: Result<(), _> = policy
            .run("test", |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(ClientError::Status(StatusCode::BAD_REQUEST)) }
            })
            .await;

        assert!(matches!(result, Err(ClientError::Status(StatusCode::BAD_REQUEST))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_backoff_grows_within_jitter() {
        let policy = RetryPolicy::new(4, Duration::from_millis(100), 2.0);

        let first = policy.delay_for(1).as_millis();
        let third = policy.delay_for(3).as_millis();

        assert!((85..=115).contains(&first), "first delay was {first}ms");
        assert!((350..=450).contains(&third), "third delay was {third}ms");
    }

    #[test]
    fn test_zero_attempts_means_one() {
        assert_eq!(RetryPolicy::new(0, Duration::ZERO, 1.0).max_attempts(), 1);
    }
}
