//! Retry policy for provider calls.
//!
//! Transient failures (rate limits, timeouts, 5xx) are retried with
//! exponential backoff; a `Retry-After` hint from a 429 response takes
//! precedence over the computed delay.

use std::future::Future;
use std::time::Duration;

use super::LlmError;

#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    #[must_use]
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    #[must_use]
    pub fn with_initial_delay(mut self, initial_delay: Duration) -> Self {
        self.initial_delay = initial_delay;
        self
    }

    #[must_use]
    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }
}

pub fn is_retryable_status(status: u16) -> bool {
    matches!(status, 408 | 429 | 500 | 502 | 503 | 504)
}

fn next_delay(current: Duration, config: &RetryConfig) -> Duration {
    let multiplier = config.backoff_multiplier.max(1.0);
    let scaled = Duration::from_secs_f64(current.as_secs_f64() * multiplier);
    scaled.min(config.max_delay)
}

/// Run `operation` with the retry policy. The operation is re-invoked
/// for each attempt so request state is rebuilt fresh.
pub async fn with_retry<T, Op, Fut>(
    config: &RetryConfig,
    operation_name: &str,
    mut operation: Op,
) -> Result<T, LlmError>
where
    Op: FnMut() -> Fut,
    Fut: Future<Output = Result<T, LlmError>>,
{
    let mut attempt: u32 = 0;
    let mut delay = config.initial_delay;

    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(error) if attempt < config.max_retries && error.is_retryable() => {
                attempt += 1;

                let wait = match &error {
                    LlmError::RateLimited {
                        retry_after: Some(secs),
                        ..
                    } => Duration::from_secs(*secs).min(config.max_delay),
                    _ => delay,
                };

                tracing::warn!(
                    operation = operation_name,
                    attempt,
                    max_retries = config.max_retries,
                    wait_ms = wait.as_millis() as u64,
                    error = %error,
                    "retryable provider error, backing off"
                );

                tokio::time::sleep(wait).await;
                delay = next_delay(delay, config);
            }
            Err(error) => return Err(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn zero_delay() -> RetryConfig {
        RetryConfig::default()
            .with_initial_delay(Duration::ZERO)
            .with_max_delay(Duration::ZERO)
    }

    #[tokio::test]
    async fn test_retries_transient_errors() {
        let attempts = Arc::new(AtomicU32::new(0));

        let result = with_retry(&zero_delay(), "test", || {
            let attempts = Arc::clone(&attempts);
            async move {
                let n = attempts.fetch_add(1, Ordering::SeqCst);
                if n < 2 {
                    return Err(LlmError::Api {
                        provider: "test",
                        status: 503,
                        message: "unavailable".to_string(),
                    });
                }
                Ok("ok")
            }
        })
        .await
        .unwrap();

        assert_eq!(result, "ok");
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_stops_on_non_retryable_error() {
        let attempts = Arc::new(AtomicU32::new(0));

        let error = with_retry(&zero_delay(), "test", || {
            let attempts = Arc::clone(&attempts);
            async move {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(LlmError::Api {
                    provider: "test",
                    status: 400,
                    message: "bad request".to_string(),
                })
            }
        })
        .await
        .unwrap_err();

        assert!(matches!(error, LlmError::Api { status: 400, .. }));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_budget_exhaustion_returns_last_error() {
        let config = zero_delay().with_max_retries(2);
        let attempts = Arc::new(AtomicU32::new(0));

        let error = with_retry(&config, "test", || {
            let attempts = Arc::clone(&attempts);
            async move {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(LlmError::RateLimited {
                    provider: "test",
                    retry_after: None,
                })
            }
        })
        .await
        .unwrap_err();

        assert!(matches!(error, LlmError::RateLimited { .. }));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_retryable_status_codes() {
        assert!(is_retryable_status(429));
        assert!(is_retryable_status(503));
        assert!(!is_retryable_status(400));
        assert!(!is_retryable_status(401));
    }
}
