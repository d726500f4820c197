use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::fetcher::FetchError;

/// One retry policy for every call site. The retailers answer 403 from
/// their anti-bot layer well before any real ban, so blocked responses
/// are retried along with timeouts and server errors.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_ms: 500,
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (0-based): base * multiplier^attempt.
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = self.backoff_multiplier.powi(attempt as i32);
        Duration::from_millis((self.base_delay_ms as f64 * factor) as u64)
    }

    /// Run `op` until it succeeds, fails with a non-retryable error, or
    /// the attempt budget runs out.
    pub async fn run<T, F, Fut>(&self, mut op: F) -> Result<T, FetchError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, FetchError>>,
    {
        let attempts = self.max_attempts.max(1);
        let mut last_err = FetchError::Transport("no attempts made".into());

        for attempt in 0..attempts {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    if !is_retryable(&err) || attempt + 1 == attempts {
                        return Err(err);
                    }
                    let delay = self.delay(attempt);
                    tracing::debug!(
                        "retrying after {:?} ({}/{}): {}",
                        delay,
                        attempt + 1,
                        attempts,
                        err
                    );
                    last_err = err;
                    tokio::time::sleep(delay).await;
                }
            }
        }

        Err(last_err)
    }
}

fn is_retryable(err: &FetchError) -> bool {
    match err {
        FetchError::Timeout => true,
        FetchError::Blocked => true,
        FetchError::Http(status) => *status == 403 || *status == 429 || *status >= 500,
        FetchError::Transport(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    use super::*;

    #[test]
    fn test_delay_grows_exponentially() {
        let policy = RetryPolicy {
            max_attempts: 5,
            base_delay_ms: 500,
            backoff_multiplier: 2.0,
        };
        assert_eq!(policy.delay(0), Duration::from_millis(500));
        assert_eq!(policy.delay(1), Duration::from_millis(1000));
        assert_eq!(policy.delay(2), Duration::from_millis(2000));
    }

    #[test]
    fn test_retryable_classification() {
        assert!(is_retryable(&FetchError::Timeout));
        assert!(is_retryable(&FetchError::Blocked));
        assert!(is_retryable(&FetchError::Http(403)));
        assert!(is_retryable(&FetchError::Http(503)));
        assert!(!is_retryable(&FetchError::Http(404)));
        assert!(!is_retryable(&FetchError::Http(400)));
    }

    #[tokio::test]
    async fn test_run_retries_until_success() {
        let policy = RetryPolicy {
            max_attempts: 4,
            base_delay_ms: 1,
            backoff_multiplier: 1.0,
        };
        let calls = Arc::new(AtomicU32::new(0));

        let calls_in_op = calls.clone();
        let result = policy
            .run(move || {
                let calls = calls_in_op.clone();
                async move {
                    if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(FetchError::Http(403))
                    } else {
                        Ok("body".to_string())
                    }
                }
            })
            .await;

        assert_eq!(result, Ok("body".to_string()));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_run_gives_up_on_fatal_error() {
        let policy = RetryPolicy {
            max_attempts: 5,
            base_delay_ms: 1,
            backoff_multiplier: 1.0,
        };
        let calls = Arc::new(AtomicU32::new(0));

        let calls_in_op = calls.clone();
        let result: Result<String, _> = policy
            .run(move || {
                let calls = calls_in_op.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(FetchError::Http(404))
                }
            })
            .await;

        assert_eq!(result, Err(FetchError::Http(404)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_run_exhausts_attempts() {
        let policy = RetryPolicy {
            max_attempts: 3,
            base_delay_ms: 1,
            backoff_multiplier: 1.0,
        };
        let calls = Arc::new(AtomicU32::new(0));

        let calls_in_op = calls.clone();
        let result: Result<String, _> = policy
            .run(move || {
                let calls = calls_in_op.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(FetchError::Timeout)
                }
            })
            .await;

        assert_eq!(result, Err(FetchError::Timeout));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
