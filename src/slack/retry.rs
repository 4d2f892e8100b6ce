//! Rate-limit aware retry for Slack API calls.

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

use super::types::SlackError;

const DEFAULT_MAX_RETRIES: u32 = 5;
const DEFAULT_INITIAL_BACKOFF_MS: u64 = 1000;
const DEFAULT_MAX_BACKOFF_MS: u64 = 60_000;

/// How long and how often to retry a rate-limited call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_retries: u32,
    #[serde(with = "millis")]
    pub initial_backoff: Duration,
    #[serde(with = "millis")]
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            initial_backoff: Duration::from_millis(DEFAULT_INITIAL_BACKOFF_MS),
            max_backoff: Duration::from_millis(DEFAULT_MAX_BACKOFF_MS),
        }
    }
}

impl RetryPolicy {
    /// Backoff used before retry number `retry` (1-based) when the server gave no hint.
    pub fn backoff_for(&self, retry: u32) -> Duration {
        let factor = 1u32.checked_shl(retry.saturating_sub(1)).unwrap_or(u32::MAX);
        self.initial_backoff
            .checked_mul(factor)
            .unwrap_or(self.max_backoff)
            .min(self.max_backoff)
    }
}

/// Run `f`, retrying with backoff while it fails with a rate-limit error.
///
/// Non rate-limit errors are returned after the first attempt. Once
/// `policy.max_retries` retries are spent the last error is wrapped in
/// [`SlackError::RetriesExhausted`].
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, operation: &str, mut f: F) -> Result<T, SlackError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, SlackError>>,
{
    let mut retries = 0;

    loop {
        let err = match f().await {
            Ok(result) => return Ok(result),
            Err(e) => e,
        };

        let Some(retry_after) = err.rate_limit_delay() else {
            return Err(err);
        };

        if retries >= policy.max_retries {
            return Err(SlackError::RetriesExhausted {
                operation: operation.to_string(),
                retries: policy.max_retries,
                source: Box::new(err),
            });
        }

        retries += 1;
        let delay = retry_after
            .unwrap_or_else(|| policy.backoff_for(retries))
            .min(policy.max_backoff);
        tracing::warn!(
            "Rate limited on {}, retry {}/{} after {}ms",
            operation,
            retries,
            policy.max_retries,
            delay.as_millis()
        );
        sleep(delay).await;
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(8),
        }
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let p = policy(10);
        assert_eq!(p.backoff_for(1), Duration::from_secs(1));
        assert_eq!(p.backoff_for(2), Duration::from_secs(2));
        assert_eq!(p.backoff_for(3), Duration::from_secs(4));
        assert_eq!(p.backoff_for(4), Duration::from_secs(8));
        assert_eq!(p.backoff_for(5), Duration::from_secs(8));
        assert_eq!(p.backoff_for(40), Duration::from_secs(8));
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_after_rate_limits() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result = with_retry(&policy(3), "conversations.history", || {
            let counter = counter.clone();
            async move {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                if n < 3 {
                    Err(SlackError::RateLimited { retry_after: None })
                } else {
                    Ok(42)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausts_after_max_retries_plus_one() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result: Result<(), _> = with_retry(&policy(3), "conversations.replies", || {
            let counter = counter.clone();
            async move {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                Err(SlackError::Api(format!("ratelimited #{}", n)))
            }
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 4);
        match result.unwrap_err() {
            SlackError::RetriesExhausted {
                operation,
                retries,
                source,
            } => {
                assert_eq!(operation, "conversations.replies");
                assert_eq!(retries, 3);
                assert_eq!(source.to_string(), "API error: ratelimited #3");
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_retryable_returns_immediately() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result: Result<(), _> = with_retry(&policy(5), "conversations.history", || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(SlackError::Api("channel_not_found".into()))
            }
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(result.unwrap_err(), SlackError::Api(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_honors_retry_after_capped_at_max() {
        let start = tokio::time::Instant::now();
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result = with_retry(&policy(2), "users.list", || {
            let counter = counter.clone();
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(SlackError::RateLimited {
                        retry_after: Some(Duration::from_secs(30)),
                    })
                } else {
                    Ok("ok")
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), "ok");
        // 30s hint capped at the 8s maximum
        assert_eq!(start.elapsed(), Duration::from_secs(8));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exponential_wait_without_hint() {
        let start = tokio::time::Instant::now();
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let _ = with_retry(&policy(3), "users.list", || {
            let counter = counter.clone();
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) < 3 {
                    Err(SlackError::RateLimited { retry_after: None })
                } else {
                    Ok(())
                }
            }
        })
        .await;

        // 1s + 2s + 4s
        assert_eq!(start.elapsed(), Duration::from_secs(7));
    }

    #[test]
    fn test_policy_from_toml_millis() {
        let policy: RetryPolicy = toml::from_str("max_retries = 2\ninitial_backoff = 250").unwrap();
        assert_eq!(policy.max_retries, 2);
        assert_eq!(policy.initial_backoff, Duration::from_millis(250));
        assert_eq!(policy.max_backoff, Duration::from_secs(60));
    }
}
