//! Core rate limiter implementation.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, trace, warn};

use super::bucket::{CounterKey, MinuteBucket, BUCKET_TTL};
use super::store::{CounterStore, StoreError};
use crate::flags::{FlagClient, FlagContext, FlagOutcome};

/// Limit applied when the limit flag cannot be evaluated.
pub const DENY_ALL_LIMIT: i64 = 0;

/// Errors that prevent a rate limit decision from being made.
#[derive(Debug, Error)]
pub enum RateLimitError {
    #[error("Counter store unavailable: {0}")]
    Store(#[from] StoreError),
}

/// The outcome of a rate limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    /// Requests allowed per bucket.
    pub limit: i64,
    /// Requests left in the bucket after this one; negative once exceeded.
    pub remaining: i64,
    /// Seconds until the current bucket ends.
    pub reset_seconds: i64,
    /// Whether this request is over the limit.
    pub exceeded: bool,
}

impl RateLimitDecision {
    /// Compute a decision from the limit and the count seen before this request.
    pub fn compute(limit: i64, current: u64, unix_seconds: i64) -> Self {
        let current = i64::try_from(current).unwrap_or(i64::MAX);
        Self {
            limit,
            remaining: limit.saturating_sub(current).saturating_sub(1),
            reset_seconds: MinuteBucket::reset_seconds(unix_seconds),
            exceeded: current >= limit,
        }
    }
}

/// Per-client, per-method, per-minute rate limiter.
///
/// The limit comes from a feature flag evaluated with the HTTP method as key;
/// usage lives in a shared [`CounterStore`].
#[derive(Clone)]
pub struct RateLimiter {
    /// Shared usage counters
    store: Arc<dyn CounterStore>,
    /// Source of the per-minute limit
    flags: FlagClient,
    /// Flag holding the limit
    limit_flag: String,
    /// Namespace for counter keys
    key_prefix: String,
    /// Bound on each counter store call
    store_timeout: Duration,
}

impl RateLimiter {
    pub fn new(
        store: Arc<dyn CounterStore>,
        flags: FlagClient,
        limit_flag: impl Into<String>,
        key_prefix: impl Into<String>,
        store_timeout: Duration,
    ) -> Self {
        Self {
            store,
            flags,
            limit_flag: limit_flag.into(),
            key_prefix: key_prefix.into(),
            store_timeout,
        }
    }

    /// Check the rate limit for a request.
    ///
    /// When the request is within the limit the bucket counter is incremented
    /// and its expiry refreshed in one atomic store operation. Requests that are
    /// already over the limit leave the counter untouched.
    pub async fn evaluate(
        &self,
        client_address: &str,
        method: &str,
        unix_seconds: i64,
    ) -> Result<RateLimitDecision, RateLimitError> {
        let limit = self.limit_for(client_address, method).await;
        let key = CounterKey::new(client_address, method, MinuteBucket::containing(unix_seconds));
        let store_key = key.to_store_key(&self.key_prefix);

        let current = self.bounded(self.store.get(&store_key)).await?.unwrap_or(0);
        let decision = RateLimitDecision::compute(limit, current, unix_seconds);

        trace!(
            key = %key,
            limit = decision.limit,
            current = current,
            remaining = decision.remaining,
            "Checking rate limit"
        );

        if decision.exceeded {
            debug!(key = %key, limit = decision.limit, "Rate limit exceeded");
        } else {
            self.bounded(self.store.increment(&store_key, BUCKET_TTL)).await?;
        }

        Ok(decision)
    }

    async fn limit_for(&self, client_address: &str, method: &str) -> i64 {
        let context = FlagContext::new(method, client_address);
        match self.flags.int_variation(&self.limit_flag, &context).await {
            FlagOutcome::Served(limit) => limit,
            FlagOutcome::Unavailable => {
                warn!(
                    flag = %self.limit_flag,
                    client = %client_address,
                    method = %method,
                    "Rate limit flag unavailable, denying request"
                );
                DENY_ALL_LIMIT
            }
        }
    }

    async fn bounded<T, F>(&self, call: F) -> Result<T, RateLimitError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        match tokio::time::timeout(self.store_timeout, call).await {
            Ok(result) => Ok(result?),
            Err(_) => {
                warn!(timeout = ?self.store_timeout, "Counter store call timed out");
                Err(StoreError::Timeout(self.store_timeout).into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flags::FileFlagEvaluator;
    use crate::ratelimit::MemoryCounterStore;
    use async_trait::async_trait;

    /// 2023-11-14T22:13:00Z, the first second of a bucket.
    const BUCKET_START: i64 = 1_699_999_980;

    const FLAGS: &str = r#"
flags:
  api-rate-limiter:
    fallthrough: 2
    targets:
      - key: POST
        value: 0
"#;

    fn limiter_with(store: Arc<dyn CounterStore>, yaml: &str) -> RateLimiter {
        let evaluator = Arc::new(FileFlagEvaluator::from_yaml(yaml).unwrap());
        RateLimiter::new(
            store,
            FlagClient::new(evaluator, Duration::from_millis(100)),
            "api-rate-limiter",
            "test:",
            Duration::from_millis(100),
        )
    }

    async fn current_count(limiter: &RateLimiter, client: &str, method: &str, unix_seconds: i64) -> u64 {
        let key = CounterKey::new(client, method, MinuteBucket::containing(unix_seconds));
        let count = limiter.store.get(&key.to_store_key(&limiter.key_prefix)).await.unwrap();
        count.unwrap_or(0)
    }

    fn limiter() -> RateLimiter {
        limiter_with(Arc::new(MemoryCounterStore::new()), FLAGS)
    }

    struct DownStore;

    #[async_trait]
    impl CounterStore for DownStore {
        async fn get(&self, _: &str) -> Result<Option<u64>, StoreError> {
            Err(StoreError::Timeout(Duration::ZERO))
        }

        async fn increment(&self, _: &str, _: Duration) -> Result<u64, StoreError> {
            Err(StoreError::Timeout(Duration::ZERO))
        }
    }

    struct StalledStore;

    #[async_trait]
    impl CounterStore for StalledStore {
        async fn get(&self, _: &str) -> Result<Option<u64>, StoreError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(None)
        }

        async fn increment(&self, _: &str, _: Duration) -> Result<u64, StoreError> {
            Ok(1)
        }
    }

    #[test]
    fn test_decision_compute() {
        let decision = RateLimitDecision::compute(10, 3, BUCKET_START + 15);
        assert_eq!(decision.limit, 10);
        assert_eq!(decision.remaining, 6);
        assert_eq!(decision.reset_seconds, 45);
        assert!(!decision.exceeded);

        let decision = RateLimitDecision::compute(10, 10, BUCKET_START);
        assert_eq!(decision.remaining, -1);
        assert_eq!(decision.reset_seconds, 60);
        assert!(decision.exceeded);
    }

    #[tokio::test]
    async fn test_remaining_counts_down_then_denies() {
        let limiter = limiter();

        let first = limiter.evaluate("1.2.3.4", "GET", BUCKET_START).await.unwrap();
        assert!(!first.exceeded);
        assert_eq!(first.limit, 2);
        assert_eq!(first.remaining, 1);

        let second = limiter.evaluate("1.2.3.4", "GET", BUCKET_START + 1).await.unwrap();
        assert!(!second.exceeded);
        assert_eq!(second.remaining, 0);

        let third = limiter.evaluate("1.2.3.4", "GET", BUCKET_START + 2).await.unwrap();
        assert!(third.exceeded);
        assert!(third.reset_seconds <= 60);
        assert_eq!(third.reset_seconds, 58);
    }

    #[tokio::test]
    async fn test_denied_requests_do_not_increment() {
        let limiter = limiter();

        for _ in 0..5 {
            limiter.evaluate("1.2.3.4", "GET", BUCKET_START).await.unwrap();
        }

        let count = current_count(&limiter, "1.2.3.4", "GET", BUCKET_START).await;
        assert_eq!(count, 2);
    }

    #[tokio::test]
    async fn test_new_bucket_restores_limit() {
        let limiter = limiter();

        for _ in 0..3 {
            limiter.evaluate("1.2.3.4", "GET", BUCKET_START).await.unwrap();
        }
        let denied = limiter.evaluate("1.2.3.4", "GET", BUCKET_START + 59).await.unwrap();
        assert!(denied.exceeded);

        let next = limiter.evaluate("1.2.3.4", "GET", BUCKET_START + 60).await.unwrap();
        assert!(!next.exceeded);
        assert_eq!(next.remaining, 1);
    }

    #[tokio::test]
    async fn test_clients_and_methods_are_counted_separately() {
        let limiter = limiter();

        limiter.evaluate("1.2.3.4", "GET", BUCKET_START).await.unwrap();
        limiter.evaluate("1.2.3.4", "GET", BUCKET_START).await.unwrap();

        let other_client = limiter.evaluate("5.6.7.8", "GET", BUCKET_START).await.unwrap();
        assert_eq!(other_client.remaining, 1);

        let other_method = limiter.evaluate("1.2.3.4", "PUT", BUCKET_START).await.unwrap();
        assert_eq!(other_method.remaining, 1);
    }

    #[tokio::test]
    async fn test_zero_limit_denies() {
        let limiter = limiter();
        let decision = limiter.evaluate("1.2.3.4", "POST", BUCKET_START).await.unwrap();
        assert!(decision.exceeded);
        assert_eq!(decision.limit, 0);
    }

    #[tokio::test]
    async fn test_unavailable_flag_denies() {
        let limiter = limiter_with(Arc::new(MemoryCounterStore::new()), "flags: {}\n");
        let decision = limiter.evaluate("1.2.3.4", "GET", BUCKET_START).await.unwrap();
        assert!(decision.exceeded);
        assert_eq!(decision.limit, DENY_ALL_LIMIT);

        let count = current_count(&limiter, "1.2.3.4", "GET", BUCKET_START).await;
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn test_store_failure_is_an_error() {
        let limiter = limiter_with(Arc::new(DownStore), FLAGS);
        let result = limiter.evaluate("1.2.3.4", "GET", BUCKET_START).await;
        assert!(matches!(result, Err(RateLimitError::Store(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_store_timeout_is_an_error() {
        let limiter = limiter_with(Arc::new(StalledStore), FLAGS);
        let result = limiter.evaluate("1.2.3.4", "GET", BUCKET_START).await;
        assert!(matches!(result, Err(RateLimitError::Store(StoreError::Timeout(_)))));
    }
}
