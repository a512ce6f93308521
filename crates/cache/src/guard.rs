//! Bounded-time, error-absorbing adapter around the distributed tier.
//!
//! Every call is raced against a timer; failures and timeouts are logged,
//! counted and turned into "nothing happened". Nothing is retried.

use crate::backend::DistributedBackend;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use storefront_core::config::RedisConfig;
use storefront_core::{InsightsError, InsightsResult};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy)]
pub struct Timeouts {
    pub op: Duration,
    pub scan: Duration,
    pub delete: Duration,
}

impl Timeouts {
    pub fn from_config(config: &RedisConfig) -> Self {
        Self {
            op: Duration::from_millis(config.op_timeout_ms),
            scan: Duration::from_millis(config.scan_timeout_ms),
            delete: Duration::from_millis(config.delete_timeout_ms),
        }
    }
}

impl Default for Timeouts {
    fn default() -> Self {
        Self::from_config(&RedisConfig::default())
    }
}

pub struct BoundedBackend {
    inner: Arc<dyn DistributedBackend>,
    timeouts: Timeouts,
}

fn elapsed(limit: Duration) -> InsightsError {
    InsightsError::Timeout(u64::try_from(limit.as_millis()).unwrap_or(u64::MAX))
}

async fn bounded<T>(
    operation: &'static str,
    limit: Duration,
    fut: impl Future<Output = InsightsResult<T>>,
) -> Option<T> {
    match tokio::time::timeout(limit, fut).await {
        Ok(Ok(value)) => Some(value),
        Ok(Err(e)) => {
            metrics::counter!("cache.l2.errors").increment(1);
            warn!(operation, error = %e, "Distributed cache call failed");
            None
        }
        Err(_) => {
            metrics::counter!("cache.l2.timeouts").increment(1);
            warn!(operation, error = %elapsed(limit), "Distributed cache call timed out");
            None
        }
    }
}

impl BoundedBackend {
    pub fn new(inner: Arc<dyn DistributedBackend>, timeouts: Timeouts) -> Self {
        Self { inner, timeouts }
    }

    pub async fn get(&self, key: &str) -> Option<String> {
        bounded("get", self.timeouts.op, self.inner.get(key))
            .await
            .flatten()
    }

    pub async fn setex(&self, key: &str, ttl_secs: u64, value: &str) -> bool {
        bounded("setex", self.timeouts.op, self.inner.setex(key, ttl_secs, value))
            .await
            .is_some()
    }

    pub async fn del(&self, key: &str) -> bool {
        bounded("del", self.timeouts.delete, self.inner.del(key))
            .await
            .is_some()
    }

    /// Scan for keys matching `pattern` and delete them in one batch.
    /// Returns how many keys were deleted; 0 when either step fails.
    pub async fn delete_matching(&self, pattern: &str) -> usize {
        let Some(keys) = bounded("keys", self.timeouts.scan, self.inner.keys(pattern)).await
        else {
            return 0;
        };
        if keys.is_empty() {
            return 0;
        }
        match bounded("del_many", self.timeouts.delete, self.inner.del_many(&keys)).await {
            Some(()) => {
                debug!(pattern, deleted = keys.len(), "Distributed keys invalidated");
                keys.len()
            }
            None => 0,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use async_trait::async_trait;
    use std::time::Instant;

    /// Backend whose calls never complete.
    struct HangingBackend;

    #[async_trait]
    impl DistributedBackend for HangingBackend {
        async fn get(&self, _key: &str) -> InsightsResult<Option<String>> {
            std::future::pending().await
        }
        async fn setex(&self, _key: &str, _ttl: u64, _value: &str) -> InsightsResult<()> {
            std::future::pending().await
        }
        async fn del(&self, _key: &str) -> InsightsResult<()> {
            std::future::pending().await
        }
        async fn keys(&self, _pattern: &str) -> InsightsResult<Vec<String>> {
            std::future::pending().await
        }
        async fn del_many(&self, _keys: &[String]) -> InsightsResult<()> {
            std::future::pending().await
        }
    }

    fn short() -> Timeouts {
        Timeouts {
            op: Duration::from_millis(50),
            scan: Duration::from_millis(50),
            delete: Duration::from_millis(50),
        }
    }

    #[tokio::test]
    async fn test_hanging_backend_is_abandoned() {
        let guard = BoundedBackend::new(Arc::new(HangingBackend), short());
        let started = Instant::now();
        assert!(guard.get("k").await.is_none());
        assert!(!guard.setex("k", 1, "v").await);
        assert!(!guard.del("k").await);
        assert_eq!(guard.delete_matching("analytics:*").await, 0);
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_elapsed_limit_becomes_timeout_error() {
        let err = elapsed(Duration::from_millis(50));
        assert!(matches!(err, InsightsError::Timeout(50)));
        assert_eq!(err.to_string(), "Operation timed out after 50ms");
    }

    #[tokio::test]
    async fn test_failing_backend_is_absorbed() {
        let backend = Arc::new(MemoryBackend::new());
        backend.set_failing(true);
        let guard = BoundedBackend::new(backend, short());
        assert!(guard.get("k").await.is_none());
        assert!(!guard.setex("k", 1, "v").await);
        assert_eq!(guard.delete_matching("*").await, 0);
    }

    #[tokio::test]
    async fn test_delete_matching_removes_only_matches() {
        let backend = Arc::new(MemoryBackend::new());
        backend.insert_raw("analytics:daily:2026-01-01", "{}");
        backend.insert_raw("analytics:daily:2026-01-02", "{}");
        backend.insert_raw("analytics:monthly:2026-01", "{}");
        let guard = BoundedBackend::new(backend.clone(), short());

        assert_eq!(guard.delete_matching("analytics:daily:*").await, 2);
        assert_eq!(backend.len(), 1);
        assert!(backend.raw("analytics:monthly:2026-01").is_some());
    }
}
