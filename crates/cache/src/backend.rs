//! Contract of the distributed cache tier.
//!
//! Any key-value store offering `get`/`setex`/`del`/`keys` and a batched
//! delete can back the metrics cache.

use crate::pattern::GlobPattern;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use storefront_core::{InsightsError, InsightsResult};

#[async_trait]
pub trait DistributedBackend: Send + Sync {
    async fn get(&self, key: &str) -> InsightsResult<Option<String>>;

    async fn setex(&self, key: &str, ttl_secs: u64, value: &str) -> InsightsResult<()>;

    async fn del(&self, key: &str) -> InsightsResult<()>;

    /// Keys matching a `*`-glob.
    async fn keys(&self, pattern: &str) -> InsightsResult<Vec<String>>;

    /// Delete a batch of keys in one round trip.
    async fn del_many(&self, keys: &[String]) -> InsightsResult<()>;
}

/// Process-local backend for tests and single-node development.
/// Can be switched into a failing state to simulate an outage.
#[derive(Default)]
pub struct MemoryBackend {
    entries: Mutex<HashMap<String, String>>,
    failing: AtomicBool,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn raw(&self, key: &str) -> Option<String> {
        self.entries.lock().get(key).cloned()
    }

    pub fn insert_raw(&self, key: &str, value: &str) {
        self.entries.lock().insert(key.to_string(), value.to_string());
    }

    fn check(&self) -> InsightsResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            Err(InsightsError::Cache("memory backend unavailable".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl DistributedBackend for MemoryBackend {
    async fn get(&self, key: &str) -> InsightsResult<Option<String>> {
        self.check()?;
        Ok(self.entries.lock().get(key).cloned())
    }

    async fn setex(&self, key: &str, _ttl_secs: u64, value: &str) -> InsightsResult<()> {
        self.check()?;
        self.entries.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn del(&self, key: &str) -> InsightsResult<()> {
        self.check()?;
        self.entries.lock().remove(key);
        Ok(())
    }

    async fn keys(&self, pattern: &str) -> InsightsResult<Vec<String>> {
        self.check()?;
        let glob = GlobPattern::new(pattern)?;
        let mut keys: Vec<String> = self
            .entries
            .lock()
            .keys()
            .filter(|k| glob.matches(k))
            .cloned()
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn del_many(&self, keys: &[String]) -> InsightsResult<()> {
        self.check()?;
        let mut entries = self.entries.lock();
        for key in keys {
            entries.remove(key);
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_backend_basic_ops() {
        let backend = MemoryBackend::new();
        backend.setex("analytics:daily:a", 60, "1").await.unwrap();
        backend.setex("analytics:daily:b", 60, "2").await.unwrap();
        backend.setex("analytics:monthly:c", 60, "3").await.unwrap();

        assert_eq!(backend.get("analytics:daily:a").await.unwrap().as_deref(), Some("1"));
        let keys = backend.keys("analytics:daily:*").await.unwrap();
        assert_eq!(keys, vec!["analytics:daily:a", "analytics:daily:b"]);

        backend.del_many(&keys).await.unwrap();
        assert_eq!(backend.len(), 1);
        backend.del("analytics:monthly:c").await.unwrap();
        assert!(backend.is_empty());
    }

    #[tokio::test]
    async fn test_memory_backend_failing_mode() {
        let backend = MemoryBackend::new();
        backend.set_failing(true);
        assert!(backend.get("k").await.is_err());
        assert!(backend.setex("k", 1, "v").await.is_err());
        backend.set_failing(false);
        assert!(backend.get("k").await.unwrap().is_none());
    }
}
