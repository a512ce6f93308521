//! Two-tier cache for computed analytics metrics.
//! Distributed tier (L2, optional) is consulted first; the local tier (L1)
//! is the fallback so reads keep working while the distributed tier is down.
//! No method returns an error: caching is best-effort.

use crate::backend::DistributedBackend;
use crate::guard::{BoundedBackend, Timeouts};
use crate::keys;
use crate::local::{CacheEntry, LocalCache};
use crate::pattern::GlobPattern;
use std::sync::Arc;
use storefront_core::config::CacheConfig;
use storefront_core::{AnalyticsMetrics, Clock, Granularity, MetricsQueryParams};
use tracing::{debug, warn};

pub struct MetricsCache {
    distributed: Option<BoundedBackend>,
    local: LocalCache<AnalyticsMetrics>,
    clock: Arc<dyn Clock>,
    prefix: String,
}

impl MetricsCache {
    /// Cache with only the local tier.
    pub fn local_only(config: &CacheConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            distributed: None,
            local: LocalCache::new(config.local_max_entries, clock.clone()),
            clock,
            prefix: config.key_prefix.clone(),
        }
    }

    /// Cache with a distributed tier in front of the local one.
    pub fn with_distributed(
        config: &CacheConfig,
        backend: Arc<dyn DistributedBackend>,
        timeouts: Timeouts,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            distributed: Some(BoundedBackend::new(backend, timeouts)),
            ..Self::local_only(config, clock)
        }
    }

    pub async fn get(&self, key: &str) -> Option<AnalyticsMetrics> {
        let now = self.clock.now_ms();

        if let Some(remote) = &self.distributed {
            if let Some(raw) = remote.get(key).await {
                match serde_json::from_str::<CacheEntry<AnalyticsMetrics>>(&raw) {
                    Ok(entry) if entry.is_fresh(now) => {
                        metrics::counter!("cache.l2.hit").increment(1);
                        let data = entry.data.clone();
                        self.local.insert(key.to_string(), entry);
                        return Some(data);
                    }
                    Ok(_) => debug!(key = %key, "Distributed cache entry is stale"),
                    Err(e) => warn!(key = %key, error = %e, "Discarding unparseable cache entry"),
                }
            }
            metrics::counter!("cache.l2.miss").increment(1);
        }

        match self.local.get(key) {
            Some(data) => {
                metrics::counter!("cache.l1.hit").increment(1);
                Some(data)
            }
            None => {
                metrics::counter!("cache.l1.miss").increment(1);
                None
            }
        }
    }

    pub async fn set(&self, key: &str, data: &AnalyticsMetrics, ttl_secs: u64) {
        let entry = CacheEntry::new(data.clone(), self.clock.now_ms(), ttl_secs);

        if let Some(remote) = &self.distributed {
            match serde_json::to_string(&entry) {
                Ok(json) => {
                    remote.setex(key, ttl_secs, &json).await;
                }
                Err(e) => warn!(key = %key, error = %e, "Failed to serialize cache entry"),
            }
        }

        let swept = self.local.insert(key.to_string(), entry);
        if swept > 0 {
            debug!(swept, "Local cache sweep removed expired entries");
        }
    }

    pub async fn invalidate(&self, key: &str) {
        if let Some(remote) = &self.distributed {
            remote.del(key).await;
        }
        self.local.remove(key);
    }

    /// Invalidate every key matching a `*`-glob. The local tier is cleared
    /// before the bounded distributed scan starts.
    pub async fn invalidate_pattern(&self, pattern: &str) {
        match GlobPattern::new(pattern) {
            Ok(glob) => {
                let removed = self.local.remove_matching(&glob);
                debug!(pattern = %pattern, removed, "Local cache entries invalidated");
            }
            Err(e) => {
                warn!(pattern = %pattern, error = %e, "Skipping local invalidation");
            }
        }

        if let Some(remote) = &self.distributed {
            remote.delete_matching(pattern).await;
        }
    }

    /// Drop every metrics entry from both tiers.
    pub async fn clear(&self) {
        self.local.clear();
        if let Some(remote) = &self.distributed {
            remote.delete_matching(&format!("{}:*", self.prefix)).await;
        }
    }

    pub fn generate_key(&self, params: &MetricsQueryParams, granularity: Granularity) -> String {
        keys::generate_key(&self.prefix, params, granularity)
    }

    /// TTL for a granularity name; unknown names get the 300s default.
    pub fn get_ttl(&self, granularity: &str) -> u64 {
        keys::ttl_for(granularity)
    }

    /// Periodic sweep of expired local entries.
    pub async fn maintenance(&self) {
        let evicted = self.local.evict_expired();
        if evicted > 0 {
            debug!(evicted = evicted, "Local cache eviction complete");
        }
    }

    pub fn local_len(&self) -> usize {
        self.local.len()
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use async_trait::async_trait;
    use std::time::{Duration, Instant};
    use storefront_core::clock::{manual_clock, ManualClock};
    use storefront_core::InsightsResult;

    const KEY: &str = "analytics:realtime:2026-01-01:2026-01-02";

    fn sample_metrics() -> AnalyticsMetrics {
        let mut m = AnalyticsMetrics::default();
        m.ecommerce.cart_additions = 10;
        m.ecommerce.checkout_completions = 3;
        m.ecommerce.total_revenue = 3000.0;
        m.engagement.unique_sessions = 100;
        m
    }

    fn setup() -> (MetricsCache, Arc<MemoryBackend>, Arc<ManualClock>) {
        let clock = manual_clock(1_767_225_600_000);
        let backend = Arc::new(MemoryBackend::new());
        let cache = MetricsCache::with_distributed(
            &CacheConfig::default(),
            backend.clone(),
            Timeouts {
                op: Duration::from_millis(100),
                scan: Duration::from_millis(100),
                delete: Duration::from_millis(100),
            },
            clock.clone(),
        );
        (cache, backend, clock)
    }

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

    #[tokio::test]
    async fn test_get_after_set_returns_value() {
        let (cache, backend, _) = setup();
        cache.set(KEY, &sample_metrics(), 60).await;

        assert_eq!(cache.get(KEY).await, Some(sample_metrics()));
        let stored = backend.raw(KEY).unwrap();
        assert!(stored.contains("\"data\""));
        assert!(stored.contains("\"ttl\":60"));
    }

    #[tokio::test]
    async fn test_get_after_ttl_returns_none() {
        let (cache, _, clock) = setup();
        cache.set(KEY, &sample_metrics(), 60).await;
        clock.advance_ms(60_000);
        assert_eq!(cache.get(KEY).await, None);
    }

    #[tokio::test]
    async fn test_stale_distributed_entry_is_a_miss() {
        let (cache, backend, clock) = setup();
        let stale = CacheEntry::new(sample_metrics(), clock.now_ms() - 40_000, 30);
        backend.insert_raw(KEY, &serde_json::to_string(&stale).unwrap());
        assert_eq!(cache.get(KEY).await, None);
    }

    #[tokio::test]
    async fn test_distributed_hit_backfills_local() {
        let (cache, backend, clock) = setup();
        let entry = CacheEntry::new(sample_metrics(), clock.now_ms(), 30);
        backend.insert_raw(KEY, &serde_json::to_string(&entry).unwrap());

        assert_eq!(cache.get(KEY).await, Some(sample_metrics()));
        backend.set_failing(true);
        assert_eq!(cache.get(KEY).await, Some(sample_metrics()));
    }

    #[tokio::test]
    async fn test_unparseable_distributed_entry_falls_through() {
        let (cache, backend, _) = setup();
        cache.set(KEY, &sample_metrics(), 30).await;
        backend.insert_raw(KEY, "not json");
        assert_eq!(cache.get(KEY).await, Some(sample_metrics()));
    }

    #[tokio::test]
    async fn test_distributed_outage_falls_back_to_local() {
        let (cache, backend, clock) = setup();
        backend.set_failing(true);
        cache.set(KEY, &sample_metrics(), 30).await;
        clock.advance_ms(1_000);
        assert_eq!(cache.get(KEY).await, Some(sample_metrics()));
        assert!(backend.is_empty());
    }

    #[tokio::test]
    async fn test_invalidate_clears_both_tiers() {
        let (cache, backend, _) = setup();
        cache.set(KEY, &sample_metrics(), 30).await;
        cache.invalidate(KEY).await;
        assert!(backend.raw(KEY).is_none());
        assert_eq!(cache.get(KEY).await, None);
    }

    #[tokio::test]
    async fn test_invalidate_swallows_backend_errors() {
        let (cache, backend, _) = setup();
        cache.set(KEY, &sample_metrics(), 30).await;
        backend.set_failing(true);
        cache.invalidate(KEY).await;
        assert_eq!(cache.local_len(), 0);
    }

    #[tokio::test]
    async fn test_invalidate_pattern_is_selective() {
        let (cache, backend, _) = setup();
        let key1 = "analytics:realtime:2026-01-01:2026-01-02";
        let key2 = "analytics:realtime:2026-01-02:2026-01-03";
        let key3 = "analytics:daily:2026-01-01";
        cache.set(key1, &sample_metrics(), 30).await;
        cache.set(key2, &sample_metrics(), 30).await;
        cache.set(key3, &sample_metrics(), 3600).await;

        cache.invalidate_pattern("analytics:realtime:*").await;

        assert_eq!(cache.get(key1).await, None);
        assert_eq!(cache.get(key2).await, None);
        assert_eq!(cache.get(key3).await, Some(sample_metrics()));
        assert_eq!(backend.len(), 1);
    }

    #[tokio::test]
    async fn test_invalidate_pattern_with_unreachable_tier_is_bounded() {
        let clock = manual_clock(0);
        let cache = MetricsCache::with_distributed(
            &CacheConfig::default(),
            Arc::new(HangingBackend),
            Timeouts::default(),
            clock.clone(),
        );
        // Seed the local tier directly: a hanging setex would also time out.
        cache
            .local
            .insert("analytics:daily:2026-01-01".into(), CacheEntry::new(sample_metrics(), 0, 3600));
        cache
            .local
            .insert("analytics:monthly:2026-01".into(), CacheEntry::new(sample_metrics(), 0, 3600));

        let started = Instant::now();
        cache.invalidate_pattern("analytics:daily:*").await;
        assert!(started.elapsed() < Duration::from_millis(2_500));
        assert_eq!(cache.local_len(), 1);
    }

    #[tokio::test]
    async fn test_local_sweep_over_bound() {
        let (cache, _, clock) = setup();
        for i in 0..100 {
            cache.set(&format!("analytics:realtime:old:{i}"), &sample_metrics(), 30).await;
        }
        clock.advance_ms(31_000);
        for i in 0..5 {
            cache.set(&format!("analytics:realtime:new:{i}"), &sample_metrics(), 30).await;
        }
        assert_eq!(cache.local_len(), 5);
    }

    #[tokio::test]
    async fn test_clear_removes_prefixed_keys() {
        let (cache, backend, _) = setup();
        backend.insert_raw("other:key", "x");
        cache.set("analytics:realtime:key1", &sample_metrics(), 30).await;
        cache.set("analytics:daily:key2", &sample_metrics(), 3600).await;

        cache.clear().await;

        assert_eq!(cache.local_len(), 0);
        assert_eq!(backend.len(), 1);
        assert_eq!(cache.get("analytics:realtime:key1").await, None);
    }

    #[tokio::test]
    async fn test_local_only_cache() {
        let clock = manual_clock(0);
        let cache = MetricsCache::local_only(&CacheConfig::default(), clock.clone());
        cache.set(KEY, &sample_metrics(), 30).await;
        assert_eq!(cache.get(KEY).await, Some(sample_metrics()));
        clock.advance_ms(30_000);
        assert_eq!(cache.get(KEY).await, None);
    }

    #[test]
    fn test_ttl_by_granularity() {
        let cache = MetricsCache::local_only(&CacheConfig::default(), manual_clock(0));
        assert_eq!(cache.get_ttl(Granularity::Realtime.as_str()), 30);
        assert_eq!(cache.get_ttl("daily"), 3600);
        assert_eq!(cache.get_ttl("weekly"), 21600);
        assert_eq!(cache.get_ttl("monthly"), 86400);
        assert_eq!(cache.get_ttl("hourly"), keys::DEFAULT_TTL_SECS);
    }
}
