//! In-process cache tier backed by DashMap for lock-free concurrent access.
//! Entries carry their own TTL; expired entries are dropped on read and by
//! opportunistic sweeps, never by LRU eviction.

use crate::pattern::GlobPattern;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use storefront_core::Clock;

/// A cached computation result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry<T> {
    pub data: T,
    /// Creation time, epoch ms.
    pub timestamp: i64,
    /// Seconds.
    pub ttl: u64,
}

impl<T> CacheEntry<T> {
    pub fn new(data: T, timestamp: i64, ttl: u64) -> Self {
        Self {
            data,
            timestamp,
            ttl,
        }
    }

    /// Valid iff `now - timestamp < ttl * 1000`.
    pub fn is_fresh(&self, now_ms: i64) -> bool {
        let ttl_ms = i64::try_from(self.ttl).unwrap_or(i64::MAX / 1000).saturating_mul(1000);
        now_ms.saturating_sub(self.timestamp) < ttl_ms
    }
}

/// Local tier, sized by a soft entry bound that triggers a TTL sweep.
pub struct LocalCache<T> {
    store: DashMap<String, CacheEntry<T>>,
    clock: Arc<dyn Clock>,
    max_entries: usize,
}

impl<T: Clone> LocalCache<T> {
    pub fn new(max_entries: usize, clock: Arc<dyn Clock>) -> Self {
        Self {
            store: DashMap::with_capacity(max_entries),
            clock,
            max_entries,
        }
    }

    /// Returns None if expired or missing; an expired entry is removed.
    pub fn get(&self, key: &str) -> Option<T> {
        let entry = self.store.get(key)?;
        if !entry.is_fresh(self.clock.now_ms()) {
            drop(entry);
            self.store.remove(key);
            return None;
        }
        Some(entry.data.clone())
    }

    /// Insert or replace an entry. Returns how many expired entries the
    /// follow-up sweep removed (0 when the bound was not exceeded).
    pub fn insert(&self, key: String, entry: CacheEntry<T>) -> usize {
        self.store.insert(key, entry);
        if self.store.len() > self.max_entries {
            self.evict_expired()
        } else {
            0
        }
    }

    pub fn remove(&self, key: &str) -> bool {
        self.store.remove(key).is_some()
    }

    pub fn remove_matching(&self, pattern: &GlobPattern) -> usize {
        let before = self.store.len();
        self.store.retain(|key, _| !pattern.matches(key));
        before - self.store.len()
    }

    /// Remove expired entries.
    pub fn evict_expired(&self) -> usize {
        let now = self.clock.now_ms();
        let before = self.store.len();
        self.store.retain(|_, entry| entry.is_fresh(now));
        before - self.store.len()
    }

    pub fn clear(&self) {
        self.store.clear();
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }
}
