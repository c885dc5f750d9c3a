use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Deserialize;

use crate::error::CacheResult;
use crate::provider::{CacheProvider, CachedValue, ListStore};

/// Eviction policy for the cache
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum EvictionPolicy {
    /// Least Recently Used - evicts the least recently accessed entry
    LRU,
    /// First In First Out - evicts the oldest entry
    FIFO,
}

/// Statistics for cache operations
#[derive(Debug, Default)]
pub struct CacheStatistics {
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    invalidations: AtomicU64,
}

impl CacheStatistics {
    /// Get the number of cache hits
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    /// Get the number of cache misses
    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    /// Get the number of entries evicted for capacity or expiry
    pub fn evictions(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }

    /// Get the number of explicit deletions
    pub fn invalidations(&self) -> u64 {
        self.invalidations.load(Ordering::Relaxed)
    }

    /// Calculate the cache hit rate (hits / (hits + misses))
    pub fn hit_rate(&self) -> f64 {
        let hits = self.hits();
        let total = hits + self.misses();
        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }

    fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    fn record_eviction(&self) {
        self.evictions.fetch_add(1, Ordering::Relaxed);
    }

    fn record_invalidation(&self) {
        self.invalidations.fetch_add(1, Ordering::Relaxed);
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    value: CachedValue,
    expires_at: Option<DateTime<Utc>>,
}

impl CacheEntry {
    fn new(value: CachedValue, ttl: Option<Duration>) -> Self {
        let expires_at = ttl
            .and_then(|ttl| chrono::Duration::from_std(ttl).ok())
            .and_then(|ttl| Utc::now().checked_add_signed(ttl));
        Self { value, expires_at }
    }

    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires_at| now >= expires_at)
    }
}

/// Configuration for MemoryCacheProvider
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    /// Maximum number of entries in the cache
    pub cache_size: usize,
    /// Eviction policy to use when cache is full
    pub eviction_policy: EvictionPolicy,
    /// TTL applied when `set` is called without one
    #[serde(default)]
    pub default_ttl: Option<Duration>,
}

impl CacheConfig {
    /// Create a new cache configuration
    pub fn new(cache_size: usize, eviction_policy: EvictionPolicy) -> Self {
        Self {
            cache_size,
            eviction_policy,
            default_ttl: None,
        }
    }

    /// Set the TTL for entries stored without an explicit one
    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = Some(ttl);
        self
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self::new(10_000, EvictionPolicy::LRU)
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    entries: HashMap<String, CacheEntry>,
    /// Access order tracking (for LRU and FIFO)
    access_order: VecDeque<String>,
    lists: HashMap<String, Vec<String>>,
}

impl MemoryState {
    fn forget(&mut self, key: &str) -> Option<CacheEntry> {
        self.access_order.retain(|k| k != key);
        self.entries.remove(key)
    }

    fn touch(&mut self, key: &str) {
        self.access_order.retain(|k| k != key);
        self.access_order.push_back(key.to_string());
    }
}

/// An in-process backend implementing both the cache provider and the list store.
///
/// Every operation runs under a single lock, so list appends are atomic and
/// concurrent registrations never lose updates.
#[derive(Debug)]
pub struct MemoryCacheProvider {
    state: Mutex<MemoryState>,
    config: CacheConfig,
    statistics: CacheStatistics,
}

impl MemoryCacheProvider {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            state: Mutex::new(MemoryState::default()),
            config,
            statistics: CacheStatistics::default(),
        }
    }

    /// Returns the number of cached entries, lists excluded
    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().entries.is_empty()
    }

    /// Returns the number of lists currently stored
    pub fn list_count(&self) -> usize {
        self.state.lock().lists.len()
    }

    pub fn statistics(&self) -> &CacheStatistics {
        &self.statistics
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Removes every expired entry and returns how many were dropped
    pub fn evict_expired(&self) -> usize {
        let now = Utc::now();
        let mut state = self.state.lock();
        let expired: Vec<String> = state
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired {
            state.forget(key);
            self.statistics.record_eviction();
        }
        expired.len()
    }

    fn get_entry(&self, key: &str) -> Option<CachedValue> {
        let mut state = self.state.lock();
        let expired = match state.entries.get(key) {
            Some(entry) => entry.is_expired(Utc::now()),
            None => {
                self.statistics.record_miss();
                return None;
            }
        };

        if expired {
            state.forget(key);
            self.statistics.record_eviction();
            self.statistics.record_miss();
            return None;
        }

        if self.config.eviction_policy == EvictionPolicy::LRU {
            state.touch(key);
        }
        self.statistics.record_hit();
        state.entries.get(key).map(|entry| entry.value.clone())
    }

    fn set_entry(&self, key: &str, value: CachedValue, ttl: Option<Duration>) {
        let entry = CacheEntry::new(value, ttl.or(self.config.default_ttl));
        let mut state = self.state.lock();

        if state.entries.contains_key(key) {
            state.entries.insert(key.to_string(), entry);
            if self.config.eviction_policy == EvictionPolicy::LRU {
                state.touch(key);
            }
            return;
        }

        while state.entries.len() >= self.config.cache_size {
            // LRU keeps the least recently used key at the front, FIFO the oldest
            let Some(evicted) = state.access_order.pop_front() else {
                break;
            };
            state.entries.remove(&evicted);
            self.statistics.record_eviction();
            tracing::debug!("MemoryCacheProvider: Evicted '{}' at capacity", evicted);
        }

        state.entries.insert(key.to_string(), entry);
        state.access_order.push_back(key.to_string());
    }
}

impl Default for MemoryCacheProvider {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

#[async_trait]
impl CacheProvider for MemoryCacheProvider {
    async fn get(&self, key: &str) -> CacheResult<Option<CachedValue>> {
        Ok(self.get_entry(key))
    }

    async fn set(&self, key: &str, value: CachedValue, ttl: Option<Duration>) -> CacheResult<()> {
        self.set_entry(key, value, ttl);
        Ok(())
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        if self.state.lock().forget(key).is_some() {
            self.statistics.record_invalidation();
        }
        Ok(())
    }

    async fn contains(&self, key: &str) -> CacheResult<bool> {
        let now = Utc::now();
        Ok(self
            .state
            .lock()
            .entries
            .get(key)
            .is_some_and(|entry| !entry.is_expired(now)))
    }

    async fn clear(&self) -> CacheResult<()> {
        let mut state = self.state.lock();
        state.entries.clear();
        state.access_order.clear();
        Ok(())
    }
}

#[async_trait]
impl ListStore for MemoryCacheProvider {
    async fn append_to_list(&self, list_id: &str, value: &str) -> CacheResult<()> {
        let mut state = self.state.lock();
        let list = state.lists.entry(list_id.to_string()).or_default();
        if !list.iter().any(|item| item == value) {
            list.push(value.to_string());
        }
        Ok(())
    }

    async fn get_list_items(&self, list_id: &str) -> CacheResult<Vec<String>> {
        Ok(self
            .state
            .lock()
            .lists
            .get(list_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn remove_from_list(&self, list_id: &str, value: &str) -> CacheResult<()> {
        let mut state = self.state.lock();
        if let Some(list) = state.lists.get_mut(list_id) {
            list.retain(|item| item != value);
            if list.is_empty() {
                state.lists.remove(list_id);
            }
        }
        Ok(())
    }

    async fn delete_list(&self, list_id: &str) -> CacheResult<()> {
        self.state.lock().lists.remove(list_id);
        Ok(())
    }

    async fn clear_lists(&self) -> CacheResult<()> {
        self.state.lock().lists.clear();
        Ok(())
    }
}
