use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use crate::error::CacheResult;
use crate::memory::MemoryCacheProvider;
use crate::provider::{CacheProvider, CachedValue, ListStore};

/// A locally held value and the instant the backend stops serving it
#[derive(Debug, Clone)]
struct MemoEntry {
    value: CachedValue,
    expires_at: Option<DateTime<Utc>>,
}

impl MemoEntry {
    fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map_or(true, |expires_at| now < expires_at)
    }
}

/// Local memo in front of a (possibly remote) provider.
///
/// Only values written through this wrapper are memoized, each with the
/// deadline the backend applies to it: the explicit TTL, else the backend's
/// default TTL given to `with_default_ttl`. Values fetched with `get` are
/// not memoized, since their remaining lifetime on the backend is unknown.
/// `delete` and `clear` drop the memo together with the backend entry.
/// List operations pass straight through.
pub struct LocalMemoCache<P> {
    inner: Arc<P>,
    default_ttl: Option<Duration>,
    memo: RwLock<HashMap<String, MemoEntry>>,
}

impl<P> LocalMemoCache<P> {
    pub fn new(inner: Arc<P>) -> Self {
        Self {
            inner,
            default_ttl: None,
            memo: RwLock::new(HashMap::new()),
        }
    }

    /// Declares the TTL the backend applies to values stored without one
    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = Some(ttl);
        self
    }

    /// Checks if a live value for `key` is held locally
    pub fn is_memoized(&self, key: &str) -> bool {
        self.memoized(key).is_some()
    }

    pub fn inner(&self) -> &Arc<P> {
        &self.inner
    }

    fn memoized(&self, key: &str) -> Option<CachedValue> {
        let now = Utc::now();
        if let Some(entry) = self.memo.read().get(key) {
            if entry.is_live(now) {
                return Some(entry.value.clone());
            }
        } else {
            return None;
        }
        self.memo.write().remove(key);
        None
    }
}

impl LocalMemoCache<MemoryCacheProvider> {
    /// Wraps a memory backend, picking up its configured default TTL
    pub fn over_memory(inner: Arc<MemoryCacheProvider>) -> Self {
        let default_ttl = inner.config().default_ttl;
        Self {
            default_ttl,
            ..Self::new(inner)
        }
    }
}

#[async_trait]
impl<P: CacheProvider> CacheProvider for LocalMemoCache<P> {
    async fn get(&self, key: &str) -> CacheResult<Option<CachedValue>> {
        if let Some(value) = self.memoized(key) {
            return Ok(Some(value));
        }
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: CachedValue, ttl: Option<Duration>) -> CacheResult<()> {
        // taken before the backend write so the memo never outlives the backend entry
        let expires_at = ttl
            .or(self.default_ttl)
            .and_then(|ttl| chrono::Duration::from_std(ttl).ok())
            .and_then(|ttl| Utc::now().checked_add_signed(ttl));

        if let Err(e) = self.inner.set(key, value.clone(), ttl).await {
            self.memo.write().remove(key);
            return Err(e);
        }
        self.memo
            .write()
            .insert(key.to_string(), MemoEntry { value, expires_at });
        Ok(())
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        self.memo.write().remove(key);
        self.inner.delete(key).await
    }

    async fn contains(&self, key: &str) -> CacheResult<bool> {
        if self.is_memoized(key) {
            return Ok(true);
        }
        self.inner.contains(key).await
    }

    async fn clear(&self) -> CacheResult<()> {
        self.memo.write().clear();
        self.inner.clear().await
    }
}

#[async_trait]
impl<P: ListStore> ListStore for LocalMemoCache<P> {
    async fn append_to_list(&self, list_id: &str, value: &str) -> CacheResult<()> {
        self.inner.append_to_list(list_id, value).await
    }

    async fn get_list_items(&self, list_id: &str) -> CacheResult<Vec<String>> {
        self.inner.get_list_items(list_id).await
    }

    async fn remove_from_list(&self, list_id: &str, value: &str) -> CacheResult<()> {
        self.inner.remove_from_list(list_id, value).await
    }

    async fn delete_list(&self, list_id: &str) -> CacheResult<()> {
        self.inner.delete_list(list_id).await
    }

    async fn clear_lists(&self) -> CacheResult<()> {
        self.inner.clear_lists().await
    }
}
