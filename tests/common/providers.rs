use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use postgres_query_cache::{
    CacheError, CacheProvider, CacheResult, CachedValue, ListStore, MemoryCacheProvider,
};

/// A cache provider whose deletes fail for selected keys, standing in for a
/// backend with connectivity trouble
pub struct FlakyProvider {
    inner: Arc<MemoryCacheProvider>,
    failing: RwLock<HashSet<String>>,
}

#[allow(dead_code)]
impl FlakyProvider {
    pub fn new(inner: Arc<MemoryCacheProvider>) -> Self {
        Self {
            inner,
            failing: RwLock::new(HashSet::new()),
        }
    }

    pub fn fail_deletes_of(&self, key: &str) {
        self.failing.write().insert(key.to_string());
    }

    pub fn recover(&self) {
        self.failing.write().clear();
    }
}

#[async_trait]
impl CacheProvider for FlakyProvider {
    async fn get(&self, key: &str) -> CacheResult<Option<CachedValue>> {
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: CachedValue, ttl: Option<Duration>) -> CacheResult<()> {
        self.inner.set(key, value, ttl).await
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        if self.failing.read().contains(key) {
            return Err(CacheError::Backend(format!("timed out deleting {key}")));
        }
        self.inner.delete(key).await
    }

    async fn contains(&self, key: &str) -> CacheResult<bool> {
        self.inner.contains(key).await
    }

    async fn clear(&self) -> CacheResult<()> {
        self.inner.clear().await
    }
}

/// A list store whose appends always fail, standing in for a backend that
/// accepts plain writes but rejects list updates
pub struct RejectingLists {
    inner: Arc<MemoryCacheProvider>,
}

#[allow(dead_code)]
impl RejectingLists {
    pub fn new(inner: Arc<MemoryCacheProvider>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl ListStore for RejectingLists {
    async fn append_to_list(&self, list_id: &str, _value: &str) -> CacheResult<()> {
        Err(CacheError::Backend(format!("list {list_id} is read-only")))
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
