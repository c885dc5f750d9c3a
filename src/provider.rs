use std::time::Duration;

use async_trait::async_trait;

use crate::error::CacheResult;

/// Values are opaque to the engine; hosts choose what they store.
pub type CachedValue = serde_json::Value;

/// A flat key-value store holding cached entities and query results
#[async_trait]
pub trait CacheProvider: Send + Sync {
    /// Returns the value stored under `key`, if present and not expired
    async fn get(&self, key: &str) -> CacheResult<Option<CachedValue>>;

    /// Stores `value` under `key`. `None` means no expiry beyond the provider default.
    async fn set(&self, key: &str, value: CachedValue, ttl: Option<Duration>) -> CacheResult<()>;

    /// Deletes `key`. Deleting an absent key is not an error.
    async fn delete(&self, key: &str) -> CacheResult<()>;

    async fn contains(&self, key: &str) -> CacheResult<bool>;

    /// Removes every entry
    async fn clear(&self) -> CacheResult<()>;
}

/// A store of string lists, used for the registration index
#[async_trait]
pub trait ListStore: Send + Sync {
    /// Appends `value` to the list, creating the list if needed
    async fn append_to_list(&self, list_id: &str, value: &str) -> CacheResult<()>;

    /// Returns the list members, or an empty vector if the list does not exist
    async fn get_list_items(&self, list_id: &str) -> CacheResult<Vec<String>>;

    async fn remove_from_list(&self, list_id: &str, value: &str) -> CacheResult<()>;

    /// Removes the list entirely
    async fn delete_list(&self, list_id: &str) -> CacheResult<()>;

    /// Removes every list
    async fn clear_lists(&self) -> CacheResult<()>;
}
