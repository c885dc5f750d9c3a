use std::sync::Arc;

use tracing::debug;

use crate::error::CacheResult;
use crate::provider::ListStore;

/// Prefix of the list ids holding registrations
pub const REGISTRATION_LIST_PREFIX: &str = "registered";

/// Reverse index from an index key (entity key or entity class key)
/// to the query cache keys whose results depend on it.
#[derive(Clone)]
pub struct RegistrationIndex {
    lists: Arc<dyn ListStore>,
}

impl RegistrationIndex {
    pub fn new(lists: Arc<dyn ListStore>) -> Self {
        Self { lists }
    }

    /// Returns the list id under which registrations for `index_key` are stored
    pub fn list_id(index_key: &str) -> String {
        format!("{REGISTRATION_LIST_PREFIX}:{index_key}")
    }

    /// Records that `cache_key` depends on `index_key`
    pub async fn register(&self, index_key: &str, cache_key: &str) -> CacheResult<()> {
        debug!("RegistrationIndex: Registering '{}' under '{}'", cache_key, index_key);
        self.lists
            .append_to_list(&Self::list_id(index_key), cache_key)
            .await
    }

    /// Returns the cache keys registered under `index_key`
    pub async fn registered_keys(&self, index_key: &str) -> CacheResult<Vec<String>> {
        self.lists.get_list_items(&Self::list_id(index_key)).await
    }

    /// Drops a single registration, leaving the rest of the list intact
    pub async fn unregister(&self, index_key: &str, cache_key: &str) -> CacheResult<()> {
        self.lists
            .remove_from_list(&Self::list_id(index_key), cache_key)
            .await
    }

    /// Deletes the whole registration list for `index_key`
    pub async fn delete(&self, index_key: &str) -> CacheResult<()> {
        self.lists.delete_list(&Self::list_id(index_key)).await
    }

    /// Deletes every registration list
    pub async fn clear(&self) -> CacheResult<()> {
        self.lists.clear_lists().await
    }
}
