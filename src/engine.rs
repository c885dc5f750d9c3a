//! The invalidation engine keeps the cache provider and the registration
//! index consistent.
//!
//! Query results are registered under the entity key of every entity they
//! contain and under the class key of their entity type. Invalidating an
//! entity deletes its own cache entry, every query registered under its entity
//! key, and then the registration list itself. Invalidating a class does the
//! same through the class key.
//!
//! A registration racing with an invalidation of the same index key is not
//! ordered by the backend. The engine bumps an epoch before and after every
//! cascade so callers that populate the cache can detect the overlap and drop
//! what they just stored; see [`InvalidationEngine::epoch`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures::future::join_all;
use tracing::{debug, error};

use crate::error::{CacheError, CacheResult};
use crate::keys::KeyDeriver;
use crate::provider::{CacheProvider, ListStore};
use crate::registration::RegistrationIndex;
use crate::traits::{ClassRef, Entity};

pub struct InvalidationEngine {
    keys: KeyDeriver,
    cache: Arc<dyn CacheProvider>,
    index: RegistrationIndex,
    epoch: AtomicU64,
}

impl InvalidationEngine {
    pub fn new(keys: KeyDeriver, cache: Arc<dyn CacheProvider>, lists: Arc<dyn ListStore>) -> Self {
        Self {
            keys,
            cache,
            index: RegistrationIndex::new(lists),
            epoch: AtomicU64::new(0),
        }
    }

    pub fn keys(&self) -> &KeyDeriver {
        &self.keys
    }

    pub fn cache_provider(&self) -> &Arc<dyn CacheProvider> {
        &self.cache
    }

    /// Returns a counter that changes whenever an invalidation or clear starts or ends.
    ///
    /// Sample it before executing a query and compare after storing and
    /// registering the result: if it moved, the stored result may have missed
    /// an invalidation and should be deleted.
    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    /// Checks if the cache provider holds `key`
    pub async fn has(&self, key: &str) -> CacheResult<bool> {
        self.cache.contains(key).await
    }

    /// Registers `cache_key` as depending on `index_key`
    pub async fn register(&self, index_key: &str, cache_key: &str) -> CacheResult<()> {
        self.index.register(index_key, cache_key).await
    }

    /// Registers a query whose result contains `entity`
    pub async fn register_query_result(&self, entity: &dyn Entity, query_key: &str) -> CacheResult<()> {
        let entity_key = self.keys.entity_key(entity)?;
        self.register(&entity_key, query_key).await
    }

    /// Registers a query whose result contains entities of the given class
    pub async fn register_query_for_entity<'a>(
        &self,
        class: impl Into<ClassRef<'a>>,
        query_key: &str,
    ) -> CacheResult<()> {
        let class_key = self.keys.entity_class_key(class)?;
        self.register(&class_key, query_key).await
    }

    /// Returns the cache keys registered under an entity or class key
    pub async fn registered_keys(&self, index_key: &str) -> CacheResult<Vec<String>> {
        self.index.registered_keys(index_key).await
    }

    /// Deletes the entry at `index_key`, every entry registered under it, and
    /// finally the registration list.
    ///
    /// If some registered entries cannot be deleted the list is kept, so a
    /// retry (or a full `clear`) can finish the cascade, and
    /// `CacheError::PartialInvalidation` names the keys that survived.
    pub async fn invalidate(&self, index_key: &str) -> CacheResult<()> {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        let result = self.cascade(index_key).await;
        self.epoch.fetch_add(1, Ordering::SeqCst);
        result
    }

    async fn cascade(&self, index_key: &str) -> CacheResult<()> {
        self.cache.delete(index_key).await?;

        let registered = self.index.registered_keys(index_key).await?;
        let results = join_all(registered.iter().map(|key| self.cache.delete(key))).await;

        let failed: Vec<String> = registered
            .iter()
            .zip(results)
            .filter_map(|(key, result)| match result {
                Ok(()) => None,
                Err(e) => {
                    error!("InvalidationEngine: Failed to delete '{}' registered under '{}': {}", key, index_key, e);
                    Some(key.clone())
                }
            })
            .collect();

        if !failed.is_empty() {
            return Err(CacheError::PartialInvalidation {
                index_key: index_key.to_string(),
                failed,
            });
        }

        self.index.delete(index_key).await?;
        debug!(
            "InvalidationEngine: Invalidated '{}' and {} registered key(s)",
            index_key,
            registered.len()
        );
        Ok(())
    }

    /// Invalidates a single entity and every query whose result contained it
    pub async fn invalidate_entity(&self, entity: &dyn Entity) -> CacheResult<()> {
        let entity_key = self.keys.entity_key(entity)?;
        self.invalidate(&entity_key).await
    }

    /// Invalidates every query registered for the entity's class
    pub async fn invalidate_entity_queries<'a>(&self, class: impl Into<ClassRef<'a>>) -> CacheResult<()> {
        let class_key = self.keys.entity_class_key(class)?;
        self.invalidate(&class_key).await
    }

    /// Flushes the cache provider and every registration list
    pub async fn clear(&self) -> CacheResult<()> {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        let result = async {
            self.cache.clear().await?;
            self.index.clear().await
        }
        .await;
        self.epoch.fetch_add(1, Ordering::SeqCst);
        debug!("InvalidationEngine: Cleared cache and registration index");
        result
    }
}
