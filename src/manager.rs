use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::engine::InvalidationEngine;
use crate::error::CacheResult;
use crate::keys::{format_entity_key, QueryDescriptor};
use crate::traits::Entity;

/// How long a result may stay cached
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Ttl {
    /// Let the cache provider decide
    #[default]
    ProviderDefault,
    Expire(Duration),
    /// Bypass caching and registration for this call
    NoCache,
}

impl Ttl {
    fn as_duration(&self) -> Option<Duration> {
        match self {
            Ttl::Expire(ttl) => Some(*ttl),
            Ttl::ProviderDefault | Ttl::NoCache => None,
        }
    }
}

/// The persistence layer queries are executed against on a cache miss
#[async_trait]
pub trait PersistenceLayer: Send + Sync {
    type Entity: Entity + Serialize + DeserializeOwned + Send + Sync;

    async fn execute(&self, query: &QueryDescriptor) -> CacheResult<Vec<Self::Entity>>;
}

/// Runs queries through the cache and registers fresh results with the
/// invalidation engine, so that entity changes evict them.
pub struct CachedEntityManager<P: PersistenceLayer> {
    persistence: Arc<P>,
    cache: Arc<InvalidationEngine>,
}

impl<P: PersistenceLayer> CachedEntityManager<P> {
    pub fn new(persistence: Arc<P>, cache: Arc<InvalidationEngine>) -> Self {
        Self { persistence, cache }
    }

    pub fn cache(&self) -> &Arc<InvalidationEngine> {
        &self.cache
    }

    pub fn query_cache_key(&self, query: &QueryDescriptor) -> String {
        self.cache.keys().query_key(query)
    }

    pub async fn has(&self, key: &str) -> CacheResult<bool> {
        self.cache.has(key).await
    }

    /// Looks up a single entity by id, caching it under its entity key so
    /// that invalidating the entity also evicts this lookup.
    ///
    /// Only found entities are cached: a cached miss would survive the
    /// entity's creation, which invalidates the class key only.
    pub async fn find(
        &self,
        type_name: &str,
        id: &str,
        ttl: Ttl,
    ) -> CacheResult<Option<P::Entity>> {
        let query = QueryDescriptor::new(format!("SELECT x FROM {type_name} x WHERE x.id = :id"))
            .with_parameter("id", id);

        if ttl == Ttl::NoCache {
            return Ok(self.persistence.execute(&query).await?.into_iter().next());
        }

        let key = format_entity_key(&self.cache.keys().entity_class_key(type_name)?, id);
        let provider = self.cache.cache_provider();
        if let Some(value) = provider.get(&key).await? {
            debug!("CachedEntityManager: Cache hit for '{}'", key);
            return Ok(Some(serde_json::from_value(value)?));
        }

        let epoch = self.cache.epoch();
        let found = self.persistence.execute(&query).await?.into_iter().next();
        if let Some(entity) = &found {
            provider
                .set(&key, serde_json::to_value(entity)?, ttl.as_duration())
                .await?;
            self.discard_if_invalidated(&key, epoch).await?;
        }
        Ok(found)
    }

    /// Executes `query` through the cache.
    ///
    /// On a miss the result is registered under the class of its first
    /// entity and under every entity it contains, then stored under `key`
    /// (or the derived query key). Empty results are not cached since nothing would
    /// ever invalidate them.
    pub async fn query(
        &self,
        query: &QueryDescriptor,
        ttl: Ttl,
        key: Option<&str>,
    ) -> CacheResult<Vec<P::Entity>> {
        if ttl == Ttl::NoCache {
            return self.persistence.execute(query).await;
        }

        let key = match key {
            Some(key) => key.to_string(),
            None => self.query_cache_key(query),
        };
        let provider = self.cache.cache_provider();
        if let Some(value) = provider.get(&key).await? {
            debug!("CachedEntityManager: Cache hit for query '{}'", key);
            return Ok(serde_json::from_value(value)?);
        }

        let epoch = self.cache.epoch();
        let results = self.persistence.execute(query).await?;
        if let Some(first) = results.first() {
            // every stored key is registered first
            self.cache.register_query_for_entity(first, &key).await?;
            for entity in &results {
                self.cache.register_query_result(entity, &key).await?;
            }

            provider
                .set(&key, serde_json::to_value(&results)?, ttl.as_duration())
                .await?;
            self.discard_if_invalidated(&key, epoch).await?;
        }
        Ok(results)
    }

    /// Drops a freshly stored key when an invalidation overlapped its population
    async fn discard_if_invalidated(&self, key: &str, epoch: u64) -> CacheResult<()> {
        if self.cache.epoch() != epoch {
            debug!(
                "CachedEntityManager: Invalidation raced with population of '{}', discarding",
                key
            );
            self.cache.cache_provider().delete(key).await?;
        }
        Ok(())
    }
}
