use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use postgres_query_cache::{
    CacheResult, Entity, InvalidationEngine, PersistenceLayer, QueryDescriptor,
};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// A table of rows queried by equality on every bound parameter.
/// Counts executions so tests can tell cache hits from misses.
pub struct InMemoryPersistence<E> {
    rows: RwLock<Vec<E>>,
    executions: AtomicUsize,
}

#[allow(dead_code)]
impl<E: Clone> InMemoryPersistence<E> {
    pub fn new(rows: Vec<E>) -> Self {
        Self {
            rows: RwLock::new(rows),
            executions: AtomicUsize::new(0),
        }
    }

    pub fn insert(&self, row: E) {
        self.rows.write().push(row);
    }

    pub fn executions(&self) -> usize {
        self.executions.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl<E> PersistenceLayer for InMemoryPersistence<E>
where
    E: Entity + Serialize + DeserializeOwned + Clone + Send + Sync,
{
    type Entity = E;

    async fn execute(&self, query: &QueryDescriptor) -> CacheResult<Vec<E>> {
        self.executions.fetch_add(1, Ordering::SeqCst);
        let rows = self.rows.read().clone();

        let mut matching = Vec::new();
        for row in rows {
            let value = serde_json::to_value(&row)?;
            let matches = query
                .parameters
                .iter()
                .all(|(name, expected)| value.get(name) == Some(expected));
            if matches {
                matching.push(row);
            }
        }

        let first = query.first_result.unwrap_or(0) as usize;
        let max = query.max_results.map_or(usize::MAX, |max| max as usize);
        Ok(matching.into_iter().skip(first).take(max).collect())
    }
}

/// Wraps `InMemoryPersistence` and invalidates `index_key` while every query
/// is in flight, as a concurrent writer would
pub struct InvalidatingPersistence<E> {
    rows: InMemoryPersistence<E>,
    engine: Arc<InvalidationEngine>,
    index_key: String,
}

#[allow(dead_code)]
impl<E: Clone> InvalidatingPersistence<E> {
    pub fn new(rows: Vec<E>, engine: Arc<InvalidationEngine>, index_key: &str) -> Self {
        Self {
            rows: InMemoryPersistence::new(rows),
            engine,
            index_key: index_key.to_string(),
        }
    }

    pub fn executions(&self) -> usize {
        self.rows.executions()
    }
}

#[async_trait]
impl<E> PersistenceLayer for InvalidatingPersistence<E>
where
    E: Entity + Serialize + DeserializeOwned + Clone + Send + Sync,
{
    type Entity = E;

    async fn execute(&self, query: &QueryDescriptor) -> CacheResult<Vec<E>> {
        let rows = self.rows.execute(query).await?;
        self.engine.invalidate(&self.index_key).await?;
        Ok(rows)
    }
}
