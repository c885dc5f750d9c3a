//! # Postgres Query Cache
//!
//! This crate caches read-query results in front of a persistence layer and
//! evicts exactly the cached entries that depend on an entity when that
//! entity changes.
//!
//! ## Key Components
//!
//! - `KeyDeriver`: Stable keys for entities, entity classes and queries
//! - `RegistrationIndex`: Reverse index from entity/class keys to query keys
//! - `InvalidationEngine`: Registers query results and cascades invalidations
//! - `CachedEntityManager`: Runs queries through the cache and registers fresh results
//! - `LifecycleNotifier` and `InvalidationListener`: Map entity lifecycle events to invalidations
//! - `TransactionAwareInvalidator`: Defers invalidations until commit (`TransactionAware` from postgres-unit-of-work)
//! - `CacheNotificationListener`: Bridges PostgreSQL LISTEN/NOTIFY into lifecycle events
//! - `MemoryCacheProvider` and `LocalMemoCache`: In-process backend and a TTL-aware local memo

mod error;
mod traits;
mod keys;
mod provider;
mod memory;
mod local_memo;
mod registration;
mod engine;
mod manager;
mod lifecycle;
mod transaction_aware_invalidator;
mod listener;
#[cfg(feature = "sqlx-listener")]
mod db_init;

pub use error::{CacheError, CacheResult};
pub use traits::{ClassRef, Entity, EntityRef};
pub use keys::{
    format_entity_key, HydrationMode, KeyDeriver, NamespaceRegistry, NamespaceResolver,
    QueryDescriptor, ENTITY_KEY_SEPARATOR,
};
pub use provider::{CacheProvider, CachedValue, ListStore};
pub use memory::{CacheConfig, CacheStatistics, EvictionPolicy, MemoryCacheProvider};
pub use local_memo::LocalMemoCache;
pub use registration::{RegistrationIndex, REGISTRATION_LIST_PREFIX};
pub use engine::InvalidationEngine;
pub use manager::{CachedEntityManager, PersistenceLayer, Ttl};
pub use lifecycle::{
    InvalidationListener, InvalidationScope, LifecycleCallback, LifecycleEvent,
    LifecycleNotifier, LifecyclePolicy,
};
pub use transaction_aware_invalidator::TransactionAwareInvalidator;

// Re-export listener components
pub use listener::{CacheNotificationListener, LifecycleNotification, DEFAULT_LIFECYCLE_CHANNEL};

#[cfg(feature = "sqlx-listener")]
pub use db_init::{attach_lifecycle_trigger, cleanup_lifecycle_triggers, init_lifecycle_triggers};

// Re-export TransactionAware from postgres-unit-of-work for convenience
pub use postgres_unit_of_work::TransactionAware;
