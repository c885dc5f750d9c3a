pub mod entities;
pub mod persistence;
pub mod providers;

#[allow(unused_imports)]
pub use entities::{Product, User, UserProxy};
#[allow(unused_imports)]
pub use persistence::{InMemoryPersistence, InvalidatingPersistence};
#[allow(unused_imports)]
pub use providers::{FlakyProvider, RejectingLists};

use std::sync::Arc;

use postgres_query_cache::{InvalidationEngine, KeyDeriver, MemoryCacheProvider, NamespaceRegistry};

/// Builds an engine over a fresh memory backend, with the `Model` alias
/// pointing at `app::model`
#[allow(dead_code)]
pub fn memory_engine() -> (Arc<MemoryCacheProvider>, Arc<InvalidationEngine>) {
    let store = Arc::new(MemoryCacheProvider::default());
    let namespaces = NamespaceRegistry::new();
    namespaces.add_entity_namespace("Model", "app::model");
    let engine = Arc::new(InvalidationEngine::new(
        KeyDeriver::new(Arc::new(namespaces)),
        store.clone(),
        store.clone(),
    ));
    (store, engine)
}
