use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::engine::InvalidationEngine;
use crate::error::CacheResult;
use crate::traits::Entity;

/// Entity lifecycle changes reported by the persistence layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleEvent {
    Created,
    Updated,
    Removed,
}

impl LifecycleEvent {
    pub const ALL: [LifecycleEvent; 3] = [
        LifecycleEvent::Created,
        LifecycleEvent::Updated,
        LifecycleEvent::Removed,
    ];
}

/// Granularity of an invalidation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvalidationScope {
    /// The entity's own key and the queries registered under it
    Entity,
    /// Every query registered under the entity's class
    EntityQueries,
}

/// Which invalidations each lifecycle event triggers.
///
/// The default evicts class queries on creation (new rows may now match),
/// the entity on update, and both on removal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecyclePolicy {
    pub created: Vec<InvalidationScope>,
    pub updated: Vec<InvalidationScope>,
    pub removed: Vec<InvalidationScope>,
}

impl Default for LifecyclePolicy {
    fn default() -> Self {
        Self {
            created: vec![InvalidationScope::EntityQueries],
            updated: vec![InvalidationScope::Entity],
            removed: vec![InvalidationScope::Entity, InvalidationScope::EntityQueries],
        }
    }
}

impl LifecyclePolicy {
    /// A policy that invalidates nothing
    pub fn empty() -> Self {
        Self {
            created: Vec::new(),
            updated: Vec::new(),
            removed: Vec::new(),
        }
    }

    pub fn with_scopes(mut self, event: LifecycleEvent, scopes: Vec<InvalidationScope>) -> Self {
        match event {
            LifecycleEvent::Created => self.created = scopes,
            LifecycleEvent::Updated => self.updated = scopes,
            LifecycleEvent::Removed => self.removed = scopes,
        }
        self
    }

    pub fn scopes(&self, event: LifecycleEvent) -> &[InvalidationScope] {
        match event {
            LifecycleEvent::Created => &self.created,
            LifecycleEvent::Updated => &self.updated,
            LifecycleEvent::Removed => &self.removed,
        }
    }
}

/// A callback invoked synchronously (relative to the notifying caller)
/// for lifecycle events it was registered for
#[async_trait]
pub trait LifecycleCallback: Send + Sync {
    async fn on_event(&self, event: LifecycleEvent, entity: &dyn Entity) -> CacheResult<()>;
}

/// Callback table keyed by lifecycle event
#[derive(Default)]
pub struct LifecycleNotifier {
    callbacks: RwLock<HashMap<LifecycleEvent, Vec<Arc<dyn LifecycleCallback>>>>,
}

impl LifecycleNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback for one event
    pub fn register(&self, event: LifecycleEvent, callback: Arc<dyn LifecycleCallback>) {
        debug!("LifecycleNotifier: Registering callback for {:?}", event);
        self.callbacks.write().entry(event).or_default().push(callback);
    }

    /// Register a callback for every event
    pub fn register_all(&self, callback: Arc<dyn LifecycleCallback>) {
        for event in LifecycleEvent::ALL {
            self.register(event, callback.clone());
        }
    }

    /// Invokes every callback registered for `event`, in registration order.
    /// Stops at and returns the first error.
    pub async fn notify(&self, event: LifecycleEvent, entity: &dyn Entity) -> CacheResult<()> {
        let callbacks = self
            .callbacks
            .read()
            .get(&event)
            .cloned()
            .unwrap_or_default();

        for callback in callbacks {
            callback.on_event(event, entity).await?;
        }
        Ok(())
    }
}

/// Applies a `LifecyclePolicy` to the invalidation engine
pub struct InvalidationListener {
    engine: Arc<InvalidationEngine>,
    policy: LifecyclePolicy,
}

impl InvalidationListener {
    pub fn new(engine: Arc<InvalidationEngine>, policy: LifecyclePolicy) -> Self {
        Self { engine, policy }
    }

    pub fn policy(&self) -> &LifecyclePolicy {
        &self.policy
    }

    /// Registers this listener on `notifier` for every event
    pub fn attach(self: Arc<Self>, notifier: &LifecycleNotifier) {
        notifier.register_all(self);
    }
}

#[async_trait]
impl LifecycleCallback for InvalidationListener {
    async fn on_event(&self, event: LifecycleEvent, entity: &dyn Entity) -> CacheResult<()> {
        debug!(
            "InvalidationListener: {:?} on {} {:?}",
            event,
            entity.type_name(),
            entity.id()
        );
        for scope in self.policy.scopes(event) {
            match scope {
                InvalidationScope::Entity => self.engine.invalidate_entity(entity).await?,
                InvalidationScope::EntityQueries => {
                    self.engine.invalidate_entity_queries(entity).await?
                }
            }
        }
        Ok(())
    }
}
