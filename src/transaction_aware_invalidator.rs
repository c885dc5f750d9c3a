use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use postgres_unit_of_work::{TransactionAware, TransactionResult};
use tracing::{debug, error};

use crate::engine::InvalidationEngine;
use crate::error::{CacheError, CacheResult};
use crate::lifecycle::{InvalidationScope, LifecycleEvent, LifecyclePolicy};
use crate::traits::Entity;

/// Stages invalidations raised inside a unit of work and applies them
/// only when the transaction commits.
pub struct TransactionAwareInvalidator {
    engine: Arc<InvalidationEngine>,
    policy: LifecyclePolicy,
    staged: RwLock<Vec<String>>,
}

impl TransactionAwareInvalidator {
    pub fn new(engine: Arc<InvalidationEngine>, policy: LifecyclePolicy) -> Self {
        Self {
            engine,
            policy,
            staged: RwLock::new(Vec::new()),
        }
    }

    /// Records the index keys the policy maps `event` to.
    /// Keys are derived immediately so invalid entities fail here, not at commit.
    pub fn stage(&self, event: LifecycleEvent, entity: &dyn Entity) -> CacheResult<()> {
        let keys = self.engine.keys();
        let mut index_keys = Vec::new();
        for scope in self.policy.scopes(event) {
            index_keys.push(match scope {
                InvalidationScope::Entity => keys.entity_key(entity)?,
                InvalidationScope::EntityQueries => keys.entity_class_key(entity)?,
            });
        }

        let mut staged = self.staged.write();
        for index_key in index_keys {
            if !staged.contains(&index_key) {
                staged.push(index_key);
            }
        }
        Ok(())
    }

    /// Returns the index keys waiting for commit
    pub fn staged_keys(&self) -> Vec<String> {
        self.staged.read().clone()
    }

    pub fn staged_count(&self) -> usize {
        self.staged.read().len()
    }
}

#[async_trait]
impl TransactionAware for TransactionAwareInvalidator {
    async fn on_commit(&self) -> TransactionResult<()> {
        let staged = std::mem::take(&mut *self.staged.write());
        let mut failed = Vec::new();

        for index_key in &staged {
            if let Err(e) = self.engine.invalidate(index_key).await {
                error!("TransactionAwareInvalidator: Failed to invalidate '{}': {}", index_key, e);
                failed.push(index_key.clone());
            }
        }

        if !failed.is_empty() {
            return Err(CacheError::CommitFailed(format!(
                "could not invalidate {}",
                failed.join(", ")
            ))
            .into());
        }
        debug!("TransactionAwareInvalidator: Applied {} invalidation(s)", staged.len());
        Ok(())
    }

    async fn on_rollback(&self) -> TransactionResult<()> {
        self.staged.write().clear();
        Ok(())
    }
}
