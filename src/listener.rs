use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use crate::error::{CacheError, CacheResult};
use crate::keys::KeyDeriver;
use crate::lifecycle::{LifecycleEvent, LifecycleNotifier};
use crate::traits::EntityRef;

/// The default channel name for lifecycle notifications
pub const DEFAULT_LIFECYCLE_CHANNEL: &str = "entity_lifecycle";

/// Notification payload structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleNotification {
    /// The table name that was modified
    pub table: String,
    /// The action performed: "insert", "update", or "delete"
    pub action: String,
    /// The primary key of the affected row, as text
    pub id: String,
}

impl LifecycleNotification {
    /// Maps the trigger action onto a lifecycle event
    pub fn event(&self) -> Option<LifecycleEvent> {
        match self.action.as_str() {
            "insert" => Some(LifecycleEvent::Created),
            "update" => Some(LifecycleEvent::Updated),
            "delete" => Some(LifecycleEvent::Removed),
            _ => None,
        }
    }
}

/// Listener for PostgreSQL notifications that forwards row changes to a
/// `LifecycleNotifier` as entity lifecycle events
pub struct CacheNotificationListener {
    notifier: Arc<LifecycleNotifier>,
    keys: Option<KeyDeriver>,
    tables: HashMap<String, String>,
    channel: String,
}

impl CacheNotificationListener {
    /// Create a new listener with the default channel
    pub fn new(notifier: Arc<LifecycleNotifier>) -> Self {
        Self::with_channel(notifier, DEFAULT_LIFECYCLE_CHANNEL.to_string())
    }

    /// Create a new listener with a custom channel name
    pub fn with_channel(notifier: Arc<LifecycleNotifier>, channel: String) -> Self {
        Self {
            notifier,
            keys: None,
            tables: HashMap::new(),
            channel,
        }
    }

    /// Resolve `Alias:Type` entity types passed to `register_table` through
    /// the given key deriver's namespace aliases
    pub fn with_key_deriver(mut self, keys: KeyDeriver) -> Self {
        self.keys = Some(keys);
        self
    }

    /// Map a table to the entity type stored in it
    ///
    /// Aliased types are resolved to their full name here, since
    /// notifications carry detached entities that skip alias resolution.
    /// Without a key deriver an aliased type is rejected with
    /// `CacheError::UnknownNamespaceAlias`.
    pub fn register_table(
        &mut self,
        table: impl Into<String>,
        entity_type: impl Into<String>,
    ) -> CacheResult<()> {
        let table = table.into();
        let entity_type = entity_type.into();
        let entity_type = match &self.keys {
            Some(keys) => keys.resolve_type_name(&entity_type)?,
            None if is_aliased(&entity_type) => {
                return Err(CacheError::UnknownNamespaceAlias(entity_type));
            }
            None => entity_type,
        };
        debug!("Registering table '{}' as entity type '{}'", table, entity_type);
        self.tables.insert(table, entity_type);
        Ok(())
    }

    /// Returns the entity type registered for `table`
    pub fn entity_type(&self, table: &str) -> Option<&str> {
        self.tables.get(table).map(String::as_str)
    }

    /// Process a single notification payload
    ///
    /// Unparsable payloads, unknown tables and unknown actions are logged and
    /// skipped; errors raised while invalidating are returned.
    ///
    /// # Example
    /// ```ignore
    /// // In your notification loop
    /// while let Some(notification) = get_notification().await {
    ///     listener.process_notification(&notification.payload()).await?;
    /// }
    /// ```
    pub async fn process_notification(&self, payload: &str) -> CacheResult<()> {
        let notification = match serde_json::from_str::<LifecycleNotification>(payload) {
            Ok(notification) => notification,
            Err(e) => {
                error!("Failed to parse notification payload: {}", e);
                debug!("Payload was: {}", payload);
                return Ok(());
            }
        };

        let Some(entity_type) = self.tables.get(&notification.table) else {
            debug!("No entity type registered for table '{}'", notification.table);
            return Ok(());
        };

        let Some(event) = notification.event() else {
            warn!(
                "Unknown action '{}' for table '{}'",
                notification.action, notification.table
            );
            return Ok(());
        };

        debug!(
            "Handling notification for table '{}': action={}, id={}",
            notification.table, notification.action, notification.id
        );
        let entity = EntityRef::new(entity_type.clone(), &notification.id);
        self.notifier.notify(event, &entity).await
    }

    /// Get the channel name this listener is using
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Starts listening for notifications from PostgreSQL and processes them.
    ///
    /// This method will continuously listen for notifications on the configured
    /// channel and forward them to the lifecycle notifier. It is designed to
    /// run in a background task. Invalidation failures are logged and the loop
    /// keeps going.
    ///
    /// # Arguments
    ///
    /// * `pool` - A `PgPool` to connect to the database.
    ///
    /// # Errors
    ///
    /// This function will return an error if it fails to connect to the database
    /// or listen for notifications.
    #[cfg(feature = "sqlx-listener")]
    pub async fn listen(&self, pool: &sqlx::PgPool) -> Result<(), sqlx::Error> {
        let mut listener = sqlx::postgres::PgListener::connect_with(pool).await?;
        listener.listen(&self.channel).await?;
        debug!("Started listening on channel '{}'", self.channel);

        loop {
            match listener.recv().await {
                Ok(notification) => {
                    if let Err(e) = self.process_notification(notification.payload()).await {
                        error!("Failed to invalidate after notification: {}", e);
                    }
                }
                Err(e) => {
                    error!("Error receiving notification: {}", e);
                    tokio::time::sleep(std::time::Duration::from_secs(5)).await;

                    match sqlx::postgres::PgListener::connect_with(pool).await {
                        Ok(new_listener) => {
                            listener = new_listener;
                            if let Err(listen_err) = listener.listen(&self.channel).await {
                                error!(
                                    "Failed to re-listen on channel '{}': {}",
                                    self.channel, listen_err
                                );
                                return Err(listen_err);
                            }
                            debug!("Reconnected and listening on channel '{}'", self.channel);
                        }
                        Err(connect_err) => {
                            error!("Failed to reconnect to database: {}", connect_err);
                        }
                    }
                }
            }
        }
    }
}

/// `Alias:Type` contains a lone `:`; `::` path separators do not count
fn is_aliased(entity_type: &str) -> bool {
    entity_type.replace("::", "").contains(':')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::NamespaceRegistry;

    #[test]
    fn test_notification_serialization() {
        let notif = LifecycleNotification {
            table: "users".to_string(),
            action: "insert".to_string(),
            id: "42".to_string(),
        };

        let json = serde_json::to_string(&notif).unwrap();
        let deserialized: LifecycleNotification = serde_json::from_str(&json).unwrap();

        assert_eq!(notif.table, deserialized.table);
        assert_eq!(deserialized.event(), Some(LifecycleEvent::Created));
        assert_eq!(notif.id, deserialized.id);
    }

    #[test]
    fn test_unknown_action_has_no_event() {
        let notif = LifecycleNotification {
            table: "users".to_string(),
            action: "truncate".to_string(),
            id: "1".to_string(),
        };
        assert_eq!(notif.event(), None);
    }

    #[test]
    fn test_aliased_table_type_is_resolved() {
        let namespaces = NamespaceRegistry::new();
        namespaces.add_entity_namespace("Model", "app::model");
        let mut listener = CacheNotificationListener::new(Arc::new(LifecycleNotifier::new()))
            .with_key_deriver(KeyDeriver::new(Arc::new(namespaces)));

        listener.register_table("users", "Model:User").unwrap();
        listener.register_table("orders", "app::model::Order").unwrap();

        assert_eq!(listener.entity_type("users"), Some("app::model::User"));
        assert_eq!(listener.entity_type("orders"), Some("app::model::Order"));
        assert!(matches!(
            listener.register_table("carts", "Shop:Cart"),
            Err(CacheError::UnknownNamespaceAlias(_))
        ));
    }

    #[test]
    fn test_aliased_table_type_needs_key_deriver() {
        let mut listener = CacheNotificationListener::new(Arc::new(LifecycleNotifier::new()));

        assert!(matches!(
            listener.register_table("users", "Model:User"),
            Err(CacheError::UnknownNamespaceAlias(_))
        ));
        listener.register_table("users", "app::model::User").unwrap();
        assert_eq!(listener.entity_type("users"), Some("app::model::User"));
    }
}
