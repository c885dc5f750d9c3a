//! Derivation of stable cache keys for entities, entity classes and queries.
//!
//! Entity keys look like `app-model-user:42`: the lower-cased type name with
//! path separators flattened to `-`, followed by `:` and the id. Class keys are
//! the same string without the id. Query keys are a 128-bit SHA-256 prefix of
//! a length-prefixed canonical form of the query.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::error::{CacheError, CacheResult};
use crate::traits::{ClassRef, Entity};

/// Separator between the class component and the id of an entity key
pub const ENTITY_KEY_SEPARATOR: char = ':';

/// Resolves short namespace aliases (`Alias:Type`) to full namespaces.
/// Supplied by the persistence layer.
pub trait NamespaceResolver: Send + Sync {
    fn alias_to_namespace(&self, alias: &str) -> Option<String>;
}

/// A simple alias table
#[derive(Debug, Default)]
pub struct NamespaceRegistry {
    aliases: RwLock<HashMap<String, String>>,
}

impl NamespaceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `alias` as a short name for `namespace`
    pub fn add_entity_namespace(&self, alias: impl Into<String>, namespace: impl Into<String>) {
        self.aliases.write().insert(alias.into(), namespace.into());
    }
}

impl NamespaceResolver for NamespaceRegistry {
    fn alias_to_namespace(&self, alias: &str) -> Option<String> {
        self.aliases.read().get(alias).cloned()
    }
}

/// How query results are materialized. Part of the query cache key,
/// since the same query hydrated differently yields different results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HydrationMode {
    #[default]
    Object,
    Array,
    Scalar,
    SingleScalar,
}

impl HydrationMode {
    fn as_str(&self) -> &'static str {
        match self {
            HydrationMode::Object => "object",
            HydrationMode::Array => "array",
            HydrationMode::Scalar => "scalar",
            HydrationMode::SingleScalar => "single_scalar",
        }
    }
}

/// Everything that determines the result of a read query
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryDescriptor {
    pub text: String,
    pub parameters: HashMap<String, Value>,
    pub hints: HashMap<String, Value>,
    pub first_result: Option<u64>,
    pub max_results: Option<u64>,
    pub hydration_mode: HydrationMode,
}

impl QueryDescriptor {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    pub fn with_parameter(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.parameters.insert(name.into(), value.into());
        self
    }

    pub fn with_hint(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.hints.insert(name.into(), value.into());
        self
    }

    pub fn with_first_result(mut self, first_result: u64) -> Self {
        self.first_result = Some(first_result);
        self
    }

    pub fn with_max_results(mut self, max_results: u64) -> Self {
        self.max_results = Some(max_results);
        self
    }

    pub fn with_hydration_mode(mut self, hydration_mode: HydrationMode) -> Self {
        self.hydration_mode = hydration_mode;
        self
    }
}

/// Turns entities, entity classes and queries into cache keys
#[derive(Clone)]
pub struct KeyDeriver {
    resolver: Arc<dyn NamespaceResolver>,
}

impl KeyDeriver {
    pub fn new(resolver: Arc<dyn NamespaceResolver>) -> Self {
        Self { resolver }
    }

    /// Returns the key identifying one entity instance
    pub fn entity_key(&self, entity: &dyn Entity) -> CacheResult<String> {
        let class_key = self.entity_class_key(ClassRef::Entity(entity))?;
        let id = entity
            .id()
            .filter(|id| !id.is_empty())
            .ok_or_else(|| {
                CacheError::InvalidEntity(format!("{} has no id", entity.type_name()))
            })?;
        Ok(format_entity_key(&class_key, &id))
    }

    /// Returns the key identifying all entities of a type
    pub fn entity_class_key<'a>(&self, class: impl Into<ClassRef<'a>>) -> CacheResult<String> {
        match class.into() {
            ClassRef::Entity(entity) => {
                let name = entity.real_type().unwrap_or_else(|| entity.type_name());
                Ok(normalize_class_name(name))
            }
            ClassRef::Name(name) => {
                let resolved = self.resolve_type_name(name)?;
                Ok(normalize_class_name(&resolved))
            }
        }
    }

    /// Returns the content hash identifying one query result set
    pub fn query_key(&self, query: &QueryDescriptor) -> String {
        let mut hasher = Sha256::new();
        update_field(&mut hasher, b"text", query.text.as_bytes());

        let mut parameters: Vec<_> = query.parameters.iter().collect();
        parameters.sort_by(|a, b| a.0.cmp(b.0));
        for (name, value) in parameters {
            update_field(&mut hasher, b"param", name.as_bytes());
            update_field(&mut hasher, b"value", value.to_string().as_bytes());
        }

        let mut hints: Vec<_> = query.hints.iter().collect();
        hints.sort_by(|a, b| a.0.cmp(b.0));
        for (name, value) in hints {
            update_field(&mut hasher, b"hint", name.as_bytes());
            update_field(&mut hasher, b"value", value.to_string().as_bytes());
        }

        update_field(&mut hasher, b"first", optional_bound(query.first_result).as_bytes());
        update_field(&mut hasher, b"max", optional_bound(query.max_results).as_bytes());
        update_field(&mut hasher, b"hydration", query.hydration_mode.as_str().as_bytes());

        let digest = hasher.finalize();
        hex::encode(&digest[..16])
    }

    /// Translates `Alias:Type` into `<namespace>::Type`. Other names are
    /// returned unchanged.
    pub fn resolve_type_name(&self, name: &str) -> CacheResult<String> {
        match split_alias(name) {
            Some((alias, short_name)) => {
                let namespace = self
                    .resolver
                    .alias_to_namespace(alias)
                    .ok_or_else(|| CacheError::UnknownNamespaceAlias(alias.to_string()))?;
                Ok(format!("{namespace}::{short_name}"))
            }
            None => Ok(name.to_string()),
        }
    }
}

/// Builds an entity key from an already normalized class key and an id
pub fn format_entity_key(class_key: &str, id: &str) -> String {
    format!("{class_key}{ENTITY_KEY_SEPARATOR}{id}")
}

fn normalize_class_name(name: &str) -> String {
    name.to_lowercase().replace("::", "-").replace('\\', "-")
}

/// Finds the last lone `:` in `name`. `::` is a path separator, not an alias marker.
fn split_alias(name: &str) -> Option<(&str, &str)> {
    let bytes = name.as_bytes();
    (0..bytes.len()).rev().find_map(|i| {
        let lone = bytes[i] == b':'
            && (i == 0 || bytes[i - 1] != b':')
            && (i + 1 == bytes.len() || bytes[i + 1] != b':');
        lone.then(|| (&name[..i], &name[i + 1..]))
    })
}

fn update_field(hasher: &mut Sha256, tag: &[u8], bytes: &[u8]) {
    hasher.update(tag);
    hasher.update((bytes.len() as u64).to_le_bytes());
    hasher.update(bytes);
}

fn optional_bound(bound: Option<u64>) -> String {
    bound.map_or_else(|| "none".to_string(), |b| b.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::EntityRef;

    struct ProxyUser {
        id: u64,
    }

    impl Entity for ProxyUser {
        fn type_name(&self) -> &str {
            "proxies::__CG__::app::model::User"
        }

        fn id(&self) -> Option<String> {
            Some(self.id.to_string())
        }

        fn real_type(&self) -> Option<&str> {
            Some("app::model::User")
        }
    }

    fn deriver() -> KeyDeriver {
        let registry = NamespaceRegistry::new();
        registry.add_entity_namespace("Model", "app::model");
        KeyDeriver::new(Arc::new(registry))
    }

    #[test]
    fn test_entity_key_format() {
        let keys = deriver();
        let user = EntityRef::new("app::model::User", 42);
        assert_eq!(keys.entity_key(&user).unwrap(), "app-model-user:42");
    }

    #[test]
    fn test_entity_key_stability() {
        let keys = deriver();
        let a = EntityRef::new("app::model::User", 7);
        let b = EntityRef::new("app::model::User", 7);
        let c = EntityRef::new("app::model::User", 8);
        assert_eq!(keys.entity_key(&a).unwrap(), keys.entity_key(&b).unwrap());
        assert_ne!(keys.entity_key(&a).unwrap(), keys.entity_key(&c).unwrap());
    }

    #[test]
    fn test_entity_without_id_is_invalid() {
        let keys = deriver();
        let transient = EntityRef {
            type_name: "app::model::User".to_string(),
            id: None,
        };
        assert!(matches!(
            keys.entity_key(&transient),
            Err(CacheError::InvalidEntity(_))
        ));
    }

    #[test]
    fn test_class_key_from_instance_name_and_alias() {
        let keys = deriver();
        let user = EntityRef::new("app::model::User", 1);
        let expected = "app-model-user";

        assert_eq!(keys.entity_class_key(&user).unwrap(), expected);
        assert_eq!(keys.entity_class_key("app::model::User").unwrap(), expected);
        assert_eq!(keys.entity_class_key("App\\Model\\User").unwrap(), expected);
        assert_eq!(keys.entity_class_key("Model:User").unwrap(), expected);
    }

    #[test]
    fn test_unknown_alias() {
        let keys = deriver();
        let result = keys.entity_class_key("Missing:User");
        assert!(matches!(result, Err(CacheError::UnknownNamespaceAlias(alias)) if alias == "Missing"));
    }

    #[test]
    fn test_proxy_resolves_to_declared_type() {
        let keys = deriver();
        let proxy = ProxyUser { id: 3 };
        assert_eq!(keys.entity_class_key(&proxy).unwrap(), "app-model-user");
        assert_eq!(keys.entity_key(&proxy).unwrap(), "app-model-user:3");
    }

    #[test]
    fn test_query_key_is_deterministic_and_hint_order_free() {
        let keys = deriver();
        let a = QueryDescriptor::new("SELECT u FROM User u WHERE u.name = :name")
            .with_parameter("name", "alice")
            .with_hint("fetch_mode", "eager")
            .with_hint("cacheable", true)
            .with_hint("lock", "none");
        let b = QueryDescriptor::new("SELECT u FROM User u WHERE u.name = :name")
            .with_hint("lock", "none")
            .with_hint("cacheable", true)
            .with_parameter("name", "alice")
            .with_hint("fetch_mode", "eager");

        assert_eq!(keys.query_key(&a), keys.query_key(&a));
        assert_eq!(keys.query_key(&a), keys.query_key(&b));
        assert_eq!(keys.query_key(&a).len(), 32);
    }

    #[test]
    fn test_query_key_changes_with_every_field() {
        let keys = deriver();
        let base = QueryDescriptor::new("SELECT u FROM User u").with_parameter("id", 1);
        let base_key = keys.query_key(&base);

        let variants = [
            QueryDescriptor::new("SELECT p FROM Product p").with_parameter("id", 1),
            base.clone().with_parameter("id", 2),
            base.clone().with_hint("cacheable", true),
            base.clone().with_first_result(10),
            base.clone().with_max_results(10),
            base.clone().with_hydration_mode(HydrationMode::Array),
        ];
        for variant in &variants {
            assert_ne!(keys.query_key(variant), base_key, "{variant:?}");
        }
    }

    #[test]
    fn test_query_key_fields_do_not_bleed() {
        let keys = deriver();
        let a = QueryDescriptor::new("SELECT 1").with_parameter("ab", "c");
        let b = QueryDescriptor::new("SELECT 1").with_parameter("a", "bc");
        assert_ne!(keys.query_key(&a), keys.query_key(&b));
    }
}
