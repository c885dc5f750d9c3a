use serde::{Deserialize, Serialize};

/// A persistence-layer record instance with a stable identity.
pub trait Entity: Send + Sync {
    /// Returns the runtime type name of the entity.
    /// For generated wrapper types this is the wrapper's own name.
    fn type_name(&self) -> &str;

    /// Returns the unique id of the entity, if it has one.
    fn id(&self) -> Option<String>;

    /// Returns the declared domain type when `type_name` is a generated
    /// wrapper (e.g. a lazy-loading proxy). Plain entities keep the default.
    fn real_type(&self) -> Option<&str> {
        None
    }
}

/// A detached reference to an entity: just its type name and id.
/// Used where only a notification about the entity is available.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityRef {
    pub type_name: String,
    pub id: Option<String>,
}

impl EntityRef {
    pub fn new(type_name: impl Into<String>, id: impl ToString) -> Self {
        Self {
            type_name: type_name.into(),
            id: Some(id.to_string()),
        }
    }
}

impl Entity for EntityRef {
    fn type_name(&self) -> &str {
        &self.type_name
    }

    fn id(&self) -> Option<String> {
        self.id.clone()
    }
}

/// Either a live entity or a type name, both of which identify an entity class.
#[derive(Clone, Copy)]
pub enum ClassRef<'a> {
    Entity(&'a dyn Entity),
    Name(&'a str),
}

impl<'a> From<&'a str> for ClassRef<'a> {
    fn from(name: &'a str) -> Self {
        ClassRef::Name(name)
    }
}

impl<'a> From<&'a dyn Entity> for ClassRef<'a> {
    fn from(entity: &'a dyn Entity) -> Self {
        ClassRef::Entity(entity)
    }
}

impl<'a, E: Entity> From<&'a E> for ClassRef<'a> {
    fn from(entity: &'a E) -> Self {
        ClassRef::Entity(entity)
    }
}
