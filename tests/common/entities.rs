use postgres_query_cache::Entity;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Sample User entity for testing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
}

impl User {
    pub fn new(username: &str, email: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            username: username.to_string(),
            email: email.to_string(),
        }
    }
}

impl Entity for User {
    fn type_name(&self) -> &str {
        "app::model::User"
    }

    fn id(&self) -> Option<String> {
        Some(self.id.to_string())
    }
}

/// Sample Product entity for testing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: Uuid,
    pub user_id: Uuid,
    pub product_name: String,
}

impl Product {
    pub fn new(user_id: Uuid, product_name: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            product_name: product_name.to_string(),
        }
    }
}

impl Entity for Product {
    fn type_name(&self) -> &str {
        "app::model::Product"
    }

    fn id(&self) -> Option<String> {
        Some(self.id.to_string())
    }
}

/// A lazy-loading wrapper around a User, as an ORM would generate
#[derive(Debug, Clone)]
pub struct UserProxy {
    pub inner: User,
}

impl Entity for UserProxy {
    fn type_name(&self) -> &str {
        "proxies::__cg__::app::model::User"
    }

    fn id(&self) -> Option<String> {
        self.inner.id()
    }

    fn real_type(&self) -> Option<&str> {
        Some("app::model::User")
    }
}
