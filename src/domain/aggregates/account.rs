//! Login identities: storefront customers and platform administrators.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::domain::value_objects::snowflake_id;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub name: String,
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub phone: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Deserialize, Validate)]
pub struct Registration {
    #[validate(length(min = 3, max = 50))]
    pub name: String,
    #[validate(length(min = 6, max = 100))]
    pub password: String,
    #[serde(default)]
    #[validate(length(max = 20))]
    pub phone: String,
}

impl User {
    pub fn create(registration: Registration, password_hash: String) -> Self {
        Self {
            id: snowflake_id(),
            name: registration.name,
            password_hash,
            phone: registration.phone,
            created_at: Utc::now(),
        }
    }
}

/// Administrators use small sequential ids assigned by the store.
#[derive(Clone, Debug, Serialize)]
pub struct Admin {
    pub id: i64,
    pub username: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}
