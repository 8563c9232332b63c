//! Authentication: tokens, password hashing and the request principal.

pub mod jwt;
pub mod middleware;
pub mod password;

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

pub use jwt::{Claims, IssuedToken, JwtError, JwtService};
pub use middleware::require_auth;
pub use password::{hash_password, verify_password};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    ShopOwner,
    User,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::ShopOwner => "shop_owner",
            Role::User => "user",
        }
    }
}

/// The authenticated caller, placed in request extensions by [`require_auth`].
#[derive(Debug, Clone)]
pub struct Principal {
    /// Admin id, shop id for owners, user id for customers.
    pub id: i64,
    pub username: String,
    pub role: Role,
    pub jti: String,
    pub expires_at: DateTime<Utc>,
}

impl From<Claims> for Principal {
    fn from(c: Claims) -> Self {
        let expires_at = Utc.timestamp_opt(c.exp, 0).single().unwrap_or_else(Utc::now);
        Self { id: c.sub, username: c.username, role: c.role, jti: c.jti, expires_at }
    }
}

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for Principal {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Principal>()
            .cloned()
            .ok_or_else(|| AppError::unauthenticated("authentication required"))
    }
}

macro_rules! role_extractor {
    ($name:ident, $role:expr) => {
        #[derive(Debug, Clone)]
        pub struct $name(pub Principal);

        #[async_trait]
        impl<S: Send + Sync> FromRequestParts<S> for $name {
            type Rejection = AppError;

            async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
                let principal = Principal::from_request_parts(parts, state).await?;
                if principal.role != $role {
                    return Err(AppError::forbidden(format!("{} access required", $role.as_str())));
                }
                Ok(Self(principal))
            }
        }
    };
}

role_extractor!(AdminPrincipal, Role::Admin);
role_extractor!(OwnerPrincipal, Role::ShopOwner);
role_extractor!(UserPrincipal, Role::User);

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn parts_with(principal: Option<Principal>) -> Parts {
        let (mut parts, _) = Request::new(()).into_parts();
        if let Some(p) = principal {
            parts.extensions.insert(p);
        }
        parts
    }

    fn principal(role: Role) -> Principal {
        Principal { id: 1, username: "u".into(), role, jti: "j".into(), expires_at: Utc::now() }
    }

    #[tokio::test]
    async fn test_role_extractors() {
        let mut parts = parts_with(Some(principal(Role::ShopOwner)));
        assert!(OwnerPrincipal::from_request_parts(&mut parts, &()).await.is_ok());
        let err = AdminPrincipal::from_request_parts(&mut parts, &()).await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));

        let mut anonymous = parts_with(None);
        let err = UserPrincipal::from_request_parts(&mut anonymous, &()).await.unwrap_err();
        assert!(matches!(err, AppError::Unauthenticated(_)));
    }

    #[test]
    fn test_role_wire_names() {
        assert_eq!(serde_json::to_string(&Role::ShopOwner).unwrap(), "\"shop_owner\"");
        assert_eq!(serde_json::from_str::<Role>("\"admin\"").unwrap(), Role::Admin);
    }
}
