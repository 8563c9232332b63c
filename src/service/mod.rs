//! Application services: tenant scoping, validity checks and the orchestration
//! around the stores. Handlers stay thin and call into these.

pub mod accounts;
pub mod catalog;
pub mod orders;
pub mod shops;

use chrono::Utc;

use crate::auth::{Principal, Role};
use crate::domain::aggregates::Shop;
use crate::error::{AppError, AppResult};
use crate::store::ShopStore;

pub use accounts::{AuthService, LoginRequest, LoginResponse};
pub use catalog::{CatalogService, ProductStatusRequest, UpdateProductRequest};
pub use orders::{CreateOrderRequest, CreatedOrder, OrderSearch, OrderService, ToggleStatusRequest, UpdateOrderRequest};
pub use shops::{ShopService, UpdateShopRequest};

/// Who is acting, with the tenant binding taken from the verified token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Actor {
    Admin,
    ShopOwner { shop_id: i64 },
    Customer { user_id: i64 },
}

impl Actor {
    /// Effective shop for a request. Owners are pinned to their own shop whatever
    /// the request carries; everyone else must name one.
    pub fn shop_scope(&self, requested: Option<i64>) -> AppResult<i64> {
        match (self, requested) {
            (Actor::ShopOwner { shop_id }, _) => Ok(*shop_id),
            (_, Some(id)) if id > 0 => Ok(id),
            _ => Err(AppError::invalid("shop_id is required")),
        }
    }

    /// Effective user filter. Customers only ever see themselves.
    pub fn user_scope(&self, requested: Option<i64>) -> Option<i64> {
        match self {
            Actor::Customer { user_id } => Some(*user_id),
            _ => requested,
        }
    }

    /// Administrators may still operate on expired shops.
    fn bound_by_validity(&self) -> bool {
        !matches!(self, Actor::Admin)
    }
}

impl From<&Principal> for Actor {
    fn from(p: &Principal) -> Self {
        match p.role {
            Role::Admin => Actor::Admin,
            Role::ShopOwner => Actor::ShopOwner { shop_id: p.id },
            Role::User => Actor::Customer { user_id: p.id },
        }
    }
}

/// Load the shop a write targets and refuse it when the actor is bound by an
/// expired validity period.
async fn writable_shop(shops: &dyn ShopStore, actor: Actor, shop_id: i64) -> AppResult<Shop> {
    let shop = shops.get_shop(shop_id).await?;
    if actor.bound_by_validity() {
        shop.ensure_active(Utc::now())?;
    }
    Ok(shop)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_owner_shop_is_forced() {
        let owner = Actor::ShopOwner { shop_id: 456 };
        assert_eq!(owner.shop_scope(Some(999)).unwrap(), 456);
        assert_eq!(owner.shop_scope(None).unwrap(), 456);
    }

    #[test]
    fn test_admin_and_customer_must_name_a_shop() {
        assert_eq!(Actor::Admin.shop_scope(Some(456)).unwrap(), 456);
        assert!(matches!(Actor::Admin.shop_scope(None), Err(AppError::InvalidInput(_))));
        assert!(Actor::Customer { user_id: 1 }.shop_scope(Some(0)).is_err());
    }

    #[test]
    fn test_customer_user_is_forced() {
        assert_eq!(Actor::Customer { user_id: 123 }.user_scope(Some(5)), Some(123));
        assert_eq!(Actor::Admin.user_scope(Some(5)), Some(5));
        assert_eq!(Actor::ShopOwner { shop_id: 1 }.user_scope(None), None);
    }
}
