//! Shop (tenant) administration.

use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;
use tracing::instrument;
use validator::Validate;

use crate::auth::hash_password;
use crate::domain::aggregates::{PublicShop, Shop, ShopDraft, ShopPatch};
use crate::domain::flow::OrderStatusFlow;
use crate::domain::value_objects::PageRequest;
use crate::error::AppResult;
use crate::store::{Page, ShopStore};

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct UpdateShopRequest {
    pub id: i64,
    #[serde(flatten)]
    #[validate]
    pub patch: ShopPatch,
}

#[derive(Clone)]
pub struct ShopService {
    shops: Arc<dyn ShopStore>,
}

impl ShopService {
    pub fn new(shops: Arc<dyn ShopStore>) -> Self {
        Self { shops }
    }

    /// Create a shop, installing the default flow unless one is supplied.
    #[instrument(skip(self, draft), fields(name = %draft.name))]
    pub async fn create(&self, mut draft: ShopDraft) -> AppResult<Shop> {
        draft.validate()?;
        let flow = draft.order_status_flow.take().unwrap_or_default();
        flow.validate()?;
        let hash = hash_password(&draft.owner_password)?;
        let shop = self.shops.create_shop(Shop::create(draft, hash, flow)).await?;
        tracing::info!(shop_id = shop.id, owner = %shop.owner_username, "shop created");
        Ok(shop)
    }

    #[instrument(skip(self, req), fields(shop_id = req.id))]
    pub async fn update_as_admin(&self, req: UpdateShopRequest) -> AppResult<Shop> {
        req.validate()?;
        let mut shop = self.shops.get_shop(req.id).await?;
        let hash = req.patch.owner_password.as_deref().map(hash_password).transpose()?;
        shop.apply_patch(req.patch, hash);
        self.shops.update_shop(&shop).await?;
        Ok(shop)
    }

    /// Owners edit their own shop but never its validity period or login name.
    #[instrument(skip(self, patch))]
    pub async fn update_as_owner(&self, shop_id: i64, patch: ShopPatch) -> AppResult<Shop> {
        patch.validate()?;
        let mut shop = self.shops.get_shop(shop_id).await?;
        shop.ensure_active(Utc::now())?;
        let hash = patch.owner_password.as_deref().map(hash_password).transpose()?;
        shop.apply_owner_patch(patch, hash)?;
        self.shops.update_shop(&shop).await?;
        Ok(shop)
    }

    #[instrument(skip(self, flow))]
    pub async fn update_flow(&self, shop_id: i64, flow: OrderStatusFlow) -> AppResult<OrderStatusFlow> {
        flow.validate()?;
        self.shops.get_shop(shop_id).await?.ensure_active(Utc::now())?;
        self.shops.update_flow(shop_id, flow.clone()).await?;
        tracing::info!(shop_id, statuses = ?flow.values(), "status flow replaced");
        Ok(flow)
    }

    pub async fn detail(&self, id: i64) -> AppResult<Shop> {
        self.shops.get_shop(id).await
    }

    pub async fn public(&self, id: i64) -> AppResult<PublicShop> {
        Ok(self.shops.get_shop(id).await?.public_view())
    }

    pub async fn list(&self, page: PageRequest) -> AppResult<Page<Shop>> {
        self.shops.list_shops(page).await
    }

    #[instrument(skip(self))]
    pub async fn delete(&self, id: i64) -> AppResult<()> {
        self.shops.delete_shop(id).await?;
        tracing::info!(shop_id = id, "shop deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::verify_password;
    use crate::domain::flow::{StatusAction, StatusNode};
    use crate::error::AppError;
    use crate::store::MemoryStore;
    use chrono::Duration;

    fn draft(name: &str, owner: &str) -> ShopDraft {
        ShopDraft {
            name: name.into(), owner_username: owner.into(), owner_password: "secret1".into(),
            contact_phone: String::new(), contact_email: None, address: String::new(), description: String::new(),
            image_url: String::new(), valid_until: Utc::now() + Duration::days(30), settings: None, order_status_flow: None,
        }
    }

    #[tokio::test]
    async fn test_create_installs_default_flow_and_hashes_password() {
        let svc = ShopService::new(Arc::new(MemoryStore::new()));
        let shop = svc.create(draft("Cafe", "owner1")).await.unwrap();
        assert_eq!(shop.order_status_flow, OrderStatusFlow::default());
        assert!(verify_password("secret1", &shop.owner_password_hash));
    }

    #[tokio::test]
    async fn test_create_rejects_invalid_flow_and_duplicates() {
        let svc = ShopService::new(Arc::new(MemoryStore::new()));
        let mut bad = draft("Cafe", "owner1");
        bad.order_status_flow = Some(OrderStatusFlow {
            statuses: vec![StatusNode {
                value: 0, label: "open".into(), kind: "pending".into(), is_final: false,
                actions: vec![StatusAction { name: "go".into(), next_status: 5, next_status_label: "?".into() }],
            }],
        });
        assert!(matches!(svc.create(bad).await, Err(AppError::InvalidInput(_))));

        svc.create(draft("Cafe", "owner1")).await.unwrap();
        assert!(matches!(svc.create(draft("Other", "owner1")).await, Err(AppError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_owner_cannot_extend_validity() {
        let svc = ShopService::new(Arc::new(MemoryStore::new()));
        let shop = svc.create(draft("Cafe", "owner1")).await.unwrap();
        let patch = ShopPatch { valid_until: Some(shop.valid_until + Duration::days(365)), ..Default::default() };
        assert!(matches!(svc.update_as_owner(shop.id, patch).await, Err(AppError::Forbidden(_))));
        let patch = ShopPatch { address: Some("1 Main St".into()), ..Default::default() };
        assert_eq!(svc.update_as_owner(shop.id, patch).await.unwrap().address, "1 Main St");
    }
}
