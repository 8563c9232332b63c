//! Shop Aggregate (tenant root)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use validator::Validate;

use crate::domain::flow::OrderStatusFlow;
use crate::domain::value_objects::snowflake_id;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Shop {
    pub id: i64,
    pub name: String,
    pub owner_username: String,
    #[serde(skip_serializing, default)]
    pub owner_password_hash: String,
    pub contact_phone: String,
    pub contact_email: String,
    pub address: String,
    pub description: String,
    pub image_url: String,
    pub valid_until: DateTime<Utc>,
    pub settings: serde_json::Value,
    pub order_status_flow: OrderStatusFlow,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// What storefront visitors may see of a shop.
#[derive(Clone, Debug, Serialize)]
pub struct PublicShop {
    pub id: i64,
    pub name: String,
    pub contact_phone: String,
    pub address: String,
    pub description: String,
    pub image_url: String,
}

#[derive(Clone, Debug, Deserialize, Validate)]
pub struct ShopDraft {
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    #[validate(length(min = 3, max = 50))]
    pub owner_username: String,
    #[validate(length(min = 6, max = 100))]
    pub owner_password: String,
    #[serde(default)]
    pub contact_phone: String,
    #[serde(default)]
    #[validate(email)]
    pub contact_email: Option<String>,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub image_url: String,
    pub valid_until: DateTime<Utc>,
    #[serde(default)]
    pub settings: Option<serde_json::Value>,
    #[serde(default)]
    pub order_status_flow: Option<OrderStatusFlow>,
}

/// Editable shop fields. `None` leaves a field unchanged.
#[derive(Clone, Debug, Default, Deserialize, Validate)]
pub struct ShopPatch {
    #[validate(length(min = 1, max = 100))]
    pub name: Option<String>,
    #[validate(length(min = 3, max = 50))]
    pub owner_username: Option<String>,
    #[validate(length(min = 6, max = 100))]
    pub owner_password: Option<String>,
    pub contact_phone: Option<String>,
    #[validate(email)]
    pub contact_email: Option<String>,
    pub address: Option<String>,
    pub description: Option<String>,
    pub image_url: Option<String>,
    pub valid_until: Option<DateTime<Utc>>,
    pub settings: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ShopError {
    #[error("shop {0} has expired")]
    Expired(i64),
    #[error("shop owners cannot change {0}")]
    OwnerCannotChange(&'static str),
}

impl Shop {
    /// Build a shop from a validated draft. The caller supplies the password hash
    /// and the flow to install (already validated).
    pub fn create(draft: ShopDraft, owner_password_hash: String, flow: OrderStatusFlow) -> Self {
        let now = Utc::now();
        Self {
            id: snowflake_id(), name: draft.name, owner_username: draft.owner_username, owner_password_hash,
            contact_phone: draft.contact_phone, contact_email: draft.contact_email.unwrap_or_default(),
            address: draft.address, description: draft.description, image_url: draft.image_url,
            valid_until: draft.valid_until, settings: draft.settings.unwrap_or_else(|| serde_json::json!({})),
            order_status_flow: flow, created_at: now, updated_at: now,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool { self.valid_until < now }

    pub fn ensure_active(&self, now: DateTime<Utc>) -> Result<(), ShopError> {
        if self.is_expired(now) { return Err(ShopError::Expired(self.id)); }
        Ok(())
    }

    /// Apply a patch coming from the shop's own owner.
    pub fn apply_owner_patch(&mut self, patch: ShopPatch, password_hash: Option<String>) -> Result<(), ShopError> {
        if patch.valid_until.is_some_and(|v| v != self.valid_until) {
            return Err(ShopError::OwnerCannotChange("the validity period"));
        }
        if patch.owner_username.as_ref().is_some_and(|u| u != &self.owner_username) {
            return Err(ShopError::OwnerCannotChange("the owner username"));
        }
        self.apply_patch(patch, password_hash);
        Ok(())
    }

    /// Apply a patch with administrator rights.
    pub fn apply_patch(&mut self, patch: ShopPatch, password_hash: Option<String>) {
        if let Some(v) = patch.name { self.name = v; }
        if let Some(v) = patch.owner_username { self.owner_username = v; }
        if let Some(v) = password_hash { self.owner_password_hash = v; }
        if let Some(v) = patch.contact_phone { self.contact_phone = v; }
        if let Some(v) = patch.contact_email { self.contact_email = v; }
        if let Some(v) = patch.address { self.address = v; }
        if let Some(v) = patch.description { self.description = v; }
        if let Some(v) = patch.image_url { self.image_url = v; }
        if let Some(v) = patch.valid_until { self.valid_until = v; }
        if let Some(v) = patch.settings { self.settings = v; }
        self.updated_at = Utc::now();
    }

    pub fn public_view(&self) -> PublicShop {
        PublicShop {
            id: self.id, name: self.name.clone(), contact_phone: self.contact_phone.clone(),
            address: self.address.clone(), description: self.description.clone(), image_url: self.image_url.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn shop(valid_for: Duration) -> Shop {
        let draft = ShopDraft {
            name: "Corner Cafe".into(), owner_username: "owner".into(), owner_password: "secret1".into(),
            contact_phone: String::new(), contact_email: None, address: String::new(), description: String::new(),
            image_url: String::new(), valid_until: Utc::now() + valid_for, settings: None, order_status_flow: None,
        };
        Shop::create(draft, "hash".into(), OrderStatusFlow::default())
    }

    #[test]
    fn test_expiry() {
        let now = Utc::now();
        assert!(shop(Duration::days(30)).ensure_active(now).is_ok());
        let expired = shop(Duration::days(-1));
        assert_eq!(expired.ensure_active(now), Err(ShopError::Expired(expired.id)));
    }

    #[test]
    fn test_owner_cannot_extend_validity() {
        let mut s = shop(Duration::days(1));
        let patch = ShopPatch { valid_until: Some(s.valid_until + Duration::days(365)), ..Default::default() };
        assert!(s.apply_owner_patch(patch, None).is_err());
        let patch = ShopPatch { description: Some("new".into()), valid_until: Some(s.valid_until), ..Default::default() };
        s.apply_owner_patch(patch, None).unwrap();
        assert_eq!(s.description, "new");
    }

    #[test]
    fn test_password_hash_is_never_serialized() {
        let json = serde_json::to_value(shop(Duration::days(1))).unwrap();
        assert!(json.get("owner_password_hash").is_none());
        assert_eq!(json["settings"], serde_json::json!({}));
    }
}
