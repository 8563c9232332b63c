//! Product Aggregate

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;
use validator::{Validate, ValidationError};

use crate::domain::value_objects::{snowflake_id, Money};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Product {
    pub id: i64,
    pub shop_id: i64,
    pub name: String,
    pub description: String,
    pub price: Money,
    pub stock: i32,
    pub image_url: String,
    pub status: ProductStatus,
    pub option_categories: Vec<OptionCategory>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OptionCategory {
    pub id: i64,
    pub product_id: i64,
    pub name: String,
    pub is_required: bool,
    pub is_multiple: bool,
    pub display_order: i32,
    pub options: Vec<ProductOption>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProductOption {
    pub id: i64,
    pub category_id: i64,
    pub name: String,
    pub price_adjustment: Money,
    pub is_default: bool,
    pub display_order: i32,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProductStatus { #[default] Pending, Online, Offline }

impl ProductStatus {
    pub fn as_str(&self) -> &'static str {
        match self { Self::Pending => "pending", Self::Online => "online", Self::Offline => "offline" }
    }

    /// pending -> online, online -> offline, offline -> online. Nothing else.
    pub fn can_become(&self, next: ProductStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Online) | (Self::Online, Self::Offline) | (Self::Offline, Self::Online)
        )
    }
}

impl FromStr for ProductStatus {
    type Err = ProductError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "online" => Ok(Self::Online),
            "offline" => Ok(Self::Offline),
            other => Err(ProductError::UnknownStatus(other.to_string())),
        }
    }
}

/// Editable product fields, replaced wholesale on update. Stock is not among
/// them: it only moves through reservations and [`Product::adjust_stock`].
#[derive(Clone, Debug, Deserialize, Validate)]
pub struct ProductDetails {
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    #[serde(default)]
    #[validate(length(max = 5000))]
    pub description: String,
    #[validate(custom = "valid_price")]
    pub price: Money,
    #[serde(default)]
    pub image_url: String,
    #[serde(default)]
    #[validate]
    pub option_categories: Vec<OptionCategoryDraft>,
}

/// Product fields supplied on create.
#[derive(Clone, Debug, Deserialize, Validate)]
pub struct ProductDraft {
    #[serde(flatten)]
    #[validate]
    pub details: ProductDetails,
    #[validate(range(min = 0))]
    pub stock: i32,
}

#[derive(Clone, Debug, Deserialize, Validate)]
pub struct OptionCategoryDraft {
    #[validate(length(min = 1, max = 50))]
    pub name: String,
    #[serde(default)]
    pub is_required: bool,
    #[serde(default)]
    pub is_multiple: bool,
    #[serde(default)]
    pub display_order: i32,
    #[serde(default)]
    #[validate]
    pub options: Vec<OptionDraft>,
}

#[derive(Clone, Debug, Deserialize, Validate)]
pub struct OptionDraft {
    #[validate(length(min = 1, max = 50))]
    pub name: String,
    #[serde(default)]
    #[validate(custom = "valid_adjustment")]
    pub price_adjustment: Money,
    #[serde(default)]
    pub is_default: bool,
    #[serde(default)]
    pub display_order: i32,
}

fn valid_price(price: &Money) -> Result<(), ValidationError> {
    if price.is_negative() { return Err(ValidationError::new("negative_price")); }
    if *price > Money::MAX { return Err(ValidationError::new("price_too_large")); }
    Ok(())
}

fn valid_adjustment(adjustment: &Money) -> Result<(), ValidationError> {
    if adjustment.amount().abs() > Money::MAX.amount() { return Err(ValidationError::new("adjustment_too_large")); }
    Ok(())
}

impl Product {
    pub fn create(shop_id: i64, draft: ProductDraft) -> Self {
        let id = snowflake_id();
        let now = Utc::now();
        let d = draft.details;
        Self {
            id, shop_id, name: d.name, description: d.description, price: d.price,
            stock: draft.stock, image_url: d.image_url, status: ProductStatus::Pending,
            option_categories: build_categories(id, d.option_categories),
            created_at: now, updated_at: now,
        }
    }

    /// Full replacement of the editable fields. `shop_id`, status and stock are
    /// untouched; option categories are rebuilt with fresh ids.
    pub fn apply(&mut self, details: ProductDetails) {
        self.name = details.name;
        self.description = details.description;
        self.price = details.price;
        self.image_url = details.image_url;
        self.option_categories = build_categories(self.id, details.option_categories);
        self.touch();
    }

    /// Restock (positive) or write off (negative) relative to the current level.
    pub fn adjust_stock(&mut self, delta: i32) -> Result<(), ProductError> {
        if delta == 0 {
            return Ok(());
        }
        let next = self
            .stock
            .checked_add(delta)
            .filter(|s| *s >= 0)
            .ok_or(ProductError::StockOutOfRange { product_id: self.id, stock: self.stock, delta })?;
        self.stock = next;
        self.touch();
        Ok(())
    }

    pub fn transition_to(&mut self, next: ProductStatus) -> Result<(), ProductError> {
        if !self.status.can_become(next) {
            return Err(ProductError::IllegalStatusChange { from: self.status, to: next });
        }
        self.status = next;
        self.touch();
        Ok(())
    }

    pub fn is_on_sale(&self) -> bool { self.status == ProductStatus::Online }

    fn touch(&mut self) { self.updated_at = Utc::now(); }
}

fn build_categories(product_id: i64, drafts: Vec<OptionCategoryDraft>) -> Vec<OptionCategory> {
    drafts
        .into_iter()
        .map(|c| {
            let category_id = snowflake_id();
            OptionCategory {
                id: category_id, product_id, name: c.name, is_required: c.is_required,
                is_multiple: c.is_multiple, display_order: c.display_order,
                options: c.options.into_iter().map(|o| ProductOption {
                    id: snowflake_id(), category_id, name: o.name, price_adjustment: o.price_adjustment,
                    is_default: o.is_default, display_order: o.display_order,
                }).collect(),
            }
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProductError {
    #[error("product status cannot change from {} to {}", from.as_str(), to.as_str())]
    IllegalStatusChange { from: ProductStatus, to: ProductStatus },
    #[error("unknown product status '{0}'")]
    UnknownStatus(String),
    #[error("stock of product {product_id} is {stock}; adjusting by {delta} leaves it out of range")]
    StockOutOfRange { product_id: i64, stock: i32, delta: i32 },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn details() -> ProductDetails {
        ProductDetails {
            name: "Latte".into(), description: String::new(), price: Money::from(18), image_url: String::new(),
            option_categories: vec![OptionCategoryDraft {
                name: "Size".into(), is_required: true, is_multiple: false, display_order: 0,
                options: vec![OptionDraft { name: "Large".into(), price_adjustment: Money::from(3), is_default: false, display_order: 0 }],
            }],
        }
    }

    fn draft() -> ProductDraft {
        ProductDraft { details: details(), stock: 5 }
    }

    #[test]
    fn test_product_create() {
        let p = Product::create(456, draft());
        assert_eq!(p.status, ProductStatus::Pending);
        assert_eq!(p.stock, 5);
        assert_eq!(p.option_categories[0].product_id, p.id);
        assert_eq!(p.option_categories[0].options[0].category_id, p.option_categories[0].id);
    }

    #[test]
    fn test_status_transitions() {
        let mut p = Product::create(1, draft());
        assert!(p.transition_to(ProductStatus::Offline).is_err());
        p.transition_to(ProductStatus::Online).unwrap();
        p.transition_to(ProductStatus::Offline).unwrap();
        p.transition_to(ProductStatus::Online).unwrap();
        assert_eq!(
            p.transition_to(ProductStatus::Pending),
            Err(ProductError::IllegalStatusChange { from: ProductStatus::Online, to: ProductStatus::Pending })
        );
    }

    #[test]
    fn test_draft_validation() {
        let mut d = draft();
        assert!(d.validate().is_ok());
        d.details.price = Money::from(-1);
        assert!(d.validate().is_err());
        let mut d = draft();
        d.details.option_categories[0].options[0].name.clear();
        assert!(d.validate().is_err());
        let mut d = draft();
        d.stock = -1;
        assert!(d.validate().is_err());
    }

    #[test]
    fn test_prices_must_fit_the_money_column() {
        let mut d = details();
        d.price = Money::MAX;
        assert!(d.validate().is_ok());
        d.price = Money::parse("10000000000").unwrap();
        assert!(d.validate().is_err());
        let mut d = details();
        d.option_categories[0].options[0].price_adjustment = Money::parse("-10000000000").unwrap();
        assert!(d.validate().is_err());
    }

    #[test]
    fn test_apply_keeps_shop_and_stock() {
        let mut p = Product::create(7, draft());
        let mut d = details();
        d.name = "Mocha".into();
        d.option_categories.clear();
        p.apply(d);
        assert_eq!((p.shop_id, p.name.as_str(), p.stock), (7, "Mocha", 5));
        assert!(p.option_categories.is_empty());
    }

    #[test]
    fn test_adjust_stock_is_relative() {
        let mut p = Product::create(7, draft());
        p.adjust_stock(3).unwrap();
        assert_eq!(p.stock, 8);
        p.adjust_stock(-8).unwrap();
        assert_eq!(p.stock, 0);
        assert_eq!(p.adjust_stock(-1), Err(ProductError::StockOutOfRange { product_id: p.id, stock: 0, delta: -1 }));
        p.adjust_stock(i32::MAX).unwrap();
        assert!(p.adjust_stock(1).is_err());
    }
}
