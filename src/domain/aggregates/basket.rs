//! Basket Aggregate
//!
//! The validated list of lines a customer asks for when an order is created or
//! its contents replaced. A basket carries ids and quantities only; prices and
//! names come from the catalog at reservation time.

use serde::Deserialize;
use std::collections::{BTreeSet, HashSet};
use thiserror::Error;

use crate::domain::value_objects::Quantity;

#[derive(Clone, Debug, Deserialize)]
pub struct BasketItem {
    pub product_id: i64,
    pub quantity: Quantity,
    #[serde(default)]
    pub options: Vec<BasketOption>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize)]
pub struct BasketOption {
    pub category_id: i64,
    pub option_id: i64,
}

#[derive(Clone, Debug)]
pub struct Basket {
    items: Vec<BasketItem>,
}

/// Hard cap on lines per order.
pub const MAX_BASKET_ITEMS: usize = 100;

impl Basket {
    pub fn new(items: Vec<BasketItem>) -> Result<Self, BasketError> {
        if items.is_empty() { return Err(BasketError::Empty); }
        if items.len() > MAX_BASKET_ITEMS { return Err(BasketError::TooManyItems(items.len())); }
        for item in &items {
            let mut seen = HashSet::new();
            if let Some(dup) = item.options.iter().find(|o| !seen.insert(o.option_id)) {
                return Err(BasketError::DuplicateOption { product_id: item.product_id, option_id: dup.option_id });
            }
        }
        Ok(Self { items })
    }

    pub fn items(&self) -> &[BasketItem] { &self.items }

    /// Distinct product ids in ascending order.
    pub fn product_ids(&self) -> Vec<i64> {
        self.items.iter().map(|i| i.product_id).collect::<BTreeSet<_>>().into_iter().collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BasketError {
    #[error("order must contain at least one item")]
    Empty,
    #[error("order contains {0} items, at most {max} allowed", max = MAX_BASKET_ITEMS)]
    TooManyItems(usize),
    #[error("option {option_id} is listed twice for product {product_id}")]
    DuplicateOption { product_id: i64, option_id: i64 },
}
