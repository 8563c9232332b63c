//! Stock reservation planning.
//!
//! A [`StockPlan`] sums the quantities an order needs per product. Stores lock
//! the product rows in [`StockPlan::product_ids`] order (ascending), then apply
//! the plan to the locked stock levels: every product is checked before any is
//! decremented, so a failed reservation leaves the levels untouched.

use std::collections::BTreeMap;
use thiserror::Error;

use crate::domain::aggregates::{Basket, OrderItem};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StockPlan(BTreeMap<i64, u32>);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StockError {
    #[error("insufficient stock for product {product_id}")]
    OutOfStock { product_id: i64 },
    #[error("product {product_id} not found")]
    ProductMissing { product_id: i64 },
}

impl StockPlan {
    pub fn for_basket(basket: &Basket) -> Self {
        let mut plan = Self::default();
        for item in basket.items() {
            plan.add(item.product_id, item.quantity.value());
        }
        plan
    }

    pub fn for_items(items: &[OrderItem]) -> Self {
        let mut plan = Self::default();
        for item in items {
            plan.add(item.product_id, item.quantity.value());
        }
        plan
    }

    fn add(&mut self, product_id: i64, qty: u32) {
        let entry = self.0.entry(product_id).or_default();
        *entry = entry.saturating_add(qty);
    }

    /// Lock order for the affected product rows.
    pub fn product_ids(&self) -> Vec<i64> {
        self.0.keys().copied().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (i64, u32)> + '_ {
        self.0.iter().map(|(&id, &qty)| (id, qty))
    }

    /// Decrement `levels` by the plan, all or nothing.
    pub fn reserve(&self, levels: &mut BTreeMap<i64, i32>) -> Result<(), StockError> {
        for (product_id, qty) in self.iter() {
            let available = *levels.get(&product_id).ok_or(StockError::ProductMissing { product_id })?;
            if i64::from(available) < i64::from(qty) {
                return Err(StockError::OutOfStock { product_id });
            }
        }
        for (product_id, qty) in self.iter() {
            if let Some(level) = levels.get_mut(&product_id) {
                *level -= qty as i32;
            }
        }
        Ok(())
    }

    /// Hand the planned quantities back. Products that no longer exist are skipped.
    pub fn restore(&self, levels: &mut BTreeMap<i64, i32>) {
        for (product_id, qty) in self.iter() {
            if let Some(level) = levels.get_mut(&product_id) {
                *level = level.saturating_add(qty as i32);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::BasketItem;
    use crate::domain::value_objects::Quantity;

    fn basket(lines: &[(i64, u32)]) -> Basket {
        Basket::new(
            lines
                .iter()
                .map(|&(product_id, q)| BasketItem { product_id, quantity: Quantity::new(q).unwrap(), options: vec![] })
                .collect(),
        )
        .unwrap()
    }

    #[test]
    fn test_plan_sums_lines_and_orders_ids() {
        let plan = StockPlan::for_basket(&basket(&[(9, 1), (3, 2), (9, 4)]));
        assert_eq!(plan.product_ids(), vec![3, 9]);
        assert_eq!(plan.iter().collect::<Vec<_>>(), vec![(3, 2), (9, 5)]);
    }

    #[test]
    fn test_reserve_decrements_exactly() {
        let mut levels = BTreeMap::from([(789, 10)]);
        StockPlan::for_basket(&basket(&[(789, 2)])).reserve(&mut levels).unwrap();
        assert_eq!(levels[&789], 8);
    }

    #[test]
    fn test_reserve_is_all_or_nothing() {
        let mut levels = BTreeMap::from([(1, 10), (2, 5)]);
        let err = StockPlan::for_basket(&basket(&[(1, 3), (2, 10)])).reserve(&mut levels).unwrap_err();
        assert_eq!(err, StockError::OutOfStock { product_id: 2 });
        assert_eq!(levels, BTreeMap::from([(1, 10), (2, 5)]));
    }

    #[test]
    fn test_reserve_whole_stock_then_restore() {
        let mut levels = BTreeMap::from([(789, 2)]);
        let plan = StockPlan::for_basket(&basket(&[(789, 2)]));
        plan.reserve(&mut levels).unwrap();
        assert_eq!(levels[&789], 0);
        plan.restore(&mut levels);
        assert_eq!(levels[&789], 2);
    }

    #[test]
    fn test_missing_product() {
        let mut levels = BTreeMap::new();
        let err = StockPlan::for_basket(&basket(&[(5, 1)])).reserve(&mut levels).unwrap_err();
        assert_eq!(err, StockError::ProductMissing { product_id: 5 });
    }
}
