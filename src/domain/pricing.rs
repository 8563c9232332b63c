//! Pricing and snapshot calculation.
//!
//! [`CatalogSnapshot`] is the consistent view of the catalog rows an order
//! references, read inside the same transaction that reserves stock.
//! [`price_basket`] turns a basket plus that snapshot into priced lines carrying
//! copies of every human-readable name and price they were computed from.

use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;

use crate::domain::aggregates::{Basket, Product, ProductStatus};
use crate::domain::value_objects::{Money, Quantity};

#[derive(Clone, Debug)]
pub struct CatalogProduct {
    pub id: i64,
    pub shop_id: i64,
    pub name: String,
    pub description: String,
    pub image_url: String,
    pub price: Money,
    pub stock: i32,
    pub status: ProductStatus,
}

#[derive(Clone, Debug)]
pub struct CatalogCategory {
    pub id: i64,
    pub product_id: i64,
    pub name: String,
    pub is_required: bool,
    pub is_multiple: bool,
}

#[derive(Clone, Debug)]
pub struct CatalogOption {
    pub id: i64,
    pub category_id: i64,
    pub name: String,
    pub price_adjustment: Money,
}

#[derive(Clone, Debug, Default)]
pub struct CatalogSnapshot {
    products: HashMap<i64, CatalogProduct>,
    categories: HashMap<i64, CatalogCategory>,
    options: HashMap<i64, CatalogOption>,
}

impl CatalogSnapshot {
    pub fn new(products: Vec<CatalogProduct>, categories: Vec<CatalogCategory>, options: Vec<CatalogOption>) -> Self {
        Self {
            products: products.into_iter().map(|p| (p.id, p)).collect(),
            categories: categories.into_iter().map(|c| (c.id, c)).collect(),
            options: options.into_iter().map(|o| (o.id, o)).collect(),
        }
    }

    pub fn from_products<'a>(products: impl IntoIterator<Item = &'a Product>) -> Self {
        let mut snapshot = Self::default();
        for p in products {
            snapshot.products.insert(p.id, CatalogProduct {
                id: p.id, shop_id: p.shop_id, name: p.name.clone(), description: p.description.clone(),
                image_url: p.image_url.clone(), price: p.price, stock: p.stock, status: p.status,
            });
            for c in &p.option_categories {
                snapshot.categories.insert(c.id, CatalogCategory {
                    id: c.id, product_id: p.id, name: c.name.clone(), is_required: c.is_required, is_multiple: c.is_multiple,
                });
                for o in &c.options {
                    snapshot.options.insert(o.id, CatalogOption {
                        id: o.id, category_id: c.id, name: o.name.clone(), price_adjustment: o.price_adjustment,
                    });
                }
            }
        }
        snapshot
    }

    /// Tenant-scoped: a product of another shop is simply not found.
    pub fn find_product(&self, product_id: i64, shop_id: i64) -> Option<&CatalogProduct> {
        self.products.get(&product_id).filter(|p| p.shop_id == shop_id)
    }

    pub fn find_option(&self, option_id: i64) -> Option<&CatalogOption> {
        self.options.get(&option_id)
    }

    pub fn find_option_category(&self, category_id: i64) -> Option<&CatalogCategory> {
        self.categories.get(&category_id)
    }

    pub fn stock_levels(&self) -> BTreeMap<i64, i32> {
        self.products.values().map(|p| (p.id, p.stock)).collect()
    }

    fn categories_of(&self, product_id: i64) -> impl Iterator<Item = &CatalogCategory> {
        self.categories.values().filter(move |c| c.product_id == product_id)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PricedBasket {
    pub items: Vec<PricedItem>,
    pub total: Money,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PricedItem {
    pub product_id: i64,
    pub quantity: Quantity,
    pub unit_price: Money,
    pub total_price: Money,
    pub product_name: String,
    pub product_description: String,
    pub product_image_url: String,
    pub options: Vec<PricedOption>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PricedOption {
    pub category_id: i64,
    pub option_id: i64,
    pub option_name: String,
    pub category_name: String,
    pub price_adjustment: Money,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PricingError {
    #[error("product {0} not found")]
    ProductNotFound(i64),
    #[error("product {0} is not available for ordering")]
    ProductUnavailable(i64),
    #[error("option {option_id} does not belong to product {product_id}")]
    InvalidOption { product_id: i64, option_id: i64 },
    #[error("only one option of category {category_id} may be chosen for product {product_id}")]
    SingleChoiceViolated { product_id: i64, category_id: i64 },
    #[error("category {category_id} of product {product_id} requires an option")]
    MissingRequiredOption { product_id: i64, category_id: i64 },
    #[error("price of product {0} with its options falls below zero")]
    PriceBelowZero(i64),
    #[error("order total exceeds the largest storable amount")]
    TotalTooLarge,
}

/// Price every basket line: `(price + Σ adjustments) × quantity`, order total
/// is the sum of line totals.
pub fn price_basket(basket: &Basket, shop_id: i64, catalog: &CatalogSnapshot) -> Result<PricedBasket, PricingError> {
    let mut items = Vec::with_capacity(basket.items().len());
    for line in basket.items() {
        let product = catalog.find_product(line.product_id, shop_id).ok_or(PricingError::ProductNotFound(line.product_id))?;
        if product.status != ProductStatus::Online {
            return Err(PricingError::ProductUnavailable(product.id));
        }

        let mut options = Vec::with_capacity(line.options.len());
        let mut chosen: HashMap<i64, usize> = HashMap::new();
        for choice in &line.options {
            let invalid = PricingError::InvalidOption { product_id: product.id, option_id: choice.option_id };
            let option = catalog.find_option(choice.option_id).ok_or(invalid.clone())?;
            let category = catalog.find_option_category(option.category_id).ok_or(invalid.clone())?;
            if category.product_id != product.id || category.id != choice.category_id {
                return Err(invalid);
            }
            let count = chosen.entry(category.id).or_default();
            *count += 1;
            if *count > 1 && !category.is_multiple {
                return Err(PricingError::SingleChoiceViolated { product_id: product.id, category_id: category.id });
            }
            options.push(PricedOption {
                category_id: category.id, option_id: option.id, option_name: option.name.clone(),
                category_name: category.name.clone(), price_adjustment: option.price_adjustment,
            });
        }
        if let Some(missing) = catalog.categories_of(product.id).find(|c| c.is_required && !chosen.contains_key(&c.id)) {
            return Err(PricingError::MissingRequiredOption { product_id: product.id, category_id: missing.id });
        }

        let per_unit = product.price + options.iter().map(|o| o.price_adjustment).sum::<Money>();
        if per_unit.is_negative() {
            return Err(PricingError::PriceBelowZero(product.id));
        }
        let total_price = per_unit.times(line.quantity);
        if total_price > Money::MAX {
            return Err(PricingError::TotalTooLarge);
        }
        items.push(PricedItem {
            product_id: product.id, quantity: line.quantity, unit_price: product.price,
            total_price, product_name: product.name.clone(),
            product_description: product.description.clone(), product_image_url: product.image_url.clone(), options,
        });
    }
    let total: Money = items.iter().map(|i| i.total_price).sum();
    if total > Money::MAX {
        return Err(PricingError::TotalTooLarge);
    }
    Ok(PricedBasket { items, total })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::{BasketItem, BasketOption};

    fn catalog(option_owner: i64) -> CatalogSnapshot {
        CatalogSnapshot::new(
            vec![
                CatalogProduct {
                    id: 789, shop_id: 456, name: "Test Product".into(), description: "desc".into(), image_url: "p.png".into(),
                    price: Money::from(10000), stock: 10, status: ProductStatus::Online,
                },
                CatalogProduct {
                    id: 888, shop_id: 456, name: "Other".into(), description: String::new(), image_url: String::new(),
                    price: Money::from(1), stock: 10, status: ProductStatus::Online,
                },
            ],
            vec![CatalogCategory { id: 200, product_id: option_owner, name: "Size".into(), is_required: false, is_multiple: false }],
            vec![
                CatalogOption { id: 100, category_id: 200, name: "Large".into(), price_adjustment: Money::from(500) },
                CatalogOption { id: 101, category_id: 200, name: "Small".into(), price_adjustment: Money::from(-20000) },
            ],
        )
    }

    fn basket(product_id: i64, qty: u32, options: &[i64]) -> Basket {
        Basket::new(vec![BasketItem {
            product_id,
            quantity: Quantity::new(qty).unwrap(),
            options: options.iter().map(|&option_id| BasketOption { category_id: 200, option_id }).collect(),
        }])
        .unwrap()
    }

    #[test]
    fn test_price_with_option_and_snapshot() {
        let priced = price_basket(&basket(789, 2, &[100]), 456, &catalog(789)).unwrap();
        assert_eq!(priced.total, Money::from(21000));
        let item = &priced.items[0];
        assert_eq!(item.unit_price, Money::from(10000));
        assert_eq!(item.total_price, Money::from(21000));
        assert_eq!(item.product_name, "Test Product");
        assert_eq!(item.options[0].option_name, "Large");
        assert_eq!(item.options[0].category_name, "Size");
    }

    #[test]
    fn test_option_of_another_product_is_invalid() {
        let err = price_basket(&basket(789, 1, &[100]), 456, &catalog(888)).unwrap_err();
        assert_eq!(err, PricingError::InvalidOption { product_id: 789, option_id: 100 });
    }

    #[test]
    fn test_other_tenant_product_is_not_found() {
        let err = price_basket(&basket(789, 1, &[]), 999, &catalog(789)).unwrap_err();
        assert_eq!(err, PricingError::ProductNotFound(789));
    }

    #[test]
    fn test_negative_unit_price_is_rejected() {
        let err = price_basket(&basket(789, 1, &[101]), 456, &catalog(789)).unwrap_err();
        assert_eq!(err, PricingError::PriceBelowZero(789));
    }

    #[test]
    fn test_single_choice_category() {
        let err = price_basket(&basket(789, 1, &[100, 101]), 456, &catalog(789)).unwrap_err();
        assert_eq!(err, PricingError::SingleChoiceViolated { product_id: 789, category_id: 200 });
    }

    #[test]
    fn test_required_category_must_be_chosen() {
        let mut c = catalog(789);
        c.categories.get_mut(&200).unwrap().is_required = true;
        let err = price_basket(&basket(789, 1, &[]), 456, &c).unwrap_err();
        assert_eq!(err, PricingError::MissingRequiredOption { product_id: 789, category_id: 200 });
    }

    #[test]
    fn test_total_beyond_column_range_is_rejected() {
        let mut c = catalog(789);
        c.products.get_mut(&789).unwrap().price = Money::parse("9000000000").unwrap();
        assert!(price_basket(&basket(789, 1, &[]), 456, &c).is_ok());
        assert_eq!(price_basket(&basket(789, 2, &[]), 456, &c).unwrap_err(), PricingError::TotalTooLarge);

        let two_lines = Basket::new(vec![
            BasketItem { product_id: 789, quantity: Quantity::new(1).unwrap(), options: vec![] },
            BasketItem { product_id: 888, quantity: Quantity::new(1).unwrap(), options: vec![] },
        ])
        .unwrap();
        c.products.get_mut(&888).unwrap().price = Money::parse("1000000000").unwrap();
        assert_eq!(price_basket(&two_lines, 456, &c).unwrap_err(), PricingError::TotalTooLarge);
    }

    #[test]
    fn test_offline_product_cannot_be_ordered() {
        let mut c = catalog(789);
        c.products.get_mut(&789).unwrap().status = ProductStatus::Offline;
        assert_eq!(price_basket(&basket(789, 1, &[]), 456, &c).unwrap_err(), PricingError::ProductUnavailable(789));
    }
}
