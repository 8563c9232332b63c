//! Order Aggregate
//!
//! An [`Order`] exclusively owns its items, and each item owns its chosen
//! options. Items carry snapshot copies of the product and option data taken
//! when the order was priced, so later catalog edits never change what an order
//! reports. Totals are always re-derived from the items.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::pricing::{PricedBasket, PricedItem};
use crate::domain::value_objects::{snowflake_id, Money, Quantity};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: i64,
    pub user_id: i64,
    pub shop_id: i64,
    pub total_price: Money,
    pub status: i32,
    pub remark: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub items: Vec<OrderItem>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: i64,
    pub order_id: i64,
    pub product_id: i64,
    pub quantity: Quantity,
    pub unit_price: Money,
    pub total_price: Money,
    pub product_name: String,
    pub product_description: String,
    pub product_image_url: String,
    pub options: Vec<OrderItemOption>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OrderItemOption {
    pub id: i64,
    pub order_item_id: i64,
    pub category_id: i64,
    pub option_id: i64,
    pub option_name: String,
    pub category_name: String,
    pub price_adjustment: Money,
}

/// Append-only audit entry. `old_status` is `None` for the entry written at creation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderStatusLog {
    pub id: i64,
    pub order_id: i64,
    pub old_status: Option<i32>,
    pub new_status: i32,
    pub changed_time: DateTime<Utc>,
}

/// List projection: the order row without items.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct OrderSummary {
    pub id: i64,
    pub user_id: i64,
    pub shop_id: i64,
    pub total_price: Money,
    pub status: i32,
    pub remark: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Outcome of an admitted status transition.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct StatusChange {
    pub order_id: i64,
    pub old_status: i32,
    pub new_status: i32,
    pub changed_time: DateTime<Utc>,
}

impl Order {
    pub fn create(user_id: i64, shop_id: i64, status: i32, remark: impl Into<String>, priced: PricedBasket) -> Self {
        let id = snowflake_id();
        let now = Utc::now();
        let mut order = Self {
            id, user_id, shop_id, total_price: Money::zero(), status, remark: remark.into(),
            created_at: now, updated_at: now, items: vec![],
        };
        order.replace_items(priced);
        order.updated_at = now;
        order
    }

    /// Swap the whole basket for a newly priced one. The order id is stable,
    /// item and option ids are regenerated.
    pub fn replace_items(&mut self, priced: PricedBasket) {
        let order_id = self.id;
        self.items = priced.items.into_iter().map(|p| OrderItem::from_priced(order_id, p)).collect();
        self.recalculate();
    }

    pub fn initial_log(&self) -> OrderStatusLog {
        OrderStatusLog { id: snowflake_id(), order_id: self.id, old_status: None, new_status: self.status, changed_time: self.created_at }
    }

    /// Record an already-admitted transition and return its audit entry.
    /// The stamp never precedes the order's previous `updated_at`, even if the
    /// caller's clock lags the one that wrote the row.
    pub fn apply_status(&mut self, next: i32, at: DateTime<Utc>) -> (StatusChange, OrderStatusLog) {
        let at = at.max(self.updated_at);
        let old = self.status;
        self.status = next;
        self.updated_at = at;
        let change = StatusChange { order_id: self.id, old_status: old, new_status: next, changed_time: at };
        let log = OrderStatusLog { id: snowflake_id(), order_id: self.id, old_status: Some(old), new_status: next, changed_time: at };
        (change, log)
    }

    pub fn summary(&self) -> OrderSummary {
        OrderSummary {
            id: self.id, user_id: self.user_id, shop_id: self.shop_id, total_price: self.total_price,
            status: self.status, remark: self.remark.clone(), created_at: self.created_at, updated_at: self.updated_at,
        }
    }

    fn recalculate(&mut self) {
        self.total_price = self.items.iter().map(|i| i.total_price).sum();
        self.touch();
    }

    fn touch(&mut self) { self.updated_at = Utc::now(); }
}

impl OrderItem {
    fn from_priced(order_id: i64, p: PricedItem) -> Self {
        let id = snowflake_id();
        Self {
            id, order_id, product_id: p.product_id, quantity: p.quantity, unit_price: p.unit_price,
            total_price: p.total_price, product_name: p.product_name, product_description: p.product_description,
            product_image_url: p.product_image_url,
            options: p.options.into_iter().map(|o| OrderItemOption {
                id: snowflake_id(), order_item_id: id, category_id: o.category_id, option_id: o.option_id,
                option_name: o.option_name, category_name: o.category_name, price_adjustment: o.price_adjustment,
            }).collect(),
        }
    }
}
