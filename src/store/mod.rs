//! Persistence seam.
//!
//! Repository traits return plain aggregates. Every mutating method is one
//! transaction: [`PgStore`] uses a sqlx transaction with row locks, while
//! [`MemoryStore`] holds a single mutex for the duration of the call. Both
//! implementations run the same order rules from this module against the rows
//! they have locked, so they agree on semantics.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

use crate::domain::aggregates::{
    Admin, Basket, Order, OrderStatusLog, OrderSummary, Product, ProductDetails, ProductStatus, Shop, StatusChange, User,
};
use crate::domain::flow::{FlowError, OrderStatusFlow};
use crate::domain::pricing::{price_basket, CatalogSnapshot};
use crate::domain::stock::StockPlan;
use crate::domain::value_objects::PageRequest;
use crate::error::{AppError, AppResult};

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Debug, Serialize)]
pub struct Page<T> {
    pub data: Vec<T>,
    pub total: i64,
    pub page: u32,
    #[serde(rename = "pageSize")]
    pub page_size: u32,
}

impl<T> Page<T> {
    pub fn new(data: Vec<T>, total: i64, req: PageRequest) -> Self {
        Self { data, total, page: req.page(), page_size: req.page_size() }
    }

    pub fn empty(req: PageRequest) -> Self {
        Self::new(vec![], 0, req)
    }
}

/// Filters for order lists. All present filters combine with AND.
#[derive(Clone, Debug, Default)]
pub struct OrderQuery {
    pub shop_id: i64,
    pub user_id: Option<i64>,
    pub statuses: Option<Vec<i32>>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
}

impl OrderQuery {
    pub fn for_shop(shop_id: i64) -> Self {
        Self { shop_id, ..Default::default() }
    }

    pub fn matches(&self, order: &OrderSummary) -> bool {
        order.shop_id == self.shop_id
            && self.user_id.map_or(true, |u| order.user_id == u)
            && self.statuses.as_ref().map_or(true, |s| s.contains(&order.status))
            && self.start_time.map_or(true, |t| order.created_at >= t)
            && self.end_time.map_or(true, |t| order.created_at <= t)
    }
}

#[derive(Clone, Debug)]
pub struct NewOrder {
    pub user_id: i64,
    pub shop_id: i64,
    pub remark: String,
    pub basket: Basket,
}

#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Price, reserve stock and persist the order with its initial status log.
    async fn create_order(&self, new: NewOrder) -> AppResult<Order>;
    async fn get_order(&self, id: i64, shop_id: i64) -> AppResult<Order>;
    async fn list_orders(&self, query: &OrderQuery, page: PageRequest) -> AppResult<Page<OrderSummary>>;
    /// Replace an open order's items, moving stock from the old basket to the new one.
    async fn replace_items(&self, id: i64, shop_id: i64, basket: Basket, remark: Option<String>) -> AppResult<Order>;
    async fn change_status(&self, id: i64, shop_id: i64, next: i32) -> AppResult<StatusChange>;
    /// Delete the order and its children. `NotFound` when no order row was removed.
    async fn delete_order(&self, id: i64, shop_id: i64) -> AppResult<()>;
    async fn status_logs(&self, id: i64, shop_id: i64) -> AppResult<Vec<OrderStatusLog>>;
}

#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn create_product(&self, product: Product) -> AppResult<Product>;
    async fn get_product(&self, id: i64, shop_id: i64) -> AppResult<Product>;
    async fn list_products(&self, shop_id: i64, status: Option<ProductStatus>, page: PageRequest) -> AppResult<Page<Product>>;
    /// Lock the product, overwrite its editable fields, replace the option tree
    /// and move stock by `stock_delta` relative to the locked level.
    async fn update_product(&self, id: i64, shop_id: i64, details: ProductDetails, stock_delta: i32) -> AppResult<Product>;
    async fn change_product_status(&self, id: i64, shop_id: i64, next: ProductStatus) -> AppResult<Product>;
    /// Refused with `PreconditionFailed` while any order item references the product.
    async fn delete_product(&self, id: i64, shop_id: i64) -> AppResult<()>;
}

#[async_trait]
pub trait ShopStore: Send + Sync {
    async fn create_shop(&self, shop: Shop) -> AppResult<Shop>;
    async fn get_shop(&self, id: i64) -> AppResult<Shop>;
    async fn find_shop_by_owner(&self, owner_username: &str) -> AppResult<Option<Shop>>;
    async fn list_shops(&self, page: PageRequest) -> AppResult<Page<Shop>>;
    async fn update_shop(&self, shop: &Shop) -> AppResult<()>;
    /// Install a new flow unless an existing order rests on a status it drops.
    async fn update_flow(&self, id: i64, flow: OrderStatusFlow) -> AppResult<()>;
    /// Refused with `PreconditionFailed` while products or orders exist.
    async fn delete_shop(&self, id: i64) -> AppResult<()>;
}

#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn create_user(&self, user: User) -> AppResult<User>;
    async fn find_user(&self, name: &str) -> AppResult<Option<User>>;
    async fn find_admin(&self, username: &str) -> AppResult<Option<Admin>>;
    async fn count_admins(&self) -> AppResult<i64>;
    async fn create_admin(&self, username: &str, password_hash: &str) -> AppResult<Admin>;
    async fn blacklist_token(&self, jti: &str, expires_at: DateTime<Utc>) -> AppResult<()>;
    async fn is_token_blacklisted(&self, jti: &str) -> AppResult<bool>;
    async fn purge_expired_tokens(&self, now: DateTime<Utc>) -> AppResult<u64>;
}

/// Build a new order from rows locked by the caller, reserving stock in `levels`.
pub(crate) fn materialize_order(
    new: NewOrder,
    flow: &OrderStatusFlow,
    catalog: &CatalogSnapshot,
    levels: &mut BTreeMap<i64, i32>,
) -> AppResult<Order> {
    let status = flow
        .initial_status()
        .ok_or_else(|| AppError::precondition("shop status flow has no open status"))?;
    let priced = price_basket(&new.basket, new.shop_id, catalog)?;
    StockPlan::for_basket(&new.basket).reserve(levels)?;
    Ok(Order::create(new.user_id, new.shop_id, status, new.remark, priced))
}

/// Swap an open order's basket: old quantities go back, new ones are reserved.
pub(crate) fn rebasket_order(
    order: &mut Order,
    basket: &Basket,
    flow: &OrderStatusFlow,
    catalog: &CatalogSnapshot,
    levels: &mut BTreeMap<i64, i32>,
) -> AppResult<()> {
    if flow.is_final(order.status) {
        return Err(FlowError::TerminalStatus(order.status).into());
    }
    let priced = price_basket(basket, order.shop_id, catalog)?;
    StockPlan::for_items(&order.items).restore(levels);
    StockPlan::for_basket(basket).reserve(levels)?;
    order.replace_items(priced);
    Ok(())
}

/// Admit `next` under `flow` and apply it. Entering a final cancellation node
/// yields the stock to hand back.
pub(crate) fn advance_status(
    order: &mut Order,
    next: i32,
    flow: &OrderStatusFlow,
    at: DateTime<Utc>,
) -> AppResult<(StatusChange, OrderStatusLog, Option<StockPlan>)> {
    let target = flow.check_transition(order.status, next)?;
    let restock = target.is_cancellation().then(|| StockPlan::for_items(&order.items));
    let (change, log) = order.apply_status(next, at);
    Ok((change, log, restock))
}

/// Stock to hand back when deleting: only orders not yet in a final status.
pub(crate) fn restock_on_delete(order: &Order, flow: &OrderStatusFlow) -> Option<StockPlan> {
    (!flow.is_final(order.status)).then(|| StockPlan::for_items(&order.items))
}

/// Statuses in use that `flow` would no longer know about.
pub(crate) fn orphaned_statuses(in_use: &[i32], flow: &OrderStatusFlow) -> Vec<i32> {
    let mut orphans: Vec<i32> = in_use.iter().copied().filter(|s| !flow.contains(*s)).collect();
    orphans.sort_unstable();
    orphans.dedup();
    orphans
}

pub(crate) fn orphaned_error(orphans: &[i32]) -> AppError {
    AppError::precondition(format!("orders still rest on statuses {orphans:?} removed by the new flow"))
}
