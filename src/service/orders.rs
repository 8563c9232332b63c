//! Order lifecycle orchestration.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::instrument;
use validator::Validate;

use super::{writable_shop, Actor};
use crate::broadcast::{Broadcaster, Subscription};
use crate::domain::aggregates::{Basket, BasketItem, Order, OrderStatusLog, OrderSummary, StatusChange};
use crate::domain::events::OrderEvent;
use crate::domain::flow::OrderStatusFlow;
use crate::domain::value_objects::{Money, PageRequest};
use crate::error::{AppError, AppResult};
use crate::store::{NewOrder, OrderQuery, OrderStore, Page, ShopStore};

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateOrderRequest {
    pub user_id: Option<i64>,
    pub shop_id: Option<i64>,
    pub items: Vec<BasketItem>,
    #[serde(default)]
    #[validate(length(max = 500))]
    pub remark: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreatedOrder {
    pub order_id: i64,
    pub total_price: Money,
    pub created_at: DateTime<Utc>,
    pub status: i32,
}

impl From<&Order> for CreatedOrder {
    fn from(o: &Order) -> Self {
        Self { order_id: o.id, total_price: o.total_price, created_at: o.created_at, status: o.status }
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct UpdateOrderRequest {
    pub id: i64,
    pub shop_id: Option<i64>,
    pub items: Vec<BasketItem>,
    #[validate(length(max = 500))]
    pub remark: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ToggleStatusRequest {
    pub id: i64,
    pub shop_id: Option<i64>,
    pub next_status: i32,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OrderSearch {
    pub shop_id: Option<i64>,
    pub page: Option<i64>,
    #[serde(rename = "pageSize")]
    pub page_size: Option<i64>,
    pub user_id: Option<i64>,
    pub status: Option<Vec<i32>>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
}

#[derive(Clone)]
pub struct OrderService {
    orders: Arc<dyn OrderStore>,
    shops: Arc<dyn ShopStore>,
    broadcaster: Broadcaster,
}

impl OrderService {
    pub fn new(orders: Arc<dyn OrderStore>, shops: Arc<dyn ShopStore>, broadcaster: Broadcaster) -> Self {
        Self { orders, shops, broadcaster }
    }

    /// Price, reserve and persist a basket, then tell live subscribers.
    #[instrument(skip(self, req))]
    pub async fn create(&self, actor: Actor, req: CreateOrderRequest) -> AppResult<CreatedOrder> {
        req.validate()?;
        let shop_id = actor.shop_scope(req.shop_id)?;
        let user_id = actor.user_scope(req.user_id).ok_or_else(|| AppError::invalid("user_id is required"))?;
        writable_shop(self.shops.as_ref(), actor, shop_id).await?;
        let basket = Basket::new(req.items)?;

        let order = self.orders.create_order(NewOrder { user_id, shop_id, remark: req.remark, basket }).await?;
        tracing::info!(order_id = order.id, shop_id, user_id, total = %order.total_price, "order created");

        let created = CreatedOrder::from(&order);
        self.broadcaster.publish(OrderEvent::NewOrder(order));
        Ok(created)
    }

    pub async fn get(&self, actor: Actor, id: i64, shop_id: Option<i64>) -> AppResult<Order> {
        let shop_id = actor.shop_scope(shop_id)?;
        let order = self.orders.get_order(id, shop_id).await?;
        if let Actor::Customer { user_id } = actor {
            if order.user_id != user_id {
                return Err(AppError::not_found(format!("order {id} not found")));
            }
        }
        Ok(order)
    }

    pub async fn list(&self, actor: Actor, shop_id: Option<i64>, page: PageRequest) -> AppResult<Page<OrderSummary>> {
        let query = OrderQuery { user_id: actor.user_scope(None), ..OrderQuery::for_shop(actor.shop_scope(shop_id)?) };
        self.orders.list_orders(&query, page).await
    }

    pub async fn list_for_user(
        &self,
        actor: Actor,
        user_id: Option<i64>,
        shop_id: Option<i64>,
        page: PageRequest,
    ) -> AppResult<Page<OrderSummary>> {
        let user_id = actor.user_scope(user_id).ok_or_else(|| AppError::invalid("user_id is required"))?;
        let query = OrderQuery { user_id: Some(user_id), ..OrderQuery::for_shop(actor.shop_scope(shop_id)?) };
        self.orders.list_orders(&query, page).await
    }

    #[instrument(skip(self, search))]
    pub async fn search(&self, actor: Actor, search: OrderSearch) -> AppResult<Page<OrderSummary>> {
        let page = PageRequest::new(search.page, search.page_size)?;
        if search.status.as_ref().is_some_and(Vec::is_empty) {
            return Err(AppError::invalid("status filter must not be empty"));
        }
        if let (Some(start), Some(end)) = (search.start_time, search.end_time) {
            if start > end {
                return Err(AppError::invalid("start_time is after end_time"));
            }
        }
        let query = OrderQuery {
            shop_id: actor.shop_scope(search.shop_id)?,
            user_id: actor.user_scope(search.user_id),
            statuses: search.status,
            start_time: search.start_time,
            end_time: search.end_time,
        };
        self.orders.list_orders(&query, page).await
    }

    /// Orders resting on any non-final node of the shop's flow.
    pub async fn unfinished(&self, actor: Actor, shop_id: Option<i64>, page: PageRequest) -> AppResult<Page<OrderSummary>> {
        let shop = self.shops.get_shop(actor.shop_scope(shop_id)?).await?;
        let statuses = shop.order_status_flow.unfinished_statuses();
        if statuses.is_empty() {
            return Ok(Page::empty(page));
        }
        let query = OrderQuery { statuses: Some(statuses), ..OrderQuery::for_shop(shop.id) };
        self.orders.list_orders(&query, page).await
    }

    #[instrument(skip(self, req), fields(order_id = req.id, next = req.next_status))]
    pub async fn toggle_status(&self, actor: Actor, req: ToggleStatusRequest) -> AppResult<StatusChange> {
        let shop_id = actor.shop_scope(req.shop_id)?;
        writable_shop(self.shops.as_ref(), actor, shop_id).await?;
        let change = self.orders.change_status(req.id, shop_id, req.next_status).await?;
        tracing::info!(order_id = change.order_id, shop_id, from = change.old_status, to = change.new_status, "order status changed");
        Ok(change)
    }

    #[instrument(skip(self, req), fields(order_id = req.id))]
    pub async fn update(&self, actor: Actor, req: UpdateOrderRequest) -> AppResult<Order> {
        req.validate()?;
        let shop_id = actor.shop_scope(req.shop_id)?;
        writable_shop(self.shops.as_ref(), actor, shop_id).await?;
        let basket = Basket::new(req.items)?;
        let order = self.orders.replace_items(req.id, shop_id, basket, req.remark).await?;
        tracing::info!(order_id = order.id, shop_id, total = %order.total_price, "order items replaced");
        Ok(order)
    }

    #[instrument(skip(self))]
    pub async fn delete(&self, actor: Actor, id: i64, shop_id: Option<i64>) -> AppResult<()> {
        let shop_id = actor.shop_scope(shop_id)?;
        writable_shop(self.shops.as_ref(), actor, shop_id).await?;
        self.orders.delete_order(id, shop_id).await?;
        tracing::info!(order_id = id, shop_id, "order deleted");
        Ok(())
    }

    pub async fn status_flow(&self, actor: Actor, shop_id: Option<i64>) -> AppResult<OrderStatusFlow> {
        Ok(self.shops.get_shop(actor.shop_scope(shop_id)?).await?.order_status_flow)
    }

    pub async fn status_logs(&self, actor: Actor, id: i64, shop_id: Option<i64>) -> AppResult<Vec<OrderStatusLog>> {
        self.orders.status_logs(id, actor.shop_scope(shop_id)?).await
    }

    /// Attach a live subscriber to a shop's new-order feed.
    pub async fn subscribe(&self, actor: Actor, shop_id: Option<i64>) -> AppResult<Subscription> {
        let shop = self.shops.get_shop(actor.shop_scope(shop_id)?).await?;
        Ok(self.broadcaster.subscribe(shop.id))
    }
}
