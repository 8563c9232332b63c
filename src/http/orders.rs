//! Order endpoints, mounted under `/admin` and `/shopOwner` (full set) and
//! `/user` (create and read own orders).

use axum::{
    extract::State,
    routing::{get, post, put},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};

use super::events;
use super::extract::{ApiJson, ApiQuery, ShopPageParams};
use crate::auth::Principal;
use crate::domain::aggregates::{Order, OrderStatusLog, OrderSummary, StatusChange};
use crate::domain::flow::OrderStatusFlow;
use crate::domain::value_objects::PageRequest;
use crate::error::AppResult;
use crate::service::{Actor, CreateOrderRequest, CreatedOrder, OrderSearch, ToggleStatusRequest, UpdateOrderRequest};
use crate::state::AppState;
use crate::store::Page;

#[derive(Debug, Deserialize)]
pub struct OrderParams {
    pub id: i64,
    pub shop_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct UserOrderParams {
    pub user_id: Option<i64>,
    pub shop_id: Option<i64>,
    pub page: Option<i64>,
    #[serde(rename = "pageSize")]
    pub page_size: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct ShopParams {
    pub shop_id: Option<i64>,
}

/// Back-office order routes shared by administrators and shop owners.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/order/create", post(create))
        .route("/order", get(detail).delete(remove))
        .route("/order/list", get(list))
        .route("/order/user", get(list_for_user))
        .route("/order/advance-search", post(search))
        .route("/order/unfinished", get(unfinished))
        .route("/order/toggle-status", put(toggle_status))
        .route("/order/update", put(update))
        .route("/order/status-flow", get(status_flow))
        .route("/order/status-logs", get(status_logs))
        .route("/order/events", get(events::order_events))
}

/// Storefront customer routes.
pub fn customer_routes() -> Router<AppState> {
    Router::new()
        .route("/order/create", post(create))
        .route("/order", get(detail))
        .route("/order/list", get(list))
}

async fn create(
    State(state): State<AppState>,
    principal: Principal,
    ApiJson(req): ApiJson<CreateOrderRequest>,
) -> AppResult<Json<CreatedOrder>> {
    Ok(Json(state.orders.create(Actor::from(&principal), req).await?))
}

async fn detail(
    State(state): State<AppState>,
    principal: Principal,
    ApiQuery(q): ApiQuery<OrderParams>,
) -> AppResult<Json<Order>> {
    Ok(Json(state.orders.get(Actor::from(&principal), q.id, q.shop_id).await?))
}

async fn list(
    State(state): State<AppState>,
    principal: Principal,
    ApiQuery(q): ApiQuery<ShopPageParams>,
) -> AppResult<Json<Page<OrderSummary>>> {
    let page = q.request()?;
    Ok(Json(state.orders.list(Actor::from(&principal), q.shop_id, page).await?))
}

async fn list_for_user(
    State(state): State<AppState>,
    principal: Principal,
    ApiQuery(q): ApiQuery<UserOrderParams>,
) -> AppResult<Json<Page<OrderSummary>>> {
    let page = PageRequest::new(q.page, q.page_size)?;
    Ok(Json(state.orders.list_for_user(Actor::from(&principal), q.user_id, q.shop_id, page).await?))
}

async fn search(
    State(state): State<AppState>,
    principal: Principal,
    ApiJson(req): ApiJson<OrderSearch>,
) -> AppResult<Json<Page<OrderSummary>>> {
    Ok(Json(state.orders.search(Actor::from(&principal), req).await?))
}

async fn unfinished(
    State(state): State<AppState>,
    principal: Principal,
    ApiQuery(q): ApiQuery<ShopPageParams>,
) -> AppResult<Json<Page<OrderSummary>>> {
    let page = q.request()?;
    Ok(Json(state.orders.unfinished(Actor::from(&principal), q.shop_id, page).await?))
}

async fn toggle_status(
    State(state): State<AppState>,
    principal: Principal,
    ApiJson(req): ApiJson<ToggleStatusRequest>,
) -> AppResult<Json<StatusChange>> {
    Ok(Json(state.orders.toggle_status(Actor::from(&principal), req).await?))
}

async fn update(
    State(state): State<AppState>,
    principal: Principal,
    ApiJson(req): ApiJson<UpdateOrderRequest>,
) -> AppResult<Json<Order>> {
    Ok(Json(state.orders.update(Actor::from(&principal), req).await?))
}

async fn remove(
    State(state): State<AppState>,
    principal: Principal,
    ApiQuery(q): ApiQuery<OrderParams>,
) -> AppResult<Json<Value>> {
    state.orders.delete(Actor::from(&principal), q.id, q.shop_id).await?;
    Ok(Json(json!({ "message": "order deleted", "id": q.id })))
}

async fn status_flow(
    State(state): State<AppState>,
    principal: Principal,
    ApiQuery(q): ApiQuery<ShopParams>,
) -> AppResult<Json<OrderStatusFlow>> {
    Ok(Json(state.orders.status_flow(Actor::from(&principal), q.shop_id).await?))
}

async fn status_logs(
    State(state): State<AppState>,
    principal: Principal,
    ApiQuery(q): ApiQuery<OrderParams>,
) -> AppResult<Json<Vec<OrderStatusLog>>> {
    Ok(Json(state.orders.status_logs(Actor::from(&principal), q.id, q.shop_id).await?))
}
