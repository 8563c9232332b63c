//! Shop administration (admin), self-service (owner) and public shop info.

use axum::{
    extract::{Path, State},
    routing::{delete, get, post, put},
    Json, Router,
};
use serde_json::{json, Value};

use super::extract::{ApiJson, ApiQuery, IdParam, PageParams};
use crate::auth::OwnerPrincipal;
use crate::domain::aggregates::{PublicShop, Shop, ShopDraft, ShopPatch};
use crate::domain::flow::OrderStatusFlow;
use crate::error::AppResult;
use crate::service::UpdateShopRequest;
use crate::state::AppState;
use crate::store::Page;

pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/shop/create", post(create))
        .route("/shop/update", put(admin_update))
        .route("/shop/detail", get(admin_detail))
        .route("/shop/list", get(list))
        .route("/shop", delete(remove))
}

pub fn owner_routes() -> Router<AppState> {
    Router::new()
        .route("/shop/detail", get(owner_detail))
        .route("/shop/update", put(owner_update))
        .route("/shop/status-flow", put(update_flow))
}

async fn create(State(state): State<AppState>, ApiJson(draft): ApiJson<ShopDraft>) -> AppResult<Json<Shop>> {
    Ok(Json(state.shops.create(draft).await?))
}

async fn admin_update(State(state): State<AppState>, ApiJson(req): ApiJson<UpdateShopRequest>) -> AppResult<Json<Shop>> {
    Ok(Json(state.shops.update_as_admin(req).await?))
}

async fn admin_detail(State(state): State<AppState>, ApiQuery(q): ApiQuery<IdParam>) -> AppResult<Json<Shop>> {
    Ok(Json(state.shops.detail(q.id).await?))
}

async fn list(State(state): State<AppState>, ApiQuery(q): ApiQuery<PageParams>) -> AppResult<Json<Page<Shop>>> {
    Ok(Json(state.shops.list(q.request()?).await?))
}

async fn remove(State(state): State<AppState>, ApiQuery(q): ApiQuery<IdParam>) -> AppResult<Json<Value>> {
    state.shops.delete(q.id).await?;
    Ok(Json(json!({ "message": "shop deleted", "id": q.id })))
}

async fn owner_detail(State(state): State<AppState>, OwnerPrincipal(owner): OwnerPrincipal) -> AppResult<Json<Shop>> {
    Ok(Json(state.shops.detail(owner.id).await?))
}

async fn owner_update(
    State(state): State<AppState>,
    OwnerPrincipal(owner): OwnerPrincipal,
    ApiJson(patch): ApiJson<ShopPatch>,
) -> AppResult<Json<Shop>> {
    Ok(Json(state.shops.update_as_owner(owner.id, patch).await?))
}

async fn update_flow(
    State(state): State<AppState>,
    OwnerPrincipal(owner): OwnerPrincipal,
    ApiJson(flow): ApiJson<OrderStatusFlow>,
) -> AppResult<Json<OrderStatusFlow>> {
    Ok(Json(state.shops.update_flow(owner.id, flow).await?))
}

pub async fn public_shop(State(state): State<AppState>, Path(shop_id): Path<i64>) -> AppResult<Json<PublicShop>> {
    Ok(Json(state.shops.public(shop_id).await?))
}
