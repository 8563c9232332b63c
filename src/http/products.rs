//! Shop-owner catalog endpoints and public storefront reads.

use axum::{
    extract::{Path, State},
    routing::{get, post, put},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};

use super::extract::{ApiJson, ApiQuery, IdParam, PageParams};
use crate::auth::OwnerPrincipal;
use crate::domain::aggregates::{Product, ProductDraft};
use crate::error::AppResult;
use crate::service::{ProductStatusRequest, UpdateProductRequest};
use crate::state::AppState;
use crate::store::Page;

#[derive(Debug, Deserialize)]
pub struct StorefrontProductParams {
    pub id: i64,
    pub shop_id: i64,
}

pub fn owner_routes() -> Router<AppState> {
    Router::new()
        .route("/product/create", post(create))
        .route("/product/update", put(update))
        .route("/product/toggle-status", put(toggle_status))
        .route("/product", get(detail).delete(remove))
        .route("/product/list", get(list))
}

async fn create(
    State(state): State<AppState>,
    OwnerPrincipal(owner): OwnerPrincipal,
    ApiJson(draft): ApiJson<ProductDraft>,
) -> AppResult<Json<Product>> {
    Ok(Json(state.catalog.create(owner.id, draft).await?))
}

async fn update(
    State(state): State<AppState>,
    OwnerPrincipal(owner): OwnerPrincipal,
    ApiJson(req): ApiJson<UpdateProductRequest>,
) -> AppResult<Json<Product>> {
    Ok(Json(state.catalog.update(owner.id, req).await?))
}

async fn toggle_status(
    State(state): State<AppState>,
    OwnerPrincipal(owner): OwnerPrincipal,
    ApiJson(req): ApiJson<ProductStatusRequest>,
) -> AppResult<Json<Product>> {
    Ok(Json(state.catalog.toggle_status(owner.id, req).await?))
}

async fn detail(
    State(state): State<AppState>,
    OwnerPrincipal(owner): OwnerPrincipal,
    ApiQuery(q): ApiQuery<IdParam>,
) -> AppResult<Json<Product>> {
    Ok(Json(state.catalog.get(owner.id, q.id).await?))
}

async fn list(
    State(state): State<AppState>,
    OwnerPrincipal(owner): OwnerPrincipal,
    ApiQuery(q): ApiQuery<PageParams>,
) -> AppResult<Json<Page<Product>>> {
    Ok(Json(state.catalog.list(owner.id, q.request()?).await?))
}

async fn remove(
    State(state): State<AppState>,
    OwnerPrincipal(owner): OwnerPrincipal,
    ApiQuery(q): ApiQuery<IdParam>,
) -> AppResult<Json<Value>> {
    state.catalog.delete(owner.id, q.id).await?;
    Ok(Json(json!({ "message": "product deleted", "id": q.id })))
}

pub async fn storefront(
    State(state): State<AppState>,
    Path(shop_id): Path<i64>,
    ApiQuery(q): ApiQuery<PageParams>,
) -> AppResult<Json<Page<Product>>> {
    Ok(Json(state.catalog.storefront(shop_id, q.request()?).await?))
}

pub async fn storefront_product(
    State(state): State<AppState>,
    ApiQuery(q): ApiQuery<StorefrontProductParams>,
) -> AppResult<Json<Product>> {
    Ok(Json(state.catalog.storefront_product(q.shop_id, q.id).await?))
}
