//! HTTP surface: one axum router under `/api/order-ease/v1`.
//!
//! Public routes (logins, registration, storefront, health) need no token.
//! `/admin`, `/shopOwner` and `/user` groups run [`require_auth`] and then a
//! role guard, so a handler only ever sees a caller of the group's role.

pub mod auth;
pub mod events;
pub mod extract;
pub mod orders;
pub mod products;
pub mod rate_limit;
pub mod shops;

use axum::{
    extract::Request,
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::auth::{require_auth, AdminPrincipal, OwnerPrincipal, UserPrincipal};
use crate::state::AppState;

pub const API_PREFIX: &str = "/api/order-ease/v1";

pub fn router(state: AppState) -> Router {
    let public = Router::new()
        .route("/health", get(health))
        .route("/admin/login", post(auth::admin_login))
        .route("/shopOwner/login", post(auth::owner_login))
        .route("/user/login", post(auth::user_login))
        .route("/user/register", post(auth::register))
        .route("/shop/product", get(products::storefront_product))
        .route("/shop/:shop_id", get(shops::public_shop))
        .route("/shop/:shop_id/products", get(products::storefront));

    let admin = Router::new()
        .merge(shops::admin_routes())
        .merge(orders::routes())
        .route_layer(middleware::from_fn(admin_only));

    let owner = Router::new()
        .merge(shops::owner_routes())
        .merge(products::owner_routes())
        .merge(orders::routes())
        .route_layer(middleware::from_fn(owner_only));

    let customer = orders::customer_routes().route_layer(middleware::from_fn(customer_only));

    let protected = Router::new()
        .route("/logout", post(auth::logout))
        .nest("/admin", admin)
        .nest("/shopOwner", owner)
        .nest("/user", customer)
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .nest(API_PREFIX, public.merge(protected))
        .layer(middleware::from_fn_with_state(state.clone(), rate_limit::rate_limit))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "healthy", "service": "orderease" }))
}

async fn admin_only(_: AdminPrincipal, req: Request, next: Next) -> Response {
    next.run(req).await
}

async fn owner_only(_: OwnerPrincipal, req: Request, next: Next) -> Response {
    next.run(req).await
}

async fn customer_only(_: UserPrincipal, req: Request, next: Next) -> Response {
    next.run(req).await
}
