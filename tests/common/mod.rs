#![allow(dead_code)]

use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use chrono::{Duration, Utc};
use serde_json::Value;
use tower::ServiceExt;

use orderease::auth::{hash_password, JwtService, Role};
use orderease::domain::aggregates::{OptionCategory, Product, ProductOption, ProductStatus, Shop, ShopDraft};
use orderease::domain::flow::OrderStatusFlow;
use orderease::domain::value_objects::Money;
use orderease::store::{CatalogStore, MemoryStore, ShopStore};
use orderease::{router, AppState};

pub const SECRET: &str = "integration-test-secret-0123456789abcdef";
pub const OWNER_PASSWORD: &str = "owner-secret";

pub struct TestApp {
    pub app: Router,
    pub store: MemoryStore,
    pub state: AppState,
    jwt: JwtService,
}

impl TestApp {
    /// Shop 456 sells product 789 (price 10000, stock 10) with option 100 "Large"
    /// (+500) in category 200 "Size". Shop 999 sells product 888 with option 101
    /// in category 201. Shop 777 has expired.
    pub async fn new() -> Self {
        let store = MemoryStore::new();
        let state = AppState::in_memory(store.clone(), JwtService::new(SECRET, 60));

        seed_shop(&store, 456, "owner456", Duration::days(30)).await;
        seed_shop(&store, 999, "owner999", Duration::days(30)).await;
        seed_shop(&store, 777, "owner777", Duration::days(-1)).await;
        seed_product(&store, 789, 456, 200, 100).await;
        seed_product(&store, 888, 999, 201, 101).await;

        Self { app: router(state.clone()), store, state, jwt: JwtService::new(SECRET, 60) }
    }

    pub fn token(&self, id: i64, role: Role) -> String {
        self.jwt.issue(id, "tester", role).unwrap().token
    }

    pub fn admin(&self) -> String {
        self.token(1, Role::Admin)
    }

    pub fn owner(&self, shop_id: i64) -> String {
        self.token(shop_id, Role::ShopOwner)
    }

    pub fn customer(&self, user_id: i64) -> String {
        self.token(user_id, Role::User)
    }

    pub async fn send(&self, method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
        let res = self.app.clone().oneshot(request(method, uri, token, body)).await.unwrap();
        let status = res.status();
        let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let json = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap() };
        (status, json)
    }

    pub async fn stock(&self, product_id: i64, shop_id: i64) -> i32 {
        self.store.get_product(product_id, shop_id).await.unwrap().stock
    }
}

pub fn request(method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(format!("/api/order-ease/v1{uri}"));
    if let Some(t) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {t}"));
    }
    match body {
        Some(json) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn seed_shop(store: &MemoryStore, id: i64, owner: &str, valid_for: Duration) {
    let draft = ShopDraft {
        name: format!("Shop {id}"), owner_username: owner.into(), owner_password: OWNER_PASSWORD.into(),
        contact_phone: String::new(), contact_email: None, address: String::new(), description: String::new(),
        image_url: String::new(), valid_until: Utc::now() + valid_for, settings: None, order_status_flow: None,
    };
    let mut shop = Shop::create(draft, hash_password(OWNER_PASSWORD).unwrap(), OrderStatusFlow::default());
    shop.id = id;
    store.create_shop(shop).await.unwrap();
}

async fn seed_product(store: &MemoryStore, id: i64, shop_id: i64, category_id: i64, option_id: i64) {
    let now = Utc::now();
    let product = Product {
        id, shop_id, name: "Test Product".into(), description: "house special".into(), price: Money::from(10000),
        stock: 10, image_url: "test.png".into(), status: ProductStatus::Online,
        option_categories: vec![OptionCategory {
            id: category_id, product_id: id, name: "Size".into(), is_required: false, is_multiple: false, display_order: 0,
            options: vec![ProductOption {
                id: option_id, category_id, name: "Large".into(), price_adjustment: Money::from(500),
                is_default: false, display_order: 0,
            }],
        }],
        created_at: now, updated_at: now,
    };
    store.create_product(product).await.unwrap();
}
