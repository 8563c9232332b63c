//! OrderEase Merchant Back-Office
//!
//! Multi-tenant service where a platform administrator provisions shops, shop
//! owners run their catalog and order lifecycle, and customers place and track
//! orders through a shop's storefront.
//!
//! ## Features
//! - Order creation with price and product snapshots taken under stock reservation
//! - Per-shop configurable order status flow with an audit log
//! - Live new-order feed for shop operators (server-sent events, optional NATS mirror)
//! - Product catalog with option categories and storefront reads
//! - JWT authentication for administrators, shop owners and customers

pub mod auth;
pub mod broadcast;
pub mod config;
pub mod domain;
pub mod error;
pub mod http;
pub mod service;
pub mod state;
pub mod store;
pub mod tasks;

pub use config::Config;
pub use error::{AppError, AppResult};
pub use http::router;
pub use state::AppState;
