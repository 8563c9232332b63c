//! Shared application state handed to every handler.

use std::sync::Arc;

use crate::auth::JwtService;
use crate::broadcast::Broadcaster;
use crate::http::rate_limit::RateLimiter;
use crate::service::{AuthService, CatalogService, OrderService, ShopService};
use crate::store::{AccountStore, CatalogStore, MemoryStore, OrderStore, ShopStore};

#[derive(Clone)]
pub struct AppState {
    pub orders: OrderService,
    pub catalog: CatalogService,
    pub shops: ShopService,
    pub auth: AuthService,
    pub broadcaster: Broadcaster,
    pub limiter: RateLimiter,
}

impl AppState {
    pub fn new<S>(store: S, broadcaster: Broadcaster, jwt: JwtService, limiter: RateLimiter) -> Self
    where
        S: OrderStore + CatalogStore + ShopStore + AccountStore + Clone + 'static,
    {
        let orders: Arc<dyn OrderStore> = Arc::new(store.clone());
        let catalog: Arc<dyn CatalogStore> = Arc::new(store.clone());
        let shops: Arc<dyn ShopStore> = Arc::new(store.clone());
        let accounts: Arc<dyn AccountStore> = Arc::new(store);
        Self {
            orders: OrderService::new(orders, shops.clone(), broadcaster.clone()),
            catalog: CatalogService::new(catalog, shops.clone()),
            shops: ShopService::new(shops.clone()),
            auth: AuthService::new(accounts, shops, Arc::new(jwt)),
            broadcaster,
            limiter,
        }
    }

    /// In-process state for tests and local demos.
    pub fn in_memory(store: MemoryStore, jwt: JwtService) -> Self {
        Self::new(store, Broadcaster::default(), jwt, RateLimiter::new(0))
    }
}
