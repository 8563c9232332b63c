//! In-process store.
//!
//! Same contract as the PostgreSQL store. One mutex guards every table, and each
//! trait method holds it from start to finish, which makes every call a
//! serializable transaction: rules run against a copy and only a successful
//! outcome is written back.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use super::{
    advance_status, materialize_order, orphaned_error, orphaned_statuses, rebasket_order, restock_on_delete,
    AccountStore, CatalogStore, NewOrder, OrderQuery, OrderStore, Page, ShopStore,
};
use crate::domain::aggregates::{
    Admin, Basket, Order, OrderStatusLog, OrderSummary, Product, ProductDetails, ProductStatus, Shop, StatusChange, User,
};
use crate::domain::flow::OrderStatusFlow;
use crate::domain::pricing::CatalogSnapshot;
use crate::domain::value_objects::PageRequest;
use crate::error::{AppError, AppResult};

#[derive(Default)]
struct Tables {
    shops: HashMap<i64, Shop>,
    products: HashMap<i64, Product>,
    orders: HashMap<i64, Order>,
    logs: Vec<OrderStatusLog>,
    users: HashMap<i64, User>,
    admins: Vec<Admin>,
    blacklist: HashMap<String, DateTime<Utc>>,
}

impl Tables {
    fn shop(&self, id: i64) -> AppResult<&Shop> {
        self.shops.get(&id).ok_or_else(|| AppError::not_found(format!("shop {id} not found")))
    }

    fn flow(&self, shop_id: i64) -> AppResult<OrderStatusFlow> {
        Ok(self.shop(shop_id)?.order_status_flow.clone())
    }

    fn order(&self, id: i64, shop_id: i64) -> AppResult<Order> {
        self.orders
            .get(&id)
            .filter(|o| o.shop_id == shop_id)
            .cloned()
            .ok_or_else(|| AppError::not_found(format!("order {id} not found")))
    }

    fn catalog(&self, shop_id: i64) -> CatalogSnapshot {
        CatalogSnapshot::from_products(self.products.values().filter(|p| p.shop_id == shop_id))
    }

    fn stock_levels(&self) -> BTreeMap<i64, i32> {
        self.products.values().map(|p| (p.id, p.stock)).collect()
    }

    fn write_levels(&mut self, levels: &BTreeMap<i64, i32>) {
        let now = Utc::now();
        for (id, level) in levels {
            if let Some(p) = self.products.get_mut(id).filter(|p| p.stock != *level) {
                p.stock = *level;
                p.updated_at = now;
            }
        }
    }

    fn check_shop_unique(&self, shop: &Shop) -> AppResult<()> {
        let clash = self
            .shops
            .values()
            .any(|s| s.id != shop.id && (s.name == shop.name || s.owner_username == shop.owner_username));
        if clash {
            return Err(AppError::Conflict("shop name or owner username already taken".into()));
        }
        Ok(())
    }
}

fn paginate<T>(mut rows: Vec<T>, page: PageRequest) -> Page<T> {
    let total = rows.len() as i64;
    let start = (page.offset() as usize).min(rows.len());
    let data: Vec<T> = rows.drain(start..).take(page.limit() as usize).collect();
    Page::new(data, total, page)
}

/// Cloning shares the underlying tables.
#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl OrderStore for MemoryStore {
    async fn create_order(&self, new: NewOrder) -> AppResult<Order> {
        let mut t = self.lock();
        let flow = t.flow(new.shop_id)?;
        let catalog = t.catalog(new.shop_id);
        let mut levels = catalog.stock_levels();
        let order = materialize_order(new, &flow, &catalog, &mut levels)?;
        t.write_levels(&levels);
        t.logs.push(order.initial_log());
        t.orders.insert(order.id, order.clone());
        Ok(order)
    }

    async fn get_order(&self, id: i64, shop_id: i64) -> AppResult<Order> {
        self.lock().order(id, shop_id)
    }

    async fn list_orders(&self, query: &OrderQuery, page: PageRequest) -> AppResult<Page<OrderSummary>> {
        let t = self.lock();
        let mut rows: Vec<OrderSummary> = t.orders.values().map(Order::summary).filter(|o| query.matches(o)).collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(paginate(rows, page))
    }

    async fn replace_items(&self, id: i64, shop_id: i64, basket: Basket, remark: Option<String>) -> AppResult<Order> {
        let mut t = self.lock();
        let mut order = t.order(id, shop_id)?;
        let flow = t.flow(shop_id)?;
        let catalog = t.catalog(shop_id);
        let mut levels = t.stock_levels();
        rebasket_order(&mut order, &basket, &flow, &catalog, &mut levels)?;
        if let Some(remark) = remark {
            order.remark = remark;
        }
        t.write_levels(&levels);
        t.orders.insert(order.id, order.clone());
        Ok(order)
    }

    async fn change_status(&self, id: i64, shop_id: i64, next: i32) -> AppResult<StatusChange> {
        let mut t = self.lock();
        let mut order = t.order(id, shop_id)?;
        let flow = t.flow(shop_id)?;
        let (change, log, restock) = advance_status(&mut order, next, &flow, Utc::now())?;
        if let Some(plan) = restock {
            let mut levels = t.stock_levels();
            plan.restore(&mut levels);
            t.write_levels(&levels);
        }
        t.logs.push(log);
        t.orders.insert(order.id, order);
        Ok(change)
    }

    async fn delete_order(&self, id: i64, shop_id: i64) -> AppResult<()> {
        let mut t = self.lock();
        let order = t.order(id, shop_id)?;
        let flow = t.flow(shop_id)?;
        if let Some(plan) = restock_on_delete(&order, &flow) {
            let mut levels = t.stock_levels();
            plan.restore(&mut levels);
            t.write_levels(&levels);
        }
        t.logs.retain(|l| l.order_id != id);
        t.orders.remove(&id);
        Ok(())
    }

    async fn status_logs(&self, id: i64, shop_id: i64) -> AppResult<Vec<OrderStatusLog>> {
        let t = self.lock();
        t.order(id, shop_id)?;
        let mut logs: Vec<OrderStatusLog> = t.logs.iter().filter(|l| l.order_id == id).cloned().collect();
        logs.sort_by_key(|l| l.changed_time);
        Ok(logs)
    }
}

#[async_trait]
impl CatalogStore for MemoryStore {
    async fn create_product(&self, product: Product) -> AppResult<Product> {
        let mut t = self.lock();
        t.shop(product.shop_id)?;
        t.products.insert(product.id, product.clone());
        Ok(product)
    }

    async fn get_product(&self, id: i64, shop_id: i64) -> AppResult<Product> {
        self.lock()
            .products
            .get(&id)
            .filter(|p| p.shop_id == shop_id)
            .cloned()
            .ok_or_else(|| AppError::not_found(format!("product {id} not found")))
    }

    async fn list_products(&self, shop_id: i64, status: Option<ProductStatus>, page: PageRequest) -> AppResult<Page<Product>> {
        let t = self.lock();
        let mut rows: Vec<Product> = t
            .products
            .values()
            .filter(|p| p.shop_id == shop_id && status.map_or(true, |s| p.status == s))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(paginate(rows, page))
    }

    async fn update_product(&self, id: i64, shop_id: i64, details: ProductDetails, stock_delta: i32) -> AppResult<Product> {
        let mut t = self.lock();
        let slot = t
            .products
            .get_mut(&id)
            .filter(|p| p.shop_id == shop_id)
            .ok_or_else(|| AppError::not_found(format!("product {id} not found")))?;
        let mut product = slot.clone();
        product.adjust_stock(stock_delta)?;
        product.apply(details);
        *slot = product.clone();
        Ok(product)
    }

    async fn change_product_status(&self, id: i64, shop_id: i64, next: ProductStatus) -> AppResult<Product> {
        let mut t = self.lock();
        let product = t
            .products
            .get_mut(&id)
            .filter(|p| p.shop_id == shop_id)
            .ok_or_else(|| AppError::not_found(format!("product {id} not found")))?;
        product.transition_to(next)?;
        Ok(product.clone())
    }

    async fn delete_product(&self, id: i64, shop_id: i64) -> AppResult<()> {
        let mut t = self.lock();
        if !t.products.get(&id).is_some_and(|p| p.shop_id == shop_id) {
            return Err(AppError::not_found(format!("product {id} not found")));
        }
        if t.orders.values().any(|o| o.items.iter().any(|i| i.product_id == id)) {
            return Err(AppError::precondition("product is referenced by orders; take it offline instead"));
        }
        t.products.remove(&id);
        Ok(())
    }
}

#[async_trait]
impl ShopStore for MemoryStore {
    async fn create_shop(&self, shop: Shop) -> AppResult<Shop> {
        let mut t = self.lock();
        t.check_shop_unique(&shop)?;
        t.shops.insert(shop.id, shop.clone());
        Ok(shop)
    }

    async fn get_shop(&self, id: i64) -> AppResult<Shop> {
        self.lock().shop(id).cloned()
    }

    async fn find_shop_by_owner(&self, owner_username: &str) -> AppResult<Option<Shop>> {
        Ok(self.lock().shops.values().find(|s| s.owner_username == owner_username).cloned())
    }

    async fn list_shops(&self, page: PageRequest) -> AppResult<Page<Shop>> {
        let t = self.lock();
        let mut rows: Vec<Shop> = t.shops.values().cloned().collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(paginate(rows, page))
    }

    async fn update_shop(&self, shop: &Shop) -> AppResult<()> {
        let mut t = self.lock();
        t.shop(shop.id)?;
        t.check_shop_unique(shop)?;
        t.shops.insert(shop.id, shop.clone());
        Ok(())
    }

    async fn update_flow(&self, id: i64, flow: OrderStatusFlow) -> AppResult<()> {
        let mut t = self.lock();
        t.shop(id)?;
        let in_use: Vec<i32> = t.orders.values().filter(|o| o.shop_id == id).map(|o| o.status).collect();
        let orphans = orphaned_statuses(&in_use, &flow);
        if !orphans.is_empty() {
            return Err(orphaned_error(&orphans));
        }
        if let Some(shop) = t.shops.get_mut(&id) {
            shop.order_status_flow = flow;
            shop.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn delete_shop(&self, id: i64) -> AppResult<()> {
        let mut t = self.lock();
        t.shop(id)?;
        if t.products.values().any(|p| p.shop_id == id) || t.orders.values().any(|o| o.shop_id == id) {
            return Err(AppError::precondition("shop still has products or orders"));
        }
        t.shops.remove(&id);
        Ok(())
    }
}

#[async_trait]
impl AccountStore for MemoryStore {
    async fn create_user(&self, user: User) -> AppResult<User> {
        let mut t = self.lock();
        if t.users.values().any(|u| u.name == user.name) {
            return Err(AppError::Conflict(format!("user name '{}' already taken", user.name)));
        }
        t.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn find_user(&self, name: &str) -> AppResult<Option<User>> {
        Ok(self.lock().users.values().find(|u| u.name == name).cloned())
    }

    async fn find_admin(&self, username: &str) -> AppResult<Option<Admin>> {
        Ok(self.lock().admins.iter().find(|a| a.username == username).cloned())
    }

    async fn count_admins(&self) -> AppResult<i64> {
        Ok(self.lock().admins.len() as i64)
    }

    async fn create_admin(&self, username: &str, password_hash: &str) -> AppResult<Admin> {
        let mut t = self.lock();
        if t.admins.iter().any(|a| a.username == username) {
            return Err(AppError::Conflict(format!("admin '{username}' already exists")));
        }
        let admin = Admin {
            id: t.admins.len() as i64 + 1,
            username: username.to_string(),
            password_hash: password_hash.to_string(),
            created_at: Utc::now(),
        };
        t.admins.push(admin.clone());
        Ok(admin)
    }

    async fn blacklist_token(&self, jti: &str, expires_at: DateTime<Utc>) -> AppResult<()> {
        self.lock().blacklist.insert(jti.to_string(), expires_at);
        Ok(())
    }

    async fn is_token_blacklisted(&self, jti: &str) -> AppResult<bool> {
        Ok(self.lock().blacklist.contains_key(jti))
    }

    async fn purge_expired_tokens(&self, now: DateTime<Utc>) -> AppResult<u64> {
        let mut t = self.lock();
        let before = t.blacklist.len();
        t.blacklist.retain(|_, exp| *exp > now);
        Ok((before - t.blacklist.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::{BasketItem, BasketOption, OptionCategory, ProductOption, ShopDraft};
    use crate::domain::value_objects::{Money, Quantity};
    use chrono::Duration;

    async fn seeded() -> MemoryStore {
        let store = MemoryStore::new();
        let mut shop = Shop::create(
            ShopDraft {
                name: "Shop 456".into(), owner_username: "owner456".into(), owner_password: "secret1".into(),
                contact_phone: String::new(), contact_email: None, address: String::new(), description: String::new(),
                image_url: String::new(), valid_until: Utc::now() + Duration::days(30), settings: None, order_status_flow: None,
            },
            "hash".into(),
            OrderStatusFlow::default(),
        );
        shop.id = 456;
        store.create_shop(shop).await.unwrap();
        let now = Utc::now();
        let product = Product {
            id: 789, shop_id: 456, name: "Test Product".into(), description: "d".into(), price: Money::from(10000),
            stock: 10, image_url: "p.png".into(), status: ProductStatus::Online,
            option_categories: vec![OptionCategory {
                id: 200, product_id: 789, name: "Size".into(), is_required: false, is_multiple: false, display_order: 0,
                options: vec![ProductOption {
                    id: 100, category_id: 200, name: "Large".into(), price_adjustment: Money::from(500),
                    is_default: false, display_order: 0,
                }],
            }],
            created_at: now, updated_at: now,
        };
        store.create_product(product).await.unwrap();
        store
    }

    fn new_order(qty: u32) -> NewOrder {
        NewOrder {
            user_id: 123,
            shop_id: 456,
            remark: String::new(),
            basket: Basket::new(vec![BasketItem {
                product_id: 789,
                quantity: Quantity::new(qty).unwrap(),
                options: vec![BasketOption { category_id: 200, option_id: 100 }],
            }])
            .unwrap(),
        }
    }

    async fn stock(store: &MemoryStore) -> i32 {
        store.get_product(789, 456).await.unwrap().stock
    }

    #[tokio::test]
    async fn test_create_reserves_stock_and_logs() {
        let store = seeded().await;
        let order = store.create_order(new_order(2)).await.unwrap();
        assert_eq!(order.total_price, Money::from(21000));
        assert_eq!(order.status, 0);
        assert_eq!(stock(&store).await, 8);
        let logs = store.status_logs(order.id, 456).await.unwrap();
        assert_eq!((logs.len(), logs[0].old_status, logs[0].new_status), (1, None, 0));
    }

    #[tokio::test]
    async fn test_out_of_stock_leaves_no_trace() {
        let store = seeded().await;
        let err = store.create_order(new_order(11)).await.unwrap_err();
        assert!(matches!(err, AppError::OutOfStock(_)));
        assert_eq!(stock(&store).await, 10);
        let page = store.list_orders(&OrderQuery::for_shop(456), PageRequest::default()).await.unwrap();
        assert_eq!(page.total, 0);
    }

    #[tokio::test]
    async fn test_snapshot_survives_catalog_edit() {
        let store = seeded().await;
        let order = store.create_order(new_order(1)).await.unwrap();
        let details = ProductDetails {
            name: "Renamed".into(), description: String::new(), price: Money::from(1),
            image_url: String::new(), option_categories: vec![],
        };
        store.update_product(789, 456, details, 0).await.unwrap();
        let reread = store.get_order(order.id, 456).await.unwrap();
        assert_eq!(reread.items[0].product_name, "Test Product");
        assert_eq!(reread.items[0].unit_price, Money::from(10000));
        assert_eq!(reread, order);
    }

    #[tokio::test]
    async fn test_product_edit_keeps_reserved_stock() {
        let store = seeded().await;
        store.create_order(new_order(2)).await.unwrap();
        let product = store.get_product(789, 456).await.unwrap();
        let details = |name: &str| ProductDetails {
            name: name.into(), description: product.description.clone(), price: product.price,
            image_url: product.image_url.clone(), option_categories: vec![],
        };
        let edited = store.update_product(789, 456, details("Renamed"), 0).await.unwrap();
        assert_eq!((edited.name.as_str(), edited.stock), ("Renamed", 8));
        assert_eq!(store.update_product(789, 456, details("Renamed"), 5).await.unwrap().stock, 13);

        let err = store.update_product(789, 456, details("Gone"), -14).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));
        let kept = store.get_product(789, 456).await.unwrap();
        assert_eq!((kept.name.as_str(), kept.stock), ("Renamed", 13));
    }

    #[tokio::test]
    async fn test_final_orders_refuse_new_items() {
        let store = seeded().await;
        let done = store.create_order(new_order(1)).await.unwrap();
        store.change_status(done.id, 456, 1).await.unwrap();
        store.change_status(done.id, 456, 9).await.unwrap();
        let cancelled = store.create_order(new_order(1)).await.unwrap();
        store.change_status(cancelled.id, 456, 10).await.unwrap();
        assert_eq!(stock(&store).await, 9);

        for id in [done.id, cancelled.id] {
            let err = store.replace_items(id, 456, new_order(3).basket, None).await.unwrap_err();
            assert!(matches!(err, AppError::TerminalStatus(_)));
        }
        assert_eq!(stock(&store).await, 9);
        assert_eq!(store.get_order(done.id, 456).await.unwrap().items[0].quantity.value(), 1);
    }

    #[tokio::test]
    async fn test_deleting_completed_order_keeps_stock() {
        let store = seeded().await;
        let order = store.create_order(new_order(2)).await.unwrap();
        store.change_status(order.id, 456, 1).await.unwrap();
        store.change_status(order.id, 456, 9).await.unwrap();
        assert_eq!(stock(&store).await, 8);
        store.delete_order(order.id, 456).await.unwrap();
        assert_eq!(stock(&store).await, 8);
    }

    #[tokio::test]
    async fn test_status_log_follows_last_update() {
        let store = seeded().await;
        let order = store.create_order(new_order(1)).await.unwrap();
        let edited = store.replace_items(order.id, 456, new_order(2).basket, None).await.unwrap();
        store.change_status(order.id, 456, 1).await.unwrap();
        let logs = store.status_logs(order.id, 456).await.unwrap();
        assert!(logs[1].changed_time >= edited.updated_at);
        let reread = store.get_order(order.id, 456).await.unwrap();
        assert_eq!(reread.updated_at, logs[1].changed_time);
    }

    #[tokio::test]
    async fn test_tenant_scoping_on_reads() {
        let store = seeded().await;
        let order = store.create_order(new_order(1)).await.unwrap();
        assert!(matches!(store.get_order(order.id, 999).await, Err(AppError::NotFound(_))));
        assert!(matches!(store.delete_order(order.id, 999).await, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_status_change_and_illegal_skip() {
        let store = seeded().await;
        let order = store.create_order(new_order(1)).await.unwrap();
        let err = store.change_status(order.id, 456, 9).await.unwrap_err();
        assert!(matches!(err, AppError::IllegalTransition(_)));
        assert_eq!(store.status_logs(order.id, 456).await.unwrap().len(), 1);

        let change = store.change_status(order.id, 456, 1).await.unwrap();
        assert_eq!((change.old_status, change.new_status), (0, 1));
        let logs = store.status_logs(order.id, 456).await.unwrap();
        assert_eq!((logs[1].old_status, logs[1].new_status), (Some(0), 1));
    }

    #[tokio::test]
    async fn test_cancellation_restores_stock_once() {
        let store = seeded().await;
        let order = store.create_order(new_order(2)).await.unwrap();
        store.change_status(order.id, 456, 10).await.unwrap();
        assert_eq!(stock(&store).await, 10);
        // final: deleting no longer restocks
        store.delete_order(order.id, 456).await.unwrap();
        assert_eq!(stock(&store).await, 10);
    }

    #[tokio::test]
    async fn test_delete_open_order_restores_stock() {
        let store = seeded().await;
        let order = store.create_order(new_order(2)).await.unwrap();
        assert_eq!(stock(&store).await, 8);
        store.delete_order(order.id, 456).await.unwrap();
        assert_eq!(stock(&store).await, 10);
        assert!(matches!(store.delete_order(order.id, 456).await, Err(AppError::NotFound(_))));
        assert!(store.status_logs(order.id, 456).await.is_err());
    }

    #[tokio::test]
    async fn test_replace_items_moves_stock() {
        let store = seeded().await;
        let order = store.create_order(new_order(2)).await.unwrap();
        let updated = store.replace_items(order.id, 456, new_order(5).basket, Some("more".into())).await.unwrap();
        assert_eq!(updated.id, order.id);
        assert_eq!(updated.total_price, Money::from(52500));
        assert_eq!(updated.remark, "more");
        assert_eq!(stock(&store).await, 5);

        let err = store.replace_items(order.id, 456, new_order(11).basket, None).await.unwrap_err();
        assert!(matches!(err, AppError::OutOfStock(_)));
        assert_eq!(stock(&store).await, 5);
    }

    #[tokio::test]
    async fn test_flow_update_cannot_orphan_orders() {
        let store = seeded().await;
        store.create_order(new_order(1)).await.unwrap();
        let mut flow = OrderStatusFlow::default();
        flow.statuses.retain(|n| n.value != 0);
        flow.statuses[0].actions.clear();
        let err = store.update_flow(456, flow).await.unwrap_err();
        assert!(matches!(err, AppError::PreconditionFailed(_)));
    }

    #[tokio::test]
    async fn test_referenced_product_and_busy_shop_cannot_be_deleted() {
        let store = seeded().await;
        store.create_order(new_order(1)).await.unwrap();
        assert!(matches!(store.delete_product(789, 456).await, Err(AppError::PreconditionFailed(_))));
        assert!(matches!(store.delete_shop(456).await, Err(AppError::PreconditionFailed(_))));
    }

    #[tokio::test]
    async fn test_token_blacklist_purge() {
        let store = MemoryStore::new();
        let now = Utc::now();
        store.blacklist_token("old", now - Duration::minutes(1)).await.unwrap();
        store.blacklist_token("live", now + Duration::hours(1)).await.unwrap();
        assert_eq!(store.purge_expired_tokens(now).await.unwrap(), 1);
        assert!(store.is_token_blacklisted("live").await.unwrap());
        assert!(!store.is_token_blacklisted("old").await.unwrap());
    }
}
