//! Shop (tenant) persistence.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;

use super::PgStore;
use crate::domain::aggregates::Shop;
use crate::domain::flow::OrderStatusFlow;
use crate::domain::value_objects::PageRequest;
use crate::error::{AppError, AppResult};
use crate::store::{orphaned_error, orphaned_statuses, Page, ShopStore};

const SHOP_COLUMNS: &str = "id, name, owner_username, owner_password, contact_phone, contact_email, address, \
                            description, image_url, valid_until, settings, order_status_flow, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct ShopRow {
    id: i64,
    name: String,
    owner_username: String,
    owner_password: String,
    contact_phone: String,
    contact_email: String,
    address: String,
    description: String,
    image_url: String,
    valid_until: DateTime<Utc>,
    settings: serde_json::Value,
    order_status_flow: Json<OrderStatusFlow>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<ShopRow> for Shop {
    fn from(r: ShopRow) -> Self {
        Self {
            id: r.id, name: r.name, owner_username: r.owner_username, owner_password_hash: r.owner_password,
            contact_phone: r.contact_phone, contact_email: r.contact_email, address: r.address,
            description: r.description, image_url: r.image_url, valid_until: r.valid_until, settings: r.settings,
            order_status_flow: r.order_status_flow.0, created_at: r.created_at, updated_at: r.updated_at,
        }
    }
}

#[async_trait]
impl ShopStore for PgStore {
    async fn create_shop(&self, shop: Shop) -> AppResult<Shop> {
        sqlx::query(&format!(
            "INSERT INTO shops ({SHOP_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)"
        ))
        .bind(shop.id)
        .bind(&shop.name)
        .bind(&shop.owner_username)
        .bind(&shop.owner_password_hash)
        .bind(&shop.contact_phone)
        .bind(&shop.contact_email)
        .bind(&shop.address)
        .bind(&shop.description)
        .bind(&shop.image_url)
        .bind(shop.valid_until)
        .bind(&shop.settings)
        .bind(Json(&shop.order_status_flow))
        .bind(shop.created_at)
        .bind(shop.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(shop)
    }

    async fn get_shop(&self, id: i64) -> AppResult<Shop> {
        let row: Option<ShopRow> = sqlx::query_as(&format!("SELECT {SHOP_COLUMNS} FROM shops WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Shop::from).ok_or_else(|| AppError::not_found(format!("shop {id} not found")))
    }

    async fn find_shop_by_owner(&self, owner_username: &str) -> AppResult<Option<Shop>> {
        let row: Option<ShopRow> = sqlx::query_as(&format!("SELECT {SHOP_COLUMNS} FROM shops WHERE owner_username = $1"))
            .bind(owner_username)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Shop::from))
    }

    async fn list_shops(&self, page: PageRequest) -> AppResult<Page<Shop>> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM shops").fetch_one(&self.pool).await?;
        let rows: Vec<ShopRow> = sqlx::query_as(&format!(
            "SELECT {SHOP_COLUMNS} FROM shops ORDER BY created_at DESC, id DESC LIMIT $1 OFFSET $2"
        ))
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(&self.pool)
        .await?;
        Ok(Page::new(rows.into_iter().map(Shop::from).collect(), total, page))
    }

    async fn update_shop(&self, shop: &Shop) -> AppResult<()> {
        let updated = sqlx::query(
            r#"
            UPDATE shops SET name = $2, owner_username = $3, owner_password = $4, contact_phone = $5,
                contact_email = $6, address = $7, description = $8, image_url = $9, valid_until = $10,
                settings = $11, updated_at = $12
            WHERE id = $1
            "#,
        )
        .bind(shop.id)
        .bind(&shop.name)
        .bind(&shop.owner_username)
        .bind(&shop.owner_password_hash)
        .bind(&shop.contact_phone)
        .bind(&shop.contact_email)
        .bind(&shop.address)
        .bind(&shop.description)
        .bind(&shop.image_url)
        .bind(shop.valid_until)
        .bind(&shop.settings)
        .bind(shop.updated_at)
        .execute(&self.pool)
        .await?;
        if updated.rows_affected() == 0 {
            return Err(AppError::not_found(format!("shop {} not found", shop.id)));
        }
        Ok(())
    }

    async fn update_flow(&self, id: i64, flow: OrderStatusFlow) -> AppResult<()> {
        let mut tx = self.pool.begin().await?;
        let locked: Option<i64> = sqlx::query_scalar("SELECT id FROM shops WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;
        if locked.is_none() {
            return Err(AppError::not_found(format!("shop {id} not found")));
        }
        let in_use: Vec<i32> = sqlx::query_scalar("SELECT DISTINCT status FROM orders WHERE shop_id = $1")
            .bind(id)
            .fetch_all(&mut *tx)
            .await?;
        let orphans = orphaned_statuses(&in_use, &flow);
        if !orphans.is_empty() {
            return Err(orphaned_error(&orphans));
        }
        sqlx::query("UPDATE shops SET order_status_flow = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(Json(&flow))
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn delete_shop(&self, id: i64) -> AppResult<()> {
        let mut tx = self.pool.begin().await?;
        let locked: Option<i64> = sqlx::query_scalar("SELECT id FROM shops WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;
        if locked.is_none() {
            return Err(AppError::not_found(format!("shop {id} not found")));
        }
        let busy: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM products WHERE shop_id = $1) OR EXISTS (SELECT 1 FROM orders WHERE shop_id = $1)",
        )
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;
        if busy {
            return Err(AppError::precondition("shop still has products or orders"));
        }
        sqlx::query("DELETE FROM shops WHERE id = $1").bind(id).execute(&mut *tx).await?;
        tx.commit().await?;
        Ok(())
    }
}
