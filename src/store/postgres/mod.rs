//! PostgreSQL store.
//!
//! Lock order inside a transaction is always: shop row (`FOR SHARE` for order
//! writes, `FOR UPDATE` for flow changes), then the order row, then product rows
//! ascending by id. Stock only changes through [`write_levels`] after the rows
//! were locked with [`lock_stock`] or `catalog::load_catalog`.

mod accounts;
mod catalog;
mod orders;
mod shops;

use sqlx::postgres::PgPool;
use sqlx::types::Json;
use sqlx::PgConnection;
use std::collections::BTreeMap;

use crate::domain::flow::OrderStatusFlow;
use crate::domain::value_objects::Quantity;
use crate::error::{AppError, AppResult};

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Read a shop's flow, holding a share lock so the flow cannot change under the
/// running transaction.
async fn shop_flow(conn: &mut PgConnection, shop_id: i64) -> AppResult<OrderStatusFlow> {
    let flow: Option<Json<OrderStatusFlow>> =
        sqlx::query_scalar("SELECT order_status_flow FROM shops WHERE id = $1 FOR SHARE")
            .bind(shop_id)
            .fetch_optional(&mut *conn)
            .await?;
    flow.map(|f| f.0).ok_or_else(|| AppError::not_found(format!("shop {shop_id} not found")))
}

/// Lock product rows in ascending id order and return their stock.
async fn lock_stock(conn: &mut PgConnection, product_ids: &[i64]) -> AppResult<BTreeMap<i64, i32>> {
    let mut ids = product_ids.to_vec();
    ids.sort_unstable();
    ids.dedup();
    let rows: Vec<(i64, i32)> = sqlx::query_as("SELECT id, stock FROM products WHERE id = ANY($1) ORDER BY id FOR UPDATE")
        .bind(&ids)
        .fetch_all(&mut *conn)
        .await?;
    Ok(rows.into_iter().collect())
}

/// Persist every level that differs from what was locked.
async fn write_levels(conn: &mut PgConnection, before: &BTreeMap<i64, i32>, after: &BTreeMap<i64, i32>) -> AppResult<()> {
    let (ids, stocks): (Vec<i64>, Vec<i32>) = after
        .iter()
        .filter(|(id, level)| before.get(id) != Some(level))
        .map(|(id, level)| (*id, *level))
        .unzip();
    if ids.is_empty() {
        return Ok(());
    }
    sqlx::query(
        r#"
        UPDATE products p SET stock = v.stock, updated_at = NOW()
        FROM UNNEST($1::bigint[], $2::integer[]) AS v(id, stock)
        WHERE p.id = v.id
        "#,
    )
    .bind(&ids)
    .bind(&stocks)
    .execute(&mut *conn)
    .await?;
    tracing::debug!(products = ?ids, "stock levels written");
    Ok(())
}

fn quantity(raw: i32) -> AppResult<Quantity> {
    Quantity::try_from(i64::from(raw)).map_err(|e| AppError::internal(format!("stored quantity {raw}: {e}")))
}
