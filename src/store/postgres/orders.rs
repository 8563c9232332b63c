//! Order aggregate persistence.

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use sqlx::{PgConnection, Postgres, QueryBuilder};
use std::collections::HashMap;

use super::catalog::load_catalog;
use super::{lock_stock, quantity, shop_flow, write_levels, PgStore};
use crate::domain::aggregates::{Basket, Order, OrderItem, OrderItemOption, OrderStatusLog, OrderSummary, StatusChange};
use crate::domain::value_objects::{Money, PageRequest};
use crate::error::{AppError, AppResult};
use crate::store::{
    advance_status, materialize_order, rebasket_order, restock_on_delete, NewOrder, OrderQuery, OrderStore, Page,
};

const ORDER_COLUMNS: &str = "id, user_id, shop_id, total_price, status, remark, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct ItemRow {
    id: i64,
    order_id: i64,
    product_id: i64,
    quantity: i32,
    unit_price: Money,
    total_price: Money,
    product_name: String,
    product_description: String,
    product_image_url: String,
}

#[derive(sqlx::FromRow)]
struct ItemOptionRow {
    id: i64,
    order_item_id: i64,
    category_id: i64,
    option_id: i64,
    option_name: String,
    category_name: String,
    price_adjustment: Money,
}

#[derive(sqlx::FromRow)]
struct LogRow {
    id: i64,
    order_id: i64,
    old_status: Option<i32>,
    new_status: i32,
    changed_time: chrono::DateTime<Utc>,
}

impl From<LogRow> for OrderStatusLog {
    fn from(r: LogRow) -> Self {
        Self { id: r.id, order_id: r.order_id, old_status: r.old_status, new_status: r.new_status, changed_time: r.changed_time }
    }
}

/// Load one order with its items and their options, optionally locking the order row.
async fn fetch_order(conn: &mut PgConnection, id: i64, shop_id: i64, lock: bool) -> AppResult<Order> {
    let sql = format!(
        "SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1 AND shop_id = $2{}",
        if lock { " FOR UPDATE" } else { "" }
    );
    let head: Option<OrderSummary> = sqlx::query_as(&sql).bind(id).bind(shop_id).fetch_optional(&mut *conn).await?;
    let head = head.ok_or_else(|| AppError::not_found(format!("order {id} not found")))?;

    let items: Vec<ItemRow> = sqlx::query_as(
        "SELECT id, order_id, product_id, quantity, unit_price, total_price, product_name, product_description, product_image_url
         FROM order_items WHERE order_id = $1 ORDER BY position, id",
    )
    .bind(id)
    .fetch_all(&mut *conn)
    .await?;
    let item_ids: Vec<i64> = items.iter().map(|i| i.id).collect();
    let options: Vec<ItemOptionRow> = sqlx::query_as(
        "SELECT id, order_item_id, category_id, option_id, option_name, category_name, price_adjustment
         FROM order_item_options WHERE order_item_id = ANY($1) ORDER BY order_item_id, position, id",
    )
    .bind(&item_ids)
    .fetch_all(&mut *conn)
    .await?;

    let mut options_by_item: HashMap<i64, Vec<OrderItemOption>> = HashMap::new();
    for o in options {
        options_by_item.entry(o.order_item_id).or_default().push(OrderItemOption {
            id: o.id, order_item_id: o.order_item_id, category_id: o.category_id, option_id: o.option_id,
            option_name: o.option_name, category_name: o.category_name, price_adjustment: o.price_adjustment,
        });
    }
    let items = items
        .into_iter()
        .map(|i| -> AppResult<OrderItem> {
            Ok(OrderItem {
                quantity: quantity(i.quantity)?,
                options: options_by_item.remove(&i.id).unwrap_or_default(),
                id: i.id, order_id: i.order_id, product_id: i.product_id, unit_price: i.unit_price,
                total_price: i.total_price, product_name: i.product_name, product_description: i.product_description,
                product_image_url: i.product_image_url,
            })
        })
        .collect::<AppResult<Vec<_>>>()?;

    Ok(Order {
        id: head.id, user_id: head.user_id, shop_id: head.shop_id, total_price: head.total_price, status: head.status,
        remark: head.remark, created_at: head.created_at, updated_at: head.updated_at, items,
    })
}

async fn insert_children(conn: &mut PgConnection, order: &Order) -> AppResult<()> {
    let items = &order.items;
    if items.is_empty() {
        return Ok(());
    }
    sqlx::query(
        r#"
        INSERT INTO order_items (id, order_id, product_id, quantity, unit_price, total_price,
                                 product_name, product_description, product_image_url, position)
        SELECT * FROM UNNEST($1::bigint[], $2::bigint[], $3::bigint[], $4::integer[], $5::numeric[], $6::numeric[],
                             $7::text[], $8::text[], $9::text[], $10::integer[])
        "#,
    )
    .bind(items.iter().map(|i| i.id).collect::<Vec<_>>())
    .bind(items.iter().map(|i| i.order_id).collect::<Vec<_>>())
    .bind(items.iter().map(|i| i.product_id).collect::<Vec<_>>())
    .bind(items.iter().map(|i| i.quantity.as_i32()).collect::<Vec<_>>())
    .bind(items.iter().map(|i| i.unit_price.amount()).collect::<Vec<Decimal>>())
    .bind(items.iter().map(|i| i.total_price.amount()).collect::<Vec<Decimal>>())
    .bind(items.iter().map(|i| i.product_name.clone()).collect::<Vec<_>>())
    .bind(items.iter().map(|i| i.product_description.clone()).collect::<Vec<_>>())
    .bind(items.iter().map(|i| i.product_image_url.clone()).collect::<Vec<_>>())
    .bind((0..items.len() as i32).collect::<Vec<i32>>())
    .execute(&mut *conn)
    .await?;

    let options: Vec<(i32, &OrderItemOption)> = items
        .iter()
        .flat_map(|i| i.options.iter().enumerate().map(|(pos, o)| (pos as i32, o)))
        .collect();
    if options.is_empty() {
        return Ok(());
    }
    sqlx::query(
        r#"
        INSERT INTO order_item_options (id, order_item_id, category_id, option_id, option_name, category_name,
                                        price_adjustment, position)
        SELECT * FROM UNNEST($1::bigint[], $2::bigint[], $3::bigint[], $4::bigint[], $5::text[], $6::text[],
                             $7::numeric[], $8::integer[])
        "#,
    )
    .bind(options.iter().map(|(_, o)| o.id).collect::<Vec<_>>())
    .bind(options.iter().map(|(_, o)| o.order_item_id).collect::<Vec<_>>())
    .bind(options.iter().map(|(_, o)| o.category_id).collect::<Vec<_>>())
    .bind(options.iter().map(|(_, o)| o.option_id).collect::<Vec<_>>())
    .bind(options.iter().map(|(_, o)| o.option_name.clone()).collect::<Vec<_>>())
    .bind(options.iter().map(|(_, o)| o.category_name.clone()).collect::<Vec<_>>())
    .bind(options.iter().map(|(_, o)| o.price_adjustment.amount()).collect::<Vec<Decimal>>())
    .bind(options.iter().map(|(pos, _)| *pos).collect::<Vec<_>>())
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn delete_children(conn: &mut PgConnection, order_id: i64) -> AppResult<()> {
    sqlx::query("DELETE FROM order_item_options WHERE order_item_id IN (SELECT id FROM order_items WHERE order_id = $1)")
        .bind(order_id)
        .execute(&mut *conn)
        .await?;
    sqlx::query("DELETE FROM order_items WHERE order_id = $1").bind(order_id).execute(&mut *conn).await?;
    Ok(())
}

async fn insert_log(conn: &mut PgConnection, log: &OrderStatusLog) -> AppResult<()> {
    sqlx::query("INSERT INTO order_status_logs (id, order_id, old_status, new_status, changed_time) VALUES ($1, $2, $3, $4, $5)")
        .bind(log.id)
        .bind(log.order_id)
        .bind(log.old_status)
        .bind(log.new_status)
        .bind(log.changed_time)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

fn push_filters(qb: &mut QueryBuilder<'_, Postgres>, query: &OrderQuery) {
    qb.push(" WHERE shop_id = ").push_bind(query.shop_id);
    if let Some(user_id) = query.user_id {
        qb.push(" AND user_id = ").push_bind(user_id);
    }
    if let Some(statuses) = &query.statuses {
        qb.push(" AND status = ANY(").push_bind(statuses.clone()).push(")");
    }
    if let Some(start) = query.start_time {
        qb.push(" AND created_at >= ").push_bind(start);
    }
    if let Some(end) = query.end_time {
        qb.push(" AND created_at <= ").push_bind(end);
    }
}

#[async_trait]
impl OrderStore for PgStore {
    async fn create_order(&self, new: NewOrder) -> AppResult<Order> {
        let mut tx = self.pool.begin().await?;
        let flow = shop_flow(&mut tx, new.shop_id).await?;
        let catalog = load_catalog(&mut tx, new.shop_id, &new.basket.product_ids()).await?;
        let before = catalog.stock_levels();
        let mut levels = before.clone();
        let order = materialize_order(new, &flow, &catalog, &mut levels)?;
        write_levels(&mut tx, &before, &levels).await?;

        sqlx::query(&format!("INSERT INTO orders ({ORDER_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)"))
            .bind(order.id)
            .bind(order.user_id)
            .bind(order.shop_id)
            .bind(order.total_price)
            .bind(order.status)
            .bind(&order.remark)
            .bind(order.created_at)
            .bind(order.updated_at)
            .execute(&mut *tx)
            .await?;
        insert_children(&mut tx, &order).await?;
        insert_log(&mut tx, &order.initial_log()).await?;
        tx.commit().await?;
        Ok(order)
    }

    async fn get_order(&self, id: i64, shop_id: i64) -> AppResult<Order> {
        let mut conn = self.pool.acquire().await?;
        fetch_order(&mut conn, id, shop_id, false).await
    }

    async fn list_orders(&self, query: &OrderQuery, page: PageRequest) -> AppResult<Page<OrderSummary>> {
        let mut count = QueryBuilder::new("SELECT COUNT(*) FROM orders");
        push_filters(&mut count, query);
        let total: i64 = count.build_query_scalar::<i64>().fetch_one(&self.pool).await?;

        let mut select = QueryBuilder::new(format!("SELECT {ORDER_COLUMNS} FROM orders"));
        push_filters(&mut select, query);
        select
            .push(" ORDER BY created_at DESC, id DESC LIMIT ")
            .push_bind(page.limit())
            .push(" OFFSET ")
            .push_bind(page.offset());
        let rows = select.build_query_as::<OrderSummary>().fetch_all(&self.pool).await?;
        Ok(Page::new(rows, total, page))
    }

    async fn replace_items(&self, id: i64, shop_id: i64, basket: Basket, remark: Option<String>) -> AppResult<Order> {
        let mut tx = self.pool.begin().await?;
        let flow = shop_flow(&mut tx, shop_id).await?;
        let mut order = fetch_order(&mut tx, id, shop_id, true).await?;

        let mut touched: Vec<i64> = order.items.iter().map(|i| i.product_id).collect();
        touched.extend(basket.product_ids());
        let before = lock_stock(&mut tx, &touched).await?;
        let catalog = load_catalog(&mut tx, shop_id, &basket.product_ids()).await?;
        let mut levels = before.clone();
        rebasket_order(&mut order, &basket, &flow, &catalog, &mut levels)?;
        if let Some(remark) = remark {
            order.remark = remark;
        }
        write_levels(&mut tx, &before, &levels).await?;

        delete_children(&mut tx, order.id).await?;
        insert_children(&mut tx, &order).await?;
        sqlx::query("UPDATE orders SET total_price = $2, remark = $3, updated_at = $4 WHERE id = $1")
            .bind(order.id)
            .bind(order.total_price)
            .bind(&order.remark)
            .bind(order.updated_at)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(order)
    }

    async fn change_status(&self, id: i64, shop_id: i64, next: i32) -> AppResult<StatusChange> {
        let mut tx = self.pool.begin().await?;
        let flow = shop_flow(&mut tx, shop_id).await?;
        let mut order = fetch_order(&mut tx, id, shop_id, true).await?;
        let (change, log, restock) = advance_status(&mut order, next, &flow, Utc::now())?;
        if let Some(plan) = restock {
            let before = lock_stock(&mut tx, &plan.product_ids()).await?;
            let mut levels = before.clone();
            plan.restore(&mut levels);
            write_levels(&mut tx, &before, &levels).await?;
        }
        sqlx::query("UPDATE orders SET status = $2, updated_at = $3 WHERE id = $1")
            .bind(order.id)
            .bind(order.status)
            .bind(order.updated_at)
            .execute(&mut *tx)
            .await?;
        insert_log(&mut tx, &log).await?;
        tx.commit().await?;
        Ok(change)
    }

    async fn delete_order(&self, id: i64, shop_id: i64) -> AppResult<()> {
        let mut tx = self.pool.begin().await?;
        let flow = shop_flow(&mut tx, shop_id).await?;
        let order = fetch_order(&mut tx, id, shop_id, true).await?;
        if let Some(plan) = restock_on_delete(&order, &flow) {
            let before = lock_stock(&mut tx, &plan.product_ids()).await?;
            let mut levels = before.clone();
            plan.restore(&mut levels);
            write_levels(&mut tx, &before, &levels).await?;
        }
        sqlx::query("DELETE FROM order_status_logs WHERE order_id = $1").bind(id).execute(&mut *tx).await?;
        delete_children(&mut tx, id).await?;
        let deleted = sqlx::query("DELETE FROM orders WHERE id = $1 AND shop_id = $2")
            .bind(id)
            .bind(shop_id)
            .execute(&mut *tx)
            .await?;
        if deleted.rows_affected() == 0 {
            return Err(AppError::not_found(format!("order {id} not found")));
        }
        tx.commit().await?;
        Ok(())
    }

    async fn status_logs(&self, id: i64, shop_id: i64) -> AppResult<Vec<OrderStatusLog>> {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM orders WHERE id = $1 AND shop_id = $2)")
            .bind(id)
            .bind(shop_id)
            .fetch_one(&self.pool)
            .await?;
        if !exists {
            return Err(AppError::not_found(format!("order {id} not found")));
        }
        let rows: Vec<LogRow> = sqlx::query_as(
            "SELECT id, order_id, old_status, new_status, changed_time FROM order_status_logs
             WHERE order_id = $1 ORDER BY changed_time, id",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(OrderStatusLog::from).collect())
    }
}
