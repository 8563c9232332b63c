//! Product catalog persistence.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgConnection, Postgres, QueryBuilder};
use std::collections::HashMap;

use super::PgStore;
use crate::domain::aggregates::{OptionCategory, Product, ProductDetails, ProductOption, ProductStatus};
use crate::domain::pricing::{CatalogCategory, CatalogOption, CatalogProduct, CatalogSnapshot};
use crate::domain::value_objects::{Money, PageRequest};
use crate::error::{AppError, AppResult};
use crate::store::{CatalogStore, Page};

const PRODUCT_COLUMNS: &str = "id, shop_id, name, description, price, stock, image_url, status, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct ProductRow {
    id: i64,
    shop_id: i64,
    name: String,
    description: String,
    price: Money,
    stock: i32,
    image_url: String,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct CategoryRow {
    id: i64,
    product_id: i64,
    name: String,
    is_required: bool,
    is_multiple: bool,
    display_order: i32,
}

#[derive(sqlx::FromRow)]
struct OptionRow {
    id: i64,
    category_id: i64,
    name: String,
    price_adjustment: Money,
    is_default: bool,
    display_order: i32,
}

fn parse_status(raw: &str) -> AppResult<ProductStatus> {
    raw.parse().map_err(|e| AppError::internal(format!("stored product status: {e}")))
}

async fn fetch_categories(conn: &mut PgConnection, product_ids: &[i64]) -> AppResult<(Vec<CategoryRow>, Vec<OptionRow>)> {
    let categories: Vec<CategoryRow> = sqlx::query_as(
        "SELECT id, product_id, name, is_required, is_multiple, display_order
         FROM product_option_categories WHERE product_id = ANY($1) ORDER BY display_order, id",
    )
    .bind(product_ids)
    .fetch_all(&mut *conn)
    .await?;
    let category_ids: Vec<i64> = categories.iter().map(|c| c.id).collect();
    let options: Vec<OptionRow> = sqlx::query_as(
        "SELECT id, category_id, name, price_adjustment, is_default, display_order
         FROM product_options WHERE category_id = ANY($1) ORDER BY display_order, id",
    )
    .bind(&category_ids)
    .fetch_all(&mut *conn)
    .await?;
    Ok((categories, options))
}

/// Attach option trees to product rows, keeping row order.
async fn assemble(conn: &mut PgConnection, rows: Vec<ProductRow>) -> AppResult<Vec<Product>> {
    let ids: Vec<i64> = rows.iter().map(|r| r.id).collect();
    let (categories, options) = fetch_categories(conn, &ids).await?;

    let mut options_by_category: HashMap<i64, Vec<ProductOption>> = HashMap::new();
    for o in options {
        options_by_category.entry(o.category_id).or_default().push(ProductOption {
            id: o.id, category_id: o.category_id, name: o.name, price_adjustment: o.price_adjustment,
            is_default: o.is_default, display_order: o.display_order,
        });
    }
    let mut categories_by_product: HashMap<i64, Vec<OptionCategory>> = HashMap::new();
    for c in categories {
        categories_by_product.entry(c.product_id).or_default().push(OptionCategory {
            id: c.id, product_id: c.product_id, name: c.name, is_required: c.is_required, is_multiple: c.is_multiple,
            display_order: c.display_order, options: options_by_category.remove(&c.id).unwrap_or_default(),
        });
    }

    rows.into_iter()
        .map(|r| -> AppResult<Product> {
            Ok(Product {
                status: parse_status(&r.status)?,
                option_categories: categories_by_product.remove(&r.id).unwrap_or_default(),
                id: r.id, shop_id: r.shop_id, name: r.name, description: r.description, price: r.price,
                stock: r.stock, image_url: r.image_url, created_at: r.created_at, updated_at: r.updated_at,
            })
        })
        .collect()
}

async fn fetch_product(conn: &mut PgConnection, id: i64, shop_id: i64, lock: bool) -> AppResult<Product> {
    let sql = format!(
        "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1 AND shop_id = $2{}",
        if lock { " FOR UPDATE" } else { "" }
    );
    let row: Option<ProductRow> = sqlx::query_as(&sql).bind(id).bind(shop_id).fetch_optional(&mut *conn).await?;
    let row = row.ok_or_else(|| AppError::not_found(format!("product {id} not found")))?;
    assemble(conn, vec![row]).await?.pop().ok_or_else(|| AppError::not_found(format!("product {id} not found")))
}

async fn insert_option_tree(conn: &mut PgConnection, product: &Product) -> AppResult<()> {
    let cats = &product.option_categories;
    if cats.is_empty() {
        return Ok(());
    }
    sqlx::query(
        r#"
        INSERT INTO product_option_categories (id, product_id, name, is_required, is_multiple, display_order)
        SELECT * FROM UNNEST($1::bigint[], $2::bigint[], $3::text[], $4::boolean[], $5::boolean[], $6::integer[])
        "#,
    )
    .bind(cats.iter().map(|c| c.id).collect::<Vec<_>>())
    .bind(cats.iter().map(|_| product.id).collect::<Vec<_>>())
    .bind(cats.iter().map(|c| c.name.clone()).collect::<Vec<_>>())
    .bind(cats.iter().map(|c| c.is_required).collect::<Vec<_>>())
    .bind(cats.iter().map(|c| c.is_multiple).collect::<Vec<_>>())
    .bind(cats.iter().map(|c| c.display_order).collect::<Vec<_>>())
    .execute(&mut *conn)
    .await?;

    let opts: Vec<&ProductOption> = cats.iter().flat_map(|c| c.options.iter()).collect();
    if opts.is_empty() {
        return Ok(());
    }
    sqlx::query(
        r#"
        INSERT INTO product_options (id, category_id, name, price_adjustment, is_default, display_order)
        SELECT * FROM UNNEST($1::bigint[], $2::bigint[], $3::text[], $4::numeric[], $5::boolean[], $6::integer[])
        "#,
    )
    .bind(opts.iter().map(|o| o.id).collect::<Vec<_>>())
    .bind(opts.iter().map(|o| o.category_id).collect::<Vec<_>>())
    .bind(opts.iter().map(|o| o.name.clone()).collect::<Vec<_>>())
    .bind(opts.iter().map(|o| o.price_adjustment.amount()).collect::<Vec<Decimal>>())
    .bind(opts.iter().map(|o| o.is_default).collect::<Vec<_>>())
    .bind(opts.iter().map(|o| o.display_order).collect::<Vec<_>>())
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Lock the shop's products referenced by an order (ascending id) and read the
/// option rows that belong to them. Products of other shops are left out.
pub(super) async fn load_catalog(conn: &mut PgConnection, shop_id: i64, product_ids: &[i64]) -> AppResult<CatalogSnapshot> {
    let rows: Vec<ProductRow> = sqlx::query_as(&format!(
        "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = ANY($1) AND shop_id = $2 ORDER BY id FOR UPDATE"
    ))
    .bind(product_ids)
    .bind(shop_id)
    .fetch_all(&mut *conn)
    .await?;
    let ids: Vec<i64> = rows.iter().map(|r| r.id).collect();
    let (categories, options) = fetch_categories(conn, &ids).await?;

    let products = rows
        .into_iter()
        .map(|r| -> AppResult<CatalogProduct> {
            Ok(CatalogProduct {
                status: parse_status(&r.status)?,
                id: r.id, shop_id: r.shop_id, name: r.name, description: r.description,
                image_url: r.image_url, price: r.price, stock: r.stock,
            })
        })
        .collect::<AppResult<Vec<_>>>()?;
    let categories = categories
        .into_iter()
        .map(|c| CatalogCategory { id: c.id, product_id: c.product_id, name: c.name, is_required: c.is_required, is_multiple: c.is_multiple })
        .collect();
    let options = options
        .into_iter()
        .map(|o| CatalogOption { id: o.id, category_id: o.category_id, name: o.name, price_adjustment: o.price_adjustment })
        .collect();
    Ok(CatalogSnapshot::new(products, categories, options))
}

#[async_trait]
impl CatalogStore for PgStore {
    async fn create_product(&self, product: Product) -> AppResult<Product> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            r#"
            INSERT INTO products (id, shop_id, name, description, price, stock, image_url, status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(product.id)
        .bind(product.shop_id)
        .bind(&product.name)
        .bind(&product.description)
        .bind(product.price)
        .bind(product.stock)
        .bind(&product.image_url)
        .bind(product.status.as_str())
        .bind(product.created_at)
        .bind(product.updated_at)
        .execute(&mut *tx)
        .await?;
        insert_option_tree(&mut tx, &product).await?;
        tx.commit().await?;
        Ok(product)
    }

    async fn get_product(&self, id: i64, shop_id: i64) -> AppResult<Product> {
        let mut conn = self.pool.acquire().await?;
        fetch_product(&mut conn, id, shop_id, false).await
    }

    async fn list_products(&self, shop_id: i64, status: Option<ProductStatus>, page: PageRequest) -> AppResult<Page<Product>> {
        fn filters<'a>(qb: &mut QueryBuilder<'a, Postgres>, shop_id: i64, status: Option<ProductStatus>) {
            qb.push(" WHERE shop_id = ").push_bind(shop_id);
            if let Some(s) = status {
                qb.push(" AND status = ").push_bind(s.as_str());
            }
        }

        let mut conn = self.pool.acquire().await?;
        let mut count = QueryBuilder::new("SELECT COUNT(*) FROM products");
        filters(&mut count, shop_id, status);
        let total: i64 = count.build_query_scalar::<i64>().fetch_one(&mut *conn).await?;

        let mut select = QueryBuilder::new(format!("SELECT {PRODUCT_COLUMNS} FROM products"));
        filters(&mut select, shop_id, status);
        select
            .push(" ORDER BY created_at DESC, id DESC LIMIT ")
            .push_bind(page.limit())
            .push(" OFFSET ")
            .push_bind(page.offset());
        let rows: Vec<ProductRow> = select.build_query_as::<ProductRow>().fetch_all(&mut *conn).await?;
        let products = assemble(&mut conn, rows).await?;
        Ok(Page::new(products, total, page))
    }

    async fn update_product(&self, id: i64, shop_id: i64, details: ProductDetails, stock_delta: i32) -> AppResult<Product> {
        let mut tx = self.pool.begin().await?;
        // Row lock first so concurrent reservations are not overwritten.
        let mut product = fetch_product(&mut tx, id, shop_id, true).await?;
        product.adjust_stock(stock_delta)?;
        product.apply(details);
        sqlx::query(
            r#"
            UPDATE products SET name = $2, description = $3, price = $4, stock = $5, image_url = $6, updated_at = $7
            WHERE id = $1
            "#,
        )
        .bind(product.id)
        .bind(&product.name)
        .bind(&product.description)
        .bind(product.price)
        .bind(product.stock)
        .bind(&product.image_url)
        .bind(product.updated_at)
        .execute(&mut *tx)
        .await?;
        sqlx::query("DELETE FROM product_option_categories WHERE product_id = $1")
            .bind(product.id)
            .execute(&mut *tx)
            .await?;
        insert_option_tree(&mut tx, &product).await?;
        tx.commit().await?;
        Ok(product)
    }

    async fn change_product_status(&self, id: i64, shop_id: i64, next: ProductStatus) -> AppResult<Product> {
        let mut tx = self.pool.begin().await?;
        let mut product = fetch_product(&mut tx, id, shop_id, true).await?;
        product.transition_to(next)?;
        sqlx::query("UPDATE products SET status = $2, updated_at = $3 WHERE id = $1")
            .bind(id)
            .bind(product.status.as_str())
            .bind(product.updated_at)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(product)
    }

    async fn delete_product(&self, id: i64, shop_id: i64) -> AppResult<()> {
        let mut tx = self.pool.begin().await?;
        let locked: Option<i64> = sqlx::query_scalar("SELECT id FROM products WHERE id = $1 AND shop_id = $2 FOR UPDATE")
            .bind(id)
            .bind(shop_id)
            .fetch_optional(&mut *tx)
            .await?;
        if locked.is_none() {
            return Err(AppError::not_found(format!("product {id} not found")));
        }
        let referenced: bool = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM order_items WHERE product_id = $1)")
            .bind(id)
            .fetch_one(&mut *tx)
            .await?;
        if referenced {
            return Err(AppError::precondition("product is referenced by orders; take it offline instead"));
        }
        sqlx::query("DELETE FROM products WHERE id = $1").bind(id).execute(&mut *tx).await?;
        tx.commit().await?;
        Ok(())
    }
}
