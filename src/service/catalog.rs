//! Product catalog management and storefront reads.

use serde::Deserialize;
use std::sync::Arc;
use tracing::instrument;
use validator::Validate;

use super::{writable_shop, Actor};
use crate::domain::aggregates::{Product, ProductDetails, ProductDraft, ProductStatus};
use crate::domain::value_objects::PageRequest;
use crate::error::{AppError, AppResult};
use crate::store::{CatalogStore, Page, ShopStore};

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct UpdateProductRequest {
    pub id: i64,
    #[serde(flatten)]
    #[validate]
    pub details: ProductDetails,
    /// Restock or write-off applied to the stored level. An absolute `stock`
    /// in the body is ignored so reservations made since the form was read
    /// survive the edit.
    #[serde(default)]
    pub stock_delta: i32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProductStatusRequest {
    pub id: i64,
    pub status: String,
}

#[derive(Clone)]
pub struct CatalogService {
    catalog: Arc<dyn CatalogStore>,
    shops: Arc<dyn ShopStore>,
}

impl CatalogService {
    pub fn new(catalog: Arc<dyn CatalogStore>, shops: Arc<dyn ShopStore>) -> Self {
        Self { catalog, shops }
    }

    #[instrument(skip(self, draft))]
    pub async fn create(&self, shop_id: i64, draft: ProductDraft) -> AppResult<Product> {
        draft.validate()?;
        writable_shop(self.shops.as_ref(), Actor::ShopOwner { shop_id }, shop_id).await?;
        let product = self.catalog.create_product(Product::create(shop_id, draft)).await?;
        tracing::info!(product_id = product.id, shop_id, "product created");
        Ok(product)
    }

    #[instrument(skip(self, req), fields(product_id = req.id))]
    pub async fn update(&self, shop_id: i64, req: UpdateProductRequest) -> AppResult<Product> {
        req.validate()?;
        writable_shop(self.shops.as_ref(), Actor::ShopOwner { shop_id }, shop_id).await?;
        let product = self.catalog.update_product(req.id, shop_id, req.details, req.stock_delta).await?;
        tracing::info!(product_id = product.id, shop_id, stock = product.stock, stock_delta = req.stock_delta, "product updated");
        Ok(product)
    }

    #[instrument(skip(self, req), fields(product_id = req.id, status = %req.status))]
    pub async fn toggle_status(&self, shop_id: i64, req: ProductStatusRequest) -> AppResult<Product> {
        let next: ProductStatus = req.status.parse()?;
        writable_shop(self.shops.as_ref(), Actor::ShopOwner { shop_id }, shop_id).await?;
        let product = self.catalog.change_product_status(req.id, shop_id, next).await?;
        tracing::info!(product_id = product.id, shop_id, status = product.status.as_str(), "product status changed");
        Ok(product)
    }

    pub async fn get(&self, shop_id: i64, id: i64) -> AppResult<Product> {
        self.catalog.get_product(id, shop_id).await
    }

    pub async fn list(&self, shop_id: i64, page: PageRequest) -> AppResult<Page<Product>> {
        self.catalog.list_products(shop_id, None, page).await
    }

    #[instrument(skip(self))]
    pub async fn delete(&self, shop_id: i64, id: i64) -> AppResult<()> {
        writable_shop(self.shops.as_ref(), Actor::ShopOwner { shop_id }, shop_id).await?;
        self.catalog.delete_product(id, shop_id).await?;
        tracing::info!(product_id = id, shop_id, "product deleted");
        Ok(())
    }

    /// Online products of a shop, as shown to customers.
    pub async fn storefront(&self, shop_id: i64, page: PageRequest) -> AppResult<Page<Product>> {
        self.shops.get_shop(shop_id).await?;
        self.catalog.list_products(shop_id, Some(ProductStatus::Online), page).await
    }

    pub async fn storefront_product(&self, shop_id: i64, id: i64) -> AppResult<Product> {
        let product = self.catalog.get_product(id, shop_id).await?;
        if !product.is_on_sale() {
            return Err(AppError::not_found(format!("product {id} not found")));
        }
        Ok(product)
    }
}
