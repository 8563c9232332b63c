//! Request extractors whose rejections use the service error body, plus the
//! query shapes shared by several handlers.

use axum::{
    async_trait,
    extract::{FromRequest, FromRequestParts, Query, Request},
    http::request::Parts,
    Json,
};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::domain::value_objects::PageRequest;
use crate::error::{AppError, AppResult};

/// `Json<T>` that answers malformed bodies with `400 {"error": ...}`.
pub struct ApiJson<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await.map_err(|e| AppError::invalid(e.body_text()))?;
        Ok(Self(value))
    }
}

/// `Query<T>` with the same rejection format.
pub struct ApiQuery<T>(pub T);

#[async_trait]
impl<T, S> FromRequestParts<S> for ApiQuery<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(value) = Query::<T>::from_request_parts(parts, state).await.map_err(|e| AppError::invalid(e.body_text()))?;
        Ok(Self(value))
    }
}

#[derive(Debug, Deserialize)]
pub struct PageParams {
    pub page: Option<i64>,
    #[serde(rename = "pageSize")]
    pub page_size: Option<i64>,
}

impl PageParams {
    pub fn request(&self) -> AppResult<PageRequest> {
        Ok(PageRequest::new(self.page, self.page_size)?)
    }
}

#[derive(Debug, Deserialize)]
pub struct IdParam {
    pub id: i64,
}

#[derive(Debug, Deserialize)]
pub struct ShopPageParams {
    pub shop_id: Option<i64>,
    pub page: Option<i64>,
    #[serde(rename = "pageSize")]
    pub page_size: Option<i64>,
}

impl ShopPageParams {
    pub fn request(&self) -> AppResult<PageRequest> {
        Ok(PageRequest::new(self.page, self.page_size)?)
    }
}
