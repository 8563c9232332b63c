//! Service and HTTP error type.
//!
//! Every handler, service and store returns [`AppResult`]. Domain errors convert
//! into the matching [`AppError`] kind with `?`; the response body is always
//! `{"error": "<message>"}`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use validator::ValidationErrors;

use crate::auth::JwtError;
use crate::domain::aggregates::{BasketError, ProductError, ShopError};
use crate::domain::flow::FlowError;
use crate::domain::pricing::PricingError;
use crate::domain::stock::StockError;
use crate::domain::value_objects::PageError;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    InvalidInput(String),
    #[error("{0}")]
    Unauthenticated(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    PreconditionFailed(String),
    #[error("{0}")]
    OutOfStock(String),
    #[error("{0}")]
    InvalidOption(String),
    #[error("{0}")]
    PriceBelowZero(String),
    #[error("{0}")]
    UnknownCurrentStatus(String),
    #[error("{0}")]
    TerminalStatus(String),
    #[error("{0}")]
    IllegalTransition(String),
    #[error("too many requests")]
    RateLimited,
    #[error("database error: {0}")]
    Database(#[source] sqlx::Error),
    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn invalid(msg: impl Into<String>) -> Self { Self::InvalidInput(msg.into()) }
    pub fn not_found(msg: impl Into<String>) -> Self { Self::NotFound(msg.into()) }
    pub fn forbidden(msg: impl Into<String>) -> Self { Self::Forbidden(msg.into()) }
    pub fn unauthenticated(msg: impl Into<String>) -> Self { Self::Unauthenticated(msg.into()) }
    pub fn precondition(msg: impl Into<String>) -> Self { Self::PreconditionFailed(msg.into()) }
    pub fn internal(msg: impl Into<String>) -> Self { Self::Internal(msg.into()) }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidInput(_)
            | Self::OutOfStock(_)
            | Self::InvalidOption(_)
            | Self::PriceBelowZero(_)
            | Self::UnknownCurrentStatus(_)
            | Self::TerminalStatus(_)
            | Self::IllegalTransition(_) => StatusCode::BAD_REQUEST,
            Self::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) | Self::PreconditionFailed(_) => StatusCode::CONFLICT,
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            Self::Database(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            Self::Database(e) => {
                tracing::error!(error = %e, "database error");
                "internal server error".to_string()
            }
            Self::Internal(msg) => {
                tracing::error!(error = %msg, "internal error");
                "internal server error".to_string()
            }
            other => other.to_string(),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

impl From<sqlx::Error> for AppError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::RowNotFound => Self::NotFound("record not found".into()),
            sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                Self::Conflict(format!("duplicate value violates {}", db.constraint().unwrap_or("a unique constraint")))
            }
            sqlx::Error::Database(ref db) if db.is_foreign_key_violation() => {
                Self::InvalidInput("referenced record does not exist".into())
            }
            other => Self::Database(other),
        }
    }
}

impl From<ValidationErrors> for AppError {
    fn from(e: ValidationErrors) -> Self { Self::InvalidInput(e.to_string()) }
}

impl From<PageError> for AppError {
    fn from(e: PageError) -> Self { Self::InvalidInput(e.to_string()) }
}

impl From<BasketError> for AppError {
    fn from(e: BasketError) -> Self { Self::InvalidInput(e.to_string()) }
}

impl From<ProductError> for AppError {
    fn from(e: ProductError) -> Self { Self::InvalidInput(e.to_string()) }
}

impl From<ShopError> for AppError {
    fn from(e: ShopError) -> Self {
        match e {
            ShopError::Expired(_) => Self::PreconditionFailed(e.to_string()),
            ShopError::OwnerCannotChange(_) => Self::Forbidden(e.to_string()),
        }
    }
}

impl From<FlowError> for AppError {
    fn from(e: FlowError) -> Self {
        let msg = e.to_string();
        match e {
            FlowError::UnknownCurrentStatus(_) => Self::UnknownCurrentStatus(msg),
            FlowError::TerminalStatus(_) => Self::TerminalStatus(msg),
            FlowError::IllegalTransition { .. } => Self::IllegalTransition(msg),
            FlowError::Invalid(_) => Self::InvalidInput(msg),
        }
    }
}

impl From<PricingError> for AppError {
    fn from(e: PricingError) -> Self {
        let msg = e.to_string();
        match e {
            PricingError::ProductNotFound(_) => Self::NotFound(msg),
            PricingError::ProductUnavailable(_) => Self::InvalidInput(msg),
            PricingError::InvalidOption { .. }
            | PricingError::SingleChoiceViolated { .. }
            | PricingError::MissingRequiredOption { .. } => Self::InvalidOption(msg),
            PricingError::PriceBelowZero(_) => Self::PriceBelowZero(msg),
            PricingError::TotalTooLarge => Self::InvalidInput(msg),
        }
    }
}

impl From<StockError> for AppError {
    fn from(e: StockError) -> Self {
        match e {
            StockError::OutOfStock { .. } => Self::OutOfStock(e.to_string()),
            StockError::ProductMissing { .. } => Self::NotFound(e.to_string()),
        }
    }
}

impl From<JwtError> for AppError {
    fn from(e: JwtError) -> Self {
        match e {
            JwtError::Signing(msg) => Self::Internal(msg),
            other => Self::Unauthenticated(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(AppError::from(StockError::OutOfStock { product_id: 1 }).status(), StatusCode::BAD_REQUEST);
        assert_eq!(AppError::from(FlowError::IllegalTransition { from: 0, to: 9 }).status(), StatusCode::BAD_REQUEST);
        assert_eq!(AppError::from(ShopError::Expired(1)).status(), StatusCode::CONFLICT);
        assert_eq!(AppError::from(sqlx::Error::RowNotFound).status(), StatusCode::NOT_FOUND);
        assert_eq!(AppError::RateLimited.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(AppError::from(JwtError::Expired).status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn test_pricing_errors_map_to_kinds() {
        let e = AppError::from(PricingError::InvalidOption { product_id: 789, option_id: 100 });
        assert!(matches!(e, AppError::InvalidOption(_)));
        let e = AppError::from(PricingError::PriceBelowZero(789));
        assert!(matches!(e, AppError::PriceBelowZero(_)));
    }

    #[test]
    fn test_internal_message_is_hidden() {
        let res = AppError::internal("pool exhausted").into_response();
        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
