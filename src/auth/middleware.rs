//! Bearer-token middleware for the authenticated route groups.

use axum::{
    extract::{Query, Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};
use serde::Deserialize;

use super::jwt::bearer_token;
use crate::error::AppError;
use crate::state::AppState;

/// Browsers cannot set headers on an `EventSource`, so the event stream may
/// pass the token as `?token=`.
#[derive(Deserialize)]
struct TokenParam {
    token: Option<String>,
}

pub async fn require_auth(State(state): State<AppState>, mut req: Request, next: Next) -> Result<Response, AppError> {
    let from_header = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(bearer_token)
        .map(str::to_owned);
    let token = match from_header {
        Some(t) => t,
        None => Query::<TokenParam>::try_from_uri(req.uri())
            .ok()
            .and_then(|q| q.0.token)
            .ok_or_else(|| AppError::unauthenticated("missing bearer token"))?,
    };

    let principal = state.auth.authenticate(&token).await?;
    tracing::debug!(principal = principal.id, role = principal.role.as_str(), path = %req.uri().path(), "authenticated");
    req.extensions_mut().insert(principal);
    Ok(next.run(req).await)
}
