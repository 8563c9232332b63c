//! Login, registration and logout endpoints.

use axum::{extract::State, Json};
use serde_json::{json, Value};

use super::extract::ApiJson;
use crate::auth::Principal;
use crate::domain::aggregates::{Registration, User};
use crate::error::AppResult;
use crate::service::{LoginRequest, LoginResponse};
use crate::state::AppState;

pub async fn admin_login(State(state): State<AppState>, ApiJson(req): ApiJson<LoginRequest>) -> AppResult<Json<LoginResponse>> {
    Ok(Json(state.auth.login_admin(req).await?))
}

pub async fn owner_login(State(state): State<AppState>, ApiJson(req): ApiJson<LoginRequest>) -> AppResult<Json<LoginResponse>> {
    Ok(Json(state.auth.login_owner(req).await?))
}

pub async fn user_login(State(state): State<AppState>, ApiJson(req): ApiJson<LoginRequest>) -> AppResult<Json<LoginResponse>> {
    Ok(Json(state.auth.login_user(req).await?))
}

pub async fn register(State(state): State<AppState>, ApiJson(req): ApiJson<Registration>) -> AppResult<Json<User>> {
    Ok(Json(state.auth.register(req).await?))
}

pub async fn logout(State(state): State<AppState>, principal: Principal) -> AppResult<Json<Value>> {
    state.auth.logout(&principal).await?;
    Ok(Json(json!({ "message": "logged out" })))
}
