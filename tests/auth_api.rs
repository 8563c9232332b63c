mod common;

use axum::http::{Method, StatusCode};
use serde_json::json;

use common::{TestApp, OWNER_PASSWORD};

#[tokio::test]
async fn health_is_public() {
    let t = TestApp::new().await;
    let (status, body) = t.send(Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn missing_or_bad_token_is_unauthenticated() {
    let t = TestApp::new().await;
    let (status, body) = t.send(Method::GET, "/shopOwner/order/list", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["error"].is_string());

    let (status, _) = t.send(Method::GET, "/shopOwner/order/list", Some("garbage"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn wrong_role_is_forbidden() {
    let t = TestApp::new().await;
    let (status, _) = t.send(Method::GET, "/admin/shop/list", Some(&t.owner(456)), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = t.send(Method::GET, "/shopOwner/order/list", Some(&t.customer(5)), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = t.send(Method::GET, "/user/order/list?shop_id=456", Some(&t.admin()), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn owner_login_then_logout_revokes_token() {
    let t = TestApp::new().await;
    let creds = json!({ "username": "owner456", "password": OWNER_PASSWORD });
    let (status, session) = t.send(Method::POST, "/shopOwner/login", None, Some(creds)).await;
    assert_eq!(status, StatusCode::OK, "{session}");
    assert_eq!(session["role"], "shop_owner");
    assert_eq!(session["id"], 456);
    let token = session["token"].as_str().unwrap().to_string();

    let (status, shop) = t.send(Method::GET, "/shopOwner/shop/detail", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(shop["id"], 456);
    assert!(shop.get("owner_password_hash").is_none());

    let (status, _) = t.send(Method::POST, "/logout", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = t.send(Method::GET, "/shopOwner/shop/detail", Some(&token), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn bad_password_and_expired_shop_cannot_login() {
    let t = TestApp::new().await;
    let wrong = json!({ "username": "owner456", "password": "nope-nope" });
    let (status, _) = t.send(Method::POST, "/shopOwner/login", None, Some(wrong)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let expired = json!({ "username": "owner777", "password": OWNER_PASSWORD });
    let (status, _) = t.send(Method::POST, "/shopOwner/login", None, Some(expired)).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn register_and_login_customer() {
    let t = TestApp::new().await;
    let reg = json!({ "name": "alice", "password": "secret1" });
    let (status, user) = t.send(Method::POST, "/user/register", None, Some(reg.clone())).await;
    assert_eq!(status, StatusCode::OK, "{user}");
    assert!(user.get("password_hash").is_none());

    let (status, _) = t.send(Method::POST, "/user/register", None, Some(reg)).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let creds = json!({ "username": "alice", "password": "secret1" });
    let (status, session) = t.send(Method::POST, "/user/login", None, Some(creds)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(session["role"], "user");
    assert_eq!(session["id"], user["id"]);
}

#[tokio::test]
async fn malformed_body_is_bad_request() {
    let t = TestApp::new().await;
    let (status, body) = t.send(Method::POST, "/user/register", None, Some(json!({ "name": 5 }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());

    let short = json!({ "name": "al", "password": "secret1" });
    let (status, _) = t.send(Method::POST, "/user/register", None, Some(short)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn bootstrap_admin_can_log_in() {
    let t = TestApp::new().await;
    t.state.auth.bootstrap_admin("root", "root-secret").await.unwrap();
    let creds = json!({ "username": "root", "password": "root-secret" });
    let (status, session) = t.send(Method::POST, "/admin/login", None, Some(creds)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(session["role"], "admin");
}
