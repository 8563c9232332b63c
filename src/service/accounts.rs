//! Logins, registration, logout and token checks.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::instrument;
use validator::Validate;

use crate::auth::{hash_password, verify_password, JwtService, Principal, Role};
use crate::domain::aggregates::{Admin, Registration, User};
use crate::error::{AppError, AppResult};
use crate::store::{AccountStore, ShopStore};

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(length(min = 1, max = 50))]
    pub username: String,
    #[validate(length(min = 1, max = 100))]
    pub password: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub role: Role,
    pub id: i64,
    pub username: String,
}

#[derive(Clone)]
pub struct AuthService {
    accounts: Arc<dyn AccountStore>,
    shops: Arc<dyn ShopStore>,
    jwt: Arc<JwtService>,
}

fn bad_credentials() -> AppError {
    AppError::unauthenticated("invalid username or password")
}

impl AuthService {
    pub fn new(accounts: Arc<dyn AccountStore>, shops: Arc<dyn ShopStore>, jwt: Arc<JwtService>) -> Self {
        Self { accounts, shops, jwt }
    }

    #[instrument(skip(self, req), fields(username = %req.username))]
    pub async fn login_admin(&self, req: LoginRequest) -> AppResult<LoginResponse> {
        req.validate()?;
        let admin = self.accounts.find_admin(&req.username).await?.ok_or_else(bad_credentials)?;
        if !verify_password(&req.password, &admin.password_hash) {
            return Err(bad_credentials());
        }
        self.issue(admin.id, &admin.username, Role::Admin)
    }

    /// Owners of an expired shop are turned away even with the right password.
    #[instrument(skip(self, req), fields(username = %req.username))]
    pub async fn login_owner(&self, req: LoginRequest) -> AppResult<LoginResponse> {
        req.validate()?;
        let shop = self.shops.find_shop_by_owner(&req.username).await?.ok_or_else(bad_credentials)?;
        if !verify_password(&req.password, &shop.owner_password_hash) {
            return Err(bad_credentials());
        }
        shop.ensure_active(Utc::now())?;
        self.issue(shop.id, &shop.owner_username, Role::ShopOwner)
    }

    #[instrument(skip(self, req), fields(username = %req.username))]
    pub async fn login_user(&self, req: LoginRequest) -> AppResult<LoginResponse> {
        req.validate()?;
        let user = self.accounts.find_user(&req.username).await?.ok_or_else(bad_credentials)?;
        if !verify_password(&req.password, &user.password_hash) {
            return Err(bad_credentials());
        }
        self.issue(user.id, &user.name, Role::User)
    }

    #[instrument(skip(self, registration), fields(username = %registration.name))]
    pub async fn register(&self, registration: Registration) -> AppResult<User> {
        registration.validate()?;
        if self.accounts.find_user(&registration.name).await?.is_some() {
            return Err(AppError::Conflict(format!("username '{}' is taken", registration.name)));
        }
        let hash = hash_password(&registration.password)?;
        let user = self.accounts.create_user(User::create(registration, hash)).await?;
        tracing::info!(user_id = user.id, "user registered");
        Ok(user)
    }

    /// Revoke the caller's token until it would have expired anyway.
    pub async fn logout(&self, principal: &Principal) -> AppResult<()> {
        self.accounts.blacklist_token(&principal.jti, principal.expires_at).await?;
        tracing::info!(principal = principal.id, role = principal.role.as_str(), "logged out");
        Ok(())
    }

    pub async fn authenticate(&self, token: &str) -> AppResult<Principal> {
        let claims = self.jwt.validate(token)?;
        if self.accounts.is_token_blacklisted(&claims.jti).await? {
            return Err(AppError::unauthenticated("token has been revoked"));
        }
        Ok(Principal::from(claims))
    }

    /// Create the first administrator when none exists yet.
    pub async fn bootstrap_admin(&self, username: &str, password: &str) -> AppResult<Option<Admin>> {
        if self.accounts.count_admins().await? > 0 {
            return Ok(None);
        }
        let admin = self.accounts.create_admin(username, &hash_password(password)?).await?;
        tracing::info!(admin_id = admin.id, username, "bootstrap administrator created");
        Ok(Some(admin))
    }

    pub async fn purge_expired_tokens(&self) -> AppResult<u64> {
        self.accounts.purge_expired_tokens(Utc::now()).await
    }

    fn issue(&self, id: i64, username: &str, role: Role) -> AppResult<LoginResponse> {
        let issued = self.jwt.issue(id, username, role)?;
        Ok(LoginResponse { token: issued.token, expires_at: issued.expires_at, role, id, username: username.to_string() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::{Shop, ShopDraft};
    use crate::domain::flow::OrderStatusFlow;
    use crate::store::MemoryStore;
    use chrono::Duration;

    fn service() -> (AuthService, MemoryStore) {
        let store = MemoryStore::new();
        let jwt = Arc::new(JwtService::new("0123456789abcdef0123456789abcdef", 60));
        (AuthService::new(Arc::new(store.clone()), Arc::new(store.clone()), jwt), store)
    }

    fn login(username: &str, password: &str) -> LoginRequest {
        LoginRequest { username: username.into(), password: password.into() }
    }

    #[tokio::test]
    async fn test_register_login_logout() {
        let (svc, _) = service();
        let user = svc.register(Registration { name: "alice".into(), password: "secret1".into(), phone: String::new() }).await.unwrap();
        let again = svc.register(Registration { name: "alice".into(), password: "secret2".into(), phone: String::new() }).await;
        assert!(matches!(again, Err(AppError::Conflict(_))));

        assert!(matches!(svc.login_user(login("alice", "wrong")).await, Err(AppError::Unauthenticated(_))));
        let session = svc.login_user(login("alice", "secret1")).await.unwrap();
        let principal = svc.authenticate(&session.token).await.unwrap();
        assert_eq!(principal.id, user.id);
        assert_eq!(principal.role, Role::User);

        svc.logout(&principal).await.unwrap();
        assert!(matches!(svc.authenticate(&session.token).await, Err(AppError::Unauthenticated(_))));
    }

    #[tokio::test]
    async fn test_expired_shop_owner_cannot_login() {
        let (svc, store) = service();
        let draft = ShopDraft {
            name: "Old Shop".into(), owner_username: "oldowner".into(), owner_password: "secret1".into(),
            contact_phone: String::new(), contact_email: None, address: String::new(), description: String::new(),
            image_url: String::new(), valid_until: Utc::now() - Duration::days(1), settings: None, order_status_flow: None,
        };
        let shop = Shop::create(draft, hash_password("secret1").unwrap(), OrderStatusFlow::default());
        store.create_shop(shop).await.unwrap();
        assert!(matches!(svc.login_owner(login("oldowner", "secret1")).await, Err(AppError::PreconditionFailed(_))));
    }

    #[tokio::test]
    async fn test_bootstrap_admin_runs_once() {
        let (svc, _) = service();
        assert!(svc.bootstrap_admin("root", "secret1").await.unwrap().is_some());
        assert!(svc.bootstrap_admin("root2", "secret1").await.unwrap().is_none());
        let session = svc.login_admin(login("root", "secret1")).await.unwrap();
        assert_eq!(session.role, Role::Admin);
    }
}
