//! Users, administrators and the token blacklist.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::PgStore;
use crate::domain::aggregates::{Admin, User};
use crate::error::AppResult;
use crate::store::AccountStore;

#[derive(sqlx::FromRow)]
struct UserRow {
    id: i64,
    name: String,
    password_hash: String,
    phone: String,
    created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct AdminRow {
    id: i64,
    username: String,
    password_hash: String,
    created_at: DateTime<Utc>,
}

impl From<UserRow> for User {
    fn from(r: UserRow) -> Self {
        Self { id: r.id, name: r.name, password_hash: r.password_hash, phone: r.phone, created_at: r.created_at }
    }
}

impl From<AdminRow> for Admin {
    fn from(r: AdminRow) -> Self {
        Self { id: r.id, username: r.username, password_hash: r.password_hash, created_at: r.created_at }
    }
}

#[async_trait]
impl AccountStore for PgStore {
    async fn create_user(&self, user: User) -> AppResult<User> {
        sqlx::query("INSERT INTO users (id, name, password_hash, phone, created_at) VALUES ($1, $2, $3, $4, $5)")
            .bind(user.id)
            .bind(&user.name)
            .bind(&user.password_hash)
            .bind(&user.phone)
            .bind(user.created_at)
            .execute(&self.pool)
            .await?;
        Ok(user)
    }

    async fn find_user(&self, name: &str) -> AppResult<Option<User>> {
        let row: Option<UserRow> = sqlx::query_as("SELECT id, name, password_hash, phone, created_at FROM users WHERE name = $1")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(User::from))
    }

    async fn find_admin(&self, username: &str) -> AppResult<Option<Admin>> {
        let row: Option<AdminRow> =
            sqlx::query_as("SELECT id, username, password_hash, created_at FROM admins WHERE username = $1")
                .bind(username)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(Admin::from))
    }

    async fn count_admins(&self) -> AppResult<i64> {
        Ok(sqlx::query_scalar("SELECT COUNT(*) FROM admins").fetch_one(&self.pool).await?)
    }

    async fn create_admin(&self, username: &str, password_hash: &str) -> AppResult<Admin> {
        let row: AdminRow = sqlx::query_as(
            "INSERT INTO admins (username, password_hash) VALUES ($1, $2) RETURNING id, username, password_hash, created_at",
        )
        .bind(username)
        .bind(password_hash)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.into())
    }

    async fn blacklist_token(&self, jti: &str, expires_at: DateTime<Utc>) -> AppResult<()> {
        sqlx::query("INSERT INTO blacklisted_tokens (jti, expires_at) VALUES ($1, $2) ON CONFLICT (jti) DO NOTHING")
            .bind(jti)
            .bind(expires_at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn is_token_blacklisted(&self, jti: &str) -> AppResult<bool> {
        Ok(sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM blacklisted_tokens WHERE jti = $1)")
            .bind(jti)
            .fetch_one(&self.pool)
            .await?)
    }

    async fn purge_expired_tokens(&self, now: DateTime<Utc>) -> AppResult<u64> {
        let res = sqlx::query("DELETE FROM blacklisted_tokens WHERE expires_at <= $1").bind(now).execute(&self.pool).await?;
        Ok(res.rows_affected())
    }
}
