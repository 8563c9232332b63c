//! Runtime configuration, read once from the environment at startup.

use anyhow::{bail, Context, Result};
use std::net::IpAddr;
use std::str::FromStr;

use crate::broadcast::DEFAULT_MAILBOX_CAPACITY;

pub const MIN_JWT_SECRET_LEN: usize = 32;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub db_max_connections: u32,
    pub port: u16,
    pub jwt_secret: String,
    pub jwt_expiration_minutes: i64,
    /// Requests per IP per one-minute window; 0 turns limiting off.
    pub rate_limit_per_minute: u32,
    /// Reverse proxies allowed to name the client in `X-Forwarded-For`.
    pub trusted_proxies: Vec<IpAddr>,
    pub event_mailbox_capacity: usize,
    pub nats_url: Option<String>,
    pub admin_username: Option<String>,
    pub admin_password: Option<String>,
}

impl Config {
    /// Call after `dotenvy::dotenv()` so a `.env` file is honoured.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let jwt_secret = var("JWT_SECRET").context("JWT_SECRET must be set")?;
        if jwt_secret.len() < MIN_JWT_SECRET_LEN {
            bail!("JWT_SECRET must be at least {MIN_JWT_SECRET_LEN} characters");
        }
        let event_mailbox_capacity = parse(&var, "EVENT_MAILBOX_CAPACITY", DEFAULT_MAILBOX_CAPACITY)?;
        if event_mailbox_capacity == 0 {
            bail!("EVENT_MAILBOX_CAPACITY must be positive");
        }

        Ok(Self {
            database_url: var("DATABASE_URL").context("DATABASE_URL must be set")?,
            db_max_connections: parse(&var, "DB_MAX_CONNECTIONS", 10)?,
            port: parse(&var, "PORT", 8080)?,
            jwt_secret,
            jwt_expiration_minutes: parse(&var, "JWT_EXPIRATION_MINUTES", 1440)?,
            rate_limit_per_minute: parse(&var, "RATE_LIMIT_PER_MINUTE", 300)?,
            trusted_proxies: ip_list(var("TRUSTED_PROXIES"))?,
            event_mailbox_capacity,
            nats_url: var("NATS_URL"),
            admin_username: var("ADMIN_USERNAME"),
            admin_password: var("ADMIN_PASSWORD"),
        })
    }
}

fn parse<T>(var: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match var(key) {
        Some(raw) => raw.trim().parse().with_context(|| format!("{key} has an invalid value '{raw}'")),
        None => Ok(default),
    }
}

fn ip_list(raw: Option<String>) -> Result<Vec<IpAddr>> {
    raw.iter()
        .flat_map(|list| list.split(','))
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .map(|ip| ip.parse::<IpAddr>().with_context(|| format!("TRUSTED_PROXIES has an invalid address '{ip}'")))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    const SECRET: &str = "0123456789abcdef0123456789abcdef";

    #[test]
    fn test_defaults() {
        let cfg = Config::from_lookup(lookup(&[("DATABASE_URL", "postgres://x"), ("JWT_SECRET", SECRET)])).unwrap();
        assert_eq!(cfg.port, 8080);
        assert_eq!(cfg.db_max_connections, 10);
        assert_eq!(cfg.jwt_expiration_minutes, 1440);
        assert_eq!(cfg.rate_limit_per_minute, 300);
        assert_eq!(cfg.event_mailbox_capacity, DEFAULT_MAILBOX_CAPACITY);
        assert!(cfg.nats_url.is_none());
        assert!(cfg.trusted_proxies.is_empty());
    }

    #[test]
    fn test_trusted_proxies() {
        let base = [("DATABASE_URL", "postgres://x"), ("JWT_SECRET", SECRET)];
        let cfg = Config::from_lookup(lookup(&[base[0], base[1], ("TRUSTED_PROXIES", "10.0.0.1, ::1")])).unwrap();
        assert_eq!(cfg.trusted_proxies, vec!["10.0.0.1".parse::<IpAddr>().unwrap(), "::1".parse().unwrap()]);
        let err = Config::from_lookup(lookup(&[base[0], base[1], ("TRUSTED_PROXIES", "10.0.0.1,proxy")])).unwrap_err();
        assert!(err.to_string().contains("TRUSTED_PROXIES"));
    }

    #[test]
    fn test_required_and_invalid_values() {
        assert!(Config::from_lookup(lookup(&[("JWT_SECRET", SECRET)])).is_err());
        assert!(Config::from_lookup(lookup(&[("DATABASE_URL", "postgres://x"), ("JWT_SECRET", "short")])).is_err());
        let bad_port = lookup(&[("DATABASE_URL", "postgres://x"), ("JWT_SECRET", SECRET), ("PORT", "eighty")]);
        let err = Config::from_lookup(bad_port).unwrap_err();
        assert!(err.to_string().contains("PORT"));
    }
}
