//! OrderEase - Multi-tenant Merchant Back-Office

use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use std::net::SocketAddr;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use orderease::auth::JwtService;
use orderease::broadcast::{Broadcaster, NatsMirror};
use orderease::http::rate_limit::RateLimiter;
use orderease::store::PgStore;
use orderease::{router, tasks, AppState, Config};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    let db = PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .connect(&config.database_url)
        .await
        .context("connecting to the database")?;
    sqlx::migrate!("./migrations").run(&db).await.context("running migrations")?;

    let broadcaster = match &config.nats_url {
        Some(url) => match NatsMirror::connect(url).await {
            Ok(mirror) => {
                tracing::info!(url = %url, "mirroring order events to NATS");
                Broadcaster::with_mirror(config.event_mailbox_capacity, mirror)
            }
            Err(e) => {
                tracing::warn!(url = %url, error = %e, "NATS unavailable, events stay in-process");
                Broadcaster::new(config.event_mailbox_capacity)
            }
        },
        None => Broadcaster::new(config.event_mailbox_capacity),
    };

    let state = AppState::new(
        PgStore::new(db),
        broadcaster,
        JwtService::new(&config.jwt_secret, config.jwt_expiration_minutes),
        RateLimiter::new(config.rate_limit_per_minute).with_trusted_proxies(config.trusted_proxies.clone()),
    );

    if let (Some(username), Some(password)) = (&config.admin_username, &config.admin_password) {
        state.auth.bootstrap_admin(username, password).await.context("creating bootstrap administrator")?;
    }

    tasks::spawn_all(&state);

    let app = router(state);
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("OrderEase listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;
    Ok(())
}
