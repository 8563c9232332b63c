//! Periodic maintenance jobs spawned at startup.

use std::time::Duration;
use tokio::task::JoinHandle;

use crate::state::AppState;

const LIMITER_EVICTION_EVERY: Duration = Duration::from_secs(60 * 60);
const TOKEN_PURGE_EVERY: Duration = Duration::from_secs(24 * 60 * 60);

pub fn spawn_all(state: &AppState) -> Vec<JoinHandle<()>> {
    vec![spawn_limiter_eviction(state), spawn_token_purge(state)]
}

/// Hourly drop of rate-limit buckets from past windows.
pub fn spawn_limiter_eviction(state: &AppState) -> JoinHandle<()> {
    let limiter = state.limiter.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(LIMITER_EVICTION_EVERY);
        loop {
            interval.tick().await;
            let evicted = limiter.evict();
            tracing::debug!(evicted, remaining = limiter.len(), "rate-limit buckets evicted");
        }
    })
}

/// Daily removal of blacklisted tokens that have expired on their own.
pub fn spawn_token_purge(state: &AppState) -> JoinHandle<()> {
    let auth = state.auth.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(TOKEN_PURGE_EVERY);
        loop {
            interval.tick().await;
            match auth.purge_expired_tokens().await {
                Ok(purged) => tracing::info!(purged, "expired blacklisted tokens purged"),
                Err(e) => tracing::error!(error = %e, "token purge failed"),
            }
        }
    })
}
