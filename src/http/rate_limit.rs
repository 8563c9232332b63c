//! Per-IP fixed-window request limiting.

use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::Response,
};
use dashmap::DashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use crate::error::AppError;
use crate::state::AppState;

const WINDOW_SECS: i64 = 60;

#[derive(Debug, Clone, Copy)]
struct Bucket {
    /// Index of the one-minute window the count belongs to.
    window: i64,
    count: u32,
}

#[derive(Clone)]
pub struct RateLimiter {
    buckets: Arc<DashMap<String, Bucket>>,
    per_window: u32,
    trusted_proxies: Arc<[IpAddr]>,
}

impl RateLimiter {
    /// `per_window == 0` disables limiting.
    pub fn new(per_window: u32) -> Self {
        Self { buckets: Arc::new(DashMap::new()), per_window, trusted_proxies: Arc::from(Vec::new()) }
    }

    /// Peers whose `X-Forwarded-For` header is believed.
    pub fn with_trusted_proxies(mut self, proxies: Vec<IpAddr>) -> Self {
        self.trusted_proxies = proxies.into();
        self
    }

    fn trusts(&self, ip: IpAddr) -> bool {
        self.trusted_proxies.contains(&ip)
    }

    /// The peer address, unless the peer is a trusted proxy. Then the
    /// forwarded chain is walked right to left and the first hop not owned by
    /// a trusted proxy is the client.
    fn client_ip(&self, req: &Request) -> String {
        let Some(peer) = req.extensions().get::<ConnectInfo<SocketAddr>>().map(|ci| ci.0.ip()) else {
            return "unknown".to_owned();
        };
        if !self.trusts(peer) {
            return peer.to_string();
        }
        let hops = req
            .headers()
            .get_all("x-forwarded-for")
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(','))
            .map(str::trim)
            .collect::<Vec<_>>();
        let mut client = peer;
        for hop in hops.into_iter().rev() {
            match hop.parse::<IpAddr>() {
                Ok(ip) => {
                    client = ip;
                    if !self.trusts(ip) {
                        break;
                    }
                }
                Err(_) => break,
            }
        }
        client.to_string()
    }

    pub fn check(&self, ip: &str) -> bool {
        self.check_at(ip, chrono::Utc::now().timestamp())
    }

    fn check_at(&self, ip: &str, now_secs: i64) -> bool {
        if self.per_window == 0 {
            return true;
        }
        let window = now_secs.div_euclid(WINDOW_SECS);
        let mut bucket = self.buckets.entry(ip.to_owned()).or_insert(Bucket { window, count: 0 });
        if bucket.window != window {
            *bucket = Bucket { window, count: 0 };
        }
        bucket.count = bucket.count.saturating_add(1);
        bucket.count <= self.per_window
    }

    /// Drop buckets from past windows. Returns how many were removed.
    pub fn evict(&self) -> usize {
        self.evict_at(chrono::Utc::now().timestamp())
    }

    fn evict_at(&self, now_secs: i64) -> usize {
        let current = now_secs.div_euclid(WINDOW_SECS);
        let before = self.buckets.len();
        self.buckets.retain(|_, b| b.window >= current);
        before - self.buckets.len()
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}

pub async fn rate_limit(State(state): State<AppState>, req: Request, next: Next) -> Result<Response, AppError> {
    let ip = state.limiter.client_ip(&req);
    if !state.limiter.check(&ip) {
        tracing::warn!(ip = %ip, path = %req.uri().path(), "rate limit exceeded");
        return Err(AppError::RateLimited);
    }
    Ok(next.run(req).await)
}
