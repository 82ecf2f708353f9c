use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{ConnectInfo, Request, State},
    http::HeaderMap,
    middleware::Next,
    response::{IntoResponse, Response},
};
use dashmap::DashMap;
use tokio::time::Instant;

use crate::error::ApiError;
use crate::metrics::RATE_LIMITED_TOTAL;
use crate::state::AppState;

// Rate limit entry - tracks requests per client key inside its current window
pub struct RateLimitEntry {
    pub count: u32,
    pub window_start: Instant,
}

/// Outcome of a single admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Allowed,
    /// The caller should not retry sooner than `retry_after`.
    Rejected { retry_after: Duration },
}

impl Admission {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Admission::Allowed)
    }

    pub fn retry_after(&self) -> Duration {
        match self {
            Admission::Allowed => Duration::ZERO,
            Admission::Rejected { retry_after } => *retry_after,
        }
    }
}

/// Fixed-window request counter keyed by client.
///
/// Every key gets its own window which opens on the first request seen after
/// the previous one closed. At most `limit` requests are admitted per window;
/// anything beyond that is rejected without being counted.
///
/// Check-and-increment runs under the map's shard lock for the key, so
/// concurrent calls for the same key never admit past `limit`.
pub struct FixedWindowLimiter {
    clients: DashMap<String, RateLimitEntry>,
    limit: u32,
    window: Duration,
}

impl FixedWindowLimiter {
    pub fn new(limit: u32, window: Duration) -> Self {
        Self {
            clients: DashMap::new(),
            limit,
            window,
        }
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn allow(&self, key: &str) -> Admission {
        let now = Instant::now();

        // fast path: key already tracked, no allocation
        if let Some(mut entry) = self.clients.get_mut(key) {
            return self.admit(&mut entry, now);
        }

        let mut entry = self
            .clients
            .entry(key.to_string())
            .or_insert(RateLimitEntry {
                count: 0,
                window_start: now,
            });
        self.admit(&mut entry, now)
    }

    fn admit(&self, entry: &mut RateLimitEntry, now: Instant) -> Admission {
        // window closed but not swept yet
        if now.duration_since(entry.window_start) >= self.window {
            entry.count = 0;
            entry.window_start = now;
        }

        if entry.count < self.limit {
            entry.count += 1;
            return Admission::Allowed;
        }

        Admission::Rejected {
            retry_after: self.window,
        }
    }

    /// Drops every key whose window has closed. Returns how many were removed.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let before = self.clients.len();
        self.clients
            .retain(|_, entry| now.duration_since(entry.window_start) < self.window);
        before.saturating_sub(self.clients.len())
    }

    pub fn tracked_keys(&self) -> usize {
        self.clients.len()
    }
}

// Resolve the client key: proxy headers first when trusted, then the peer address
fn client_key(request: &Request, trust_proxy_headers: bool) -> String {
    if let Some(ip) = trust_proxy_headers
        .then(|| proxied_ip(request.headers()))
        .flatten()
    {
        return ip;
    }

    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

fn proxied_ip(headers: &HeaderMap) -> Option<String> {
    if let Some(ip) = headers
        .get("x-real-ip")
        .and_then(|h| h.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
    {
        return Some(ip.to_string());
    }

    headers
        .get("x-forwarded-for")
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.split(',').next())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Admission middleware. Only installed when rate limiting is enabled.
pub async fn rate_limit_middleware(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    let key = client_key(&request, state.trust_proxy_headers);

    match state.rate_limiter.allow(&key) {
        Admission::Allowed => next.run(request).await,
        Admission::Rejected { retry_after } => {
            RATE_LIMITED_TOTAL.inc();
            tracing::warn!(
                key = %key,
                limit = state.rate_limiter.limit(),
                method = %request.method(),
                path = %request.uri().path(),
                retry_after_secs = retry_after.as_secs(),
                "rate limit exceeded"
            );
            ApiError::RateLimited { retry_after }.into_response()
        }
    }
}
