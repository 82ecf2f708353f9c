use std::sync::Arc;

use crate::cache::UserCache;
use crate::config::Args;
use crate::rate_limit::FixedWindowLimiter;
use crate::service::Service;
use crate::store::MemoryStore;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// app's shared state
pub struct AppState {
    pub service: Service,
    pub rate_limiter: Arc<FixedWindowLimiter>,
    pub user_cache: Option<Arc<UserCache>>,
    pub rate_limit_enabled: bool,
    pub trust_proxy_headers: bool,
    pub env: String,
}

impl AppState {
    /// Wires the in-memory store, cache and limiter from the parsed flags.
    pub fn from_args(args: &Args) -> Arc<Self> {
        let store = Arc::new(MemoryStore::new());
        let user_cache = args
            .cache_enabled
            .then(|| Arc::new(UserCache::new(args.cache_ttl())));

        Arc::new(Self {
            service: Service::new(store.clone(), store, user_cache.clone())
                .with_invitation_ttl(args.invitation_ttl()),
            rate_limiter: Arc::new(FixedWindowLimiter::new(
                args.rate_limit,
                args.rate_window(),
            )),
            user_cache,
            rate_limit_enabled: args.rate_limit_enabled,
            trust_proxy_headers: args.trust_proxy_headers,
            env: args.env.clone(),
        })
    }
}
