use std::sync::Arc;
use std::time::Duration;

use tokio::time::{MissedTickBehavior, interval};

use crate::cache::UserCache;
use crate::metrics::{CACHE_SIZE, RATE_LIMITER_KEYS};
use crate::rate_limit::FixedWindowLimiter;
use crate::state::AppState;

// Background janitor - evicts closed rate limit windows, stale cache entries
// and accounts whose invitation expired unredeemed
pub async fn janitor(state: Arc<AppState>, every: Duration) {
    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    tracing::info!(interval_secs = every.as_secs(), "janitor started");

    loop {
        ticker.tick().await;
        sweep_once(&state.rate_limiter, state.user_cache.as_deref());
        if let Err(e) = state.service.purge_unconfirmed().await {
            tracing::warn!(error = %e, "unconfirmed users clean up failed");
        }
    }
}

pub fn sweep_once(limiter: &FixedWindowLimiter, cache: Option<&UserCache>) {
    let expired_keys = limiter.sweep();
    RATE_LIMITER_KEYS.set(limiter.tracked_keys() as i64);

    let expired_users = match cache {
        Some(cache) => {
            let evicted = cache.evict_expired();
            CACHE_SIZE.set(cache.len() as f64);
            evicted
        }
        None => 0,
    };

    if expired_keys > 0 || expired_users > 0 {
        tracing::debug!(expired_keys, expired_users, "janitor sweep");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Args;
    use crate::models::RegisterUserPayload;
    use clap::Parser;

    fn state(flags: &[&str]) -> Arc<AppState> {
        let mut argv = vec!["sapphire-api", "--rate-limit", "1", "--rate-window", "5"];
        argv.extend_from_slice(flags);
        AppState::from_args(&Args::parse_from(argv))
    }

    #[tokio::test(start_paused = true)]
    async fn janitor_clears_closed_windows() {
        let state = state(&[]);
        let limiter = state.rate_limiter.clone();
        limiter.allow("198.51.100.1");
        limiter.allow("198.51.100.2");
        assert_eq!(limiter.tracked_keys(), 2);

        let task = tokio::spawn(janitor(state, Duration::from_secs(1)));
        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(limiter.tracked_keys(), 0);

        // a fresh window is opened for the swept key
        assert!(limiter.allow("198.51.100.1").is_allowed());
        task.abort();
    }

    #[tokio::test]
    async fn janitor_purges_unconfirmed_users() {
        let state = state(&["--invitation-ttl", "0"]);
        let registration = state
            .service
            .register_user(RegisterUserPayload {
                username: "wanderer".to_string(),
                first_name: "Scara".to_string(),
                last_name: String::new(),
            })
            .await
            .unwrap();

        // invitation expiry is wall-clock, so let it lapse for real
        tokio::time::sleep(Duration::from_millis(5)).await;
        let task = tokio::spawn(janitor(state.clone(), Duration::from_millis(10)));
        tokio::time::sleep(Duration::from_millis(100)).await;
        task.abort();

        assert!(state.service.user(registration.user.id).await.is_err());
    }
}
