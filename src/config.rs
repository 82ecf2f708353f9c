use clap::Parser;
use std::time::Duration;

// CLI argument structure, every flag can also come from the environment
#[derive(Parser, Debug, Clone)]
#[command(name = "sapphire-api")]
#[command(about = "Sapphire social network API")]
pub struct Args {
    // Port to run the server on
    #[arg(short, long, env = "PORT", default_value_t = 7777)]
    pub port: u16,

    // Deployment environment, reported by /v1/health
    #[arg(long, env = "ENV", default_value = "dev")]
    pub env: String,

    // Rate limit max requests per window
    #[arg(
        long,
        env = "RATE_LIMITER_REQUESTS_COUNT",
        default_value_t = 20,
        value_parser = clap::value_parser!(u32).range(1..)
    )]
    pub rate_limit: u32,

    // Rate limit window in seconds
    #[arg(
        long,
        env = "RATE_LIMITER_WINDOW_SECS",
        default_value_t = 5,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub rate_window: u64,

    // Turn request admission control on or off
    #[arg(
        long,
        env = "RATE_LIMITER_ENABLED",
        default_value_t = true,
        action = clap::ArgAction::Set
    )]
    pub rate_limit_enabled: bool,

    // Key clients on X-Real-IP / X-Forwarded-For. Only safe behind a proxy
    // that overwrites those headers.
    #[arg(
        long,
        env = "TRUST_PROXY_HEADERS",
        default_value_t = false,
        action = clap::ArgAction::Set
    )]
    pub trust_proxy_headers: bool,

    // User cache TTL in seconds
    #[arg(short, long, env = "CACHE_TTL_SECS", default_value_t = 60)]
    pub cache_ttl: u64,

    #[arg(
        long,
        env = "CACHER_IS_ENABLE",
        default_value_t = true,
        action = clap::ArgAction::Set
    )]
    pub cache_enabled: bool,

    // How long an invitation token stays redeemable, in seconds
    #[arg(long, env = "INVITATION_TTL_SECS", default_value_t = 7 * 24 * 60 * 60)]
    pub invitation_ttl: u64,

    // How often expired limiter keys and cache entries are swept, in seconds
    #[arg(long, env = "SWEEP_INTERVAL_SECS", default_value_t = 30)]
    pub sweep_interval: u64,
}

impl Args {
    pub fn rate_window(&self) -> Duration {
        Duration::from_secs(self.rate_window)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl)
    }

    pub fn invitation_ttl(&self) -> Duration {
        Duration::from_secs(self.invitation_ttl)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval.max(1))
    }
}
