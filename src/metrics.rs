use std::time::Instant;

use axum::{extract::Request, middleware::Next, response::Response};
use lazy_static::lazy_static;
use prometheus::{
    Counter, Gauge, Histogram, IntGauge, register_counter, register_gauge, register_histogram,
    register_int_gauge,
};

lazy_static! {
    pub static ref REQUEST_TOTAL: Counter =
        register_counter!("sapphire_requests_total", "Total number of requests").unwrap();
    pub static ref RATE_LIMITED_TOTAL: Counter = register_counter!(
        "sapphire_rate_limited_total",
        "Requests rejected by the rate limiter"
    )
    .unwrap();
    pub static ref RATE_LIMITER_KEYS: IntGauge = register_int_gauge!(
        "sapphire_rate_limiter_keys",
        "Client keys currently tracked by the rate limiter"
    )
    .unwrap();
    pub static ref CACHE_HITS: Counter =
        register_counter!("sapphire_user_cache_hits_total", "Total user cache hits").unwrap();
    pub static ref CACHE_MISSES: Counter =
        register_counter!("sapphire_user_cache_misses_total", "Total user cache misses").unwrap();
    pub static ref CACHE_SIZE: Gauge =
        register_gauge!("sapphire_user_cache_size", "Current number of users in cache").unwrap();
    pub static ref REQUEST_LATENCY: Histogram = register_histogram!(
        "sapphire_request_latency_seconds",
        "Request latency in seconds"
    )
    .unwrap();
}

// Counts every request and records how long the stack below took
pub async fn track_requests(request: Request, next: Next) -> Response {
    REQUEST_TOTAL.inc();
    let start = Instant::now();
    let response = next.run(request).await;
    REQUEST_LATENCY.observe(start.elapsed().as_secs_f64());
    response
}
