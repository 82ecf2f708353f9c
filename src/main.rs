use clap::Parser;
use std::net::SocketAddr;
use tokio::signal;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use sapphire_api::{config::Args, router, state::AppState, worker::janitor};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // parse cli arguments
    let args = Args::parse();
    let state = AppState::from_args(&args);

    // spawn the background janitor
    tokio::spawn(janitor(state.clone(), args.sweep_interval()));

    let app = router(state);

    let addr = format!("0.0.0.0:{}", args.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!(addr = %addr, env = %args.env, "server has started");
    tracing::info!(
        enabled = args.rate_limit_enabled,
        requests = args.rate_limit,
        window_secs = args.rate_window,
        trust_proxy_headers = args.trust_proxy_headers,
        "rate limiter configured"
    );
    tracing::info!(
        enabled = args.cache_enabled,
        ttl_secs = args.cache_ttl,
        "user cache configured"
    );

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!(addr = %addr, "server has stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!(signal = "SIGINT", "signal caught"),
        _ = terminate => tracing::info!(signal = "SIGTERM", "signal caught"),
    }
}
