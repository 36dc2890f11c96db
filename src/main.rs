use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::signal;
use tracing::info;
use tracing_subscriber::EnvFilter;

use inkwell::config::{InkwellConfig, LoggingConfig};
use inkwell::http::{router, HttpServer};
use inkwell::ratelimit::{RateLimiter, RateLimiterConfig, SlidingWindowStrategy};
use inkwell::store::RedisWindowStore;

/// Blog API write path with Redis-backed rate limiting.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Path to a YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = InkwellConfig::load(args.config.as_deref()).context("failed to load configuration")?;

    init_tracing(&config.logging);

    info!("Starting Inkwell");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    info!(
        http_addr = %config.server.http_addr,
        max_requests = config.rate_limiting.max_requests,
        expiration_secs = config.rate_limiting.expiration_secs,
        headers = ?config.rate_limiting.headers,
        "Configuration loaded"
    );

    let store = RedisWindowStore::connect(&config.redis.url, config.redis.key_prefix.clone())
        .await
        .with_context(|| format!("failed to connect to Redis at {}", config.redis.url))?;
    store.ping().await.context("Redis did not answer PING")?;
    info!("Connected to Redis");

    let strategy = SlidingWindowStrategy::new(Arc::new(store)).timeout(config.redis.timeout());
    let limiter = Arc::new(RateLimiter::new(RateLimiterConfig::from_settings(
        &config.rate_limiting,
        Arc::new(strategy),
    )));
    info!("Rate limiter initialized");

    HttpServer::new(config.server.http_addr, router(limiter))
        .serve_with_shutdown(shutdown_signal())
        .await?;

    info!("Inkwell stopped");
    Ok(())
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));

    if logging.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(false)
            .with_thread_ids(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_thread_ids(true)
            .init();
    }
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
