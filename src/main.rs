use anyhow::{Context, Result};
use axum::http::Request;
use std::sync::Arc;
use tokio::signal;
use tower_http::trace::TraceLayer;
use tracing::{info, Level};

use homiehouse::api::{self, ApiState, Services};
use homiehouse::config::Config;
use homiehouse::logging;

fn main() -> Result<()> {
    // Build custom runtime with explicit thread configuration
    let worker_threads = std::env::var("TOKIO_WORKER_THREADS")
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .unwrap_or_else(num_cpus::get);

    println!("Starting with {} Tokio worker threads", worker_threads);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(worker_threads)
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?;

    runtime.block_on(async {
        // Load environment variables from .env file if present
        dotenv::dotenv().ok();

        logging::setup_logging();

        info!("Starting HomieHouse server");

        let config = Config::from_env()?;
        info!(environment = ?config.environment, "configuration loaded");

        let services = Services::connect(&config).await?;
        let api_state = Arc::new(ApiState::new(&config, services));

        // Paths only; query strings can carry signer UUIDs
        let api_router = api::create_api_router(api_state).layer(
            TraceLayer::new_for_http().make_span_with(|request: &Request<_>| {
                tracing::span!(
                    Level::INFO,
                    "http_request",
                    method = %request.method(),
                    path = %request.uri().path(),
                )
            }),
        );

        let listener = tokio::net::TcpListener::bind(&config.bind_address)
            .await
            .with_context(|| format!("failed to bind {}", config.bind_address))?;
        info!("Starting API server on {}", config.bind_address);

        axum::serve(listener, api_router)
            .with_graceful_shutdown(async {
                let _ = signal::ctrl_c().await;
                info!("Received shutdown signal, shutting down gracefully");
            })
            .await?;

        info!("Shutdown complete");
        Ok(())
    })
}
