//! Claude Compat Gateway - main entry point.
//!
//! Builds the HTTP server with the configured routes and middleware.
//! Configuration comes from a YAML file (CONFIG_PATH, default config.yaml).

use anyhow::Result;
use axum::{
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use claude_compat_gateway::{
    api::{messages::create_message, upstream::UpstreamClient, AppState},
    core::AppConfig,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env before reading any environment variables
    dotenvy::dotenv().ok();

    // Default filter: info everywhere, debug for this crate. Noisy HTTP
    // library targets are suppressed even when RUST_LOG overrides the rest,
    // otherwise a plain RUST_LOG=debug drowns the logs in hyper chatter.
    let base_filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "info,claude_compat_gateway=debug".to_string());
    let filter_str = format!("{},hyper=warn,h2=warn,reqwest=warn", base_filter);
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(filter_str))
        .init();

    let config_path =
        std::env::var("CONFIG_PATH").unwrap_or_else(|_| "config.yaml".to_string());
    let config = AppConfig::load(&config_path)?;

    tracing::info!(
        accounts = config.accounts.len(),
        "configuration loaded from {}",
        config_path
    );
    for account in &config.accounts {
        tracing::info!(
            account = %account.name,
            base_url = %account.base_url,
            concurrency = account.concurrency,
            mappings = account.model_mapping.len(),
            "registered upstream account"
        );
    }

    let upstream = UpstreamClient::new(config.verify_ssl, config.request_timeout_secs)
        .map_err(|e| anyhow::anyhow!("failed to build upstream client: {}", e))?;

    let host = config.server.host.clone();
    let port = config.server.port;
    let state = Arc::new(AppState::new(config, upstream));

    let app = Router::new()
        .route("/v1/messages", post(create_message))
        .route("/health", get(health_handler))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", host, port)
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid listen address: {}", e))?;
    tracing::info!("starting Claude Compat Gateway on {}", addr);
    tracing::info!("Claude API: /v1/messages");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Health check endpoint
async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok"
    }))
}
