//! Verbgate Gateway - HTTP/WebSocket front end for the demo backend
//!
//! This is the main entry point for the gateway service.
//!
//! # Environment
//!
//! - `LISTEN_ADDR`: bind address, default `0.0.0.0:8080`
//! - `FORWARD_METADATA`: copy request headers into call metadata, default `true`
//! - `STREAM_TIMEOUT_SECONDS`: lifetime of a WebSocket stream, default `3600`
//! - `RUST_LOG`: tracing filter, default `info,verbgate=debug`

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use verbgate_gateway::{create_router, demo, GatewayConfig, GatewayState};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,verbgate=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Verbgate Gateway");

    // Load configuration from environment
    let mut config = GatewayConfig::default();
    if let Ok(addr) = std::env::var("LISTEN_ADDR") {
        config.listen_addr = addr;
    }
    if let Ok(value) = std::env::var("FORWARD_METADATA") {
        config.proxy.forward_metadata = value.parse()?;
    }
    if let Ok(value) = std::env::var("STREAM_TIMEOUT_SECONDS") {
        config.stream_timeout_seconds = value.parse()?;
    }

    tracing::info!(
        listen_addr = %config.listen_addr,
        forward_metadata = config.proxy.forward_metadata,
        stream_timeout_seconds = config.stream_timeout_seconds,
        "Gateway configuration loaded"
    );

    // Validate the exposed interface against the backend
    let proxy = demo::proxy(config.proxy.clone())?;
    tracing::info!(routes = proxy.catalogue().len(), "Proxy initialized");

    let listen_addr = config.listen_addr.clone();
    let app = create_router(GatewayState::new(proxy, config));

    // Start HTTP server
    tracing::info!(listen_addr = %listen_addr, "Starting HTTP server");
    let listener = tokio::net::TcpListener::bind(&listen_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
