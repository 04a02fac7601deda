//! FinFlow Gateway - webhook ingestion server.
//!
//! This binary provides a thin, fast web server that:
//! - Answers the WhatsApp subscription verification handshake
//! - Verifies webhook signatures and validates payload shape
//! - Wraps accepted text messages in event envelopes
//! - Durably enqueues them to RabbitMQ with publisher confirms
//!
//! Classification and persistence happen in downstream consumers.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::{net::TcpListener, signal};
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use finflow::queue::{EventPublisher, RabbitPublisher};
use finflow::web::{router, AppState};
use finflow::Config;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize structured JSON logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json().flatten_event(true))
        .init();

    info!("gateway_starting");

    // Load configuration
    let config = Config::from_env();
    info!(
        port = config.port,
        verify_token_configured = !config.verify_token.is_empty(),
        app_secret_configured = !config.app_secret.is_empty(),
        publish_timeout_ms = config.publish_timeout.as_millis() as u64,
        "config_loaded"
    );

    // Connect the publisher at startup; retried with backoff inside
    let publisher = RabbitPublisher::new(&config);
    publisher
        .connect()
        .await
        .context("Failed to connect to RabbitMQ")?;

    // Create application state
    let state = AppState::new(config.clone(), Arc::new(publisher.clone()));

    // Build the router
    let app = router(state);

    // Bind to address
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    info!(address = %addr, "gateway_listening");

    // Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    // Close publisher connection after in-flight requests drain
    publisher.close().await;

    info!("gateway_shutdown_complete");

    Ok(())
}

/// Create a future that completes when a shutdown signal is received.
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
        _ = ctrl_c => info!("Received SIGINT"),
        _ = terminate => info!("Received SIGTERM"),
    }

    info!("gateway_shutting_down");
}
