//! Web server module for handling inbound webhooks.
//!
//! The HTTP surface is deliberately thin: handlers verify authenticity,
//! validate payload shape, wrap accepted messages in envelopes, and enqueue
//! them. Everything else (classification, persistence) happens downstream.

pub mod handlers;
pub mod signature;

use axum::routing::get;
use axum::Router;
use tower_http::trace::TraceLayer;

pub use handlers::{health, receive_webhook, verify_webhook, AppState, HealthResponse};
pub use signature::verify_webhook_signature;

/// Build the gateway router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/webhook", get(verify_webhook).post(receive_webhook))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
