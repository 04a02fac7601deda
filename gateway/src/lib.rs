//! FinFlow Gateway - webhook ingestion boundary for the financial-tracking platform.
//!
//! This library provides the shared modules for the gateway binary:
//! - `web`: thin HTTP surface receiving WhatsApp Cloud API webhooks
//! - `webhook`: provider payload model and structural validation
//! - `event`: canonical event envelopes for downstream consumers
//! - `queue`: durable RabbitMQ publishing with confirms, retry and
//!   circuit breaking
//!
//! ## Architecture
//!
//! ```text
//! WhatsApp webhooks → Gateway → whatsapp.messages queue → Classifier → ...
//! ```
//!
//! The gateway verifies the webhook signature, validates the payload shape,
//! wraps each text message in an event envelope, and enqueues it. All
//! classification and persistence happens in downstream services.

pub mod config;
pub mod event;
pub mod queue;
pub mod web;
pub mod webhook;

#[cfg(test)]
pub mod test_utils;

// Re-export commonly used types
pub use config::Config;
pub use event::{EventEnvelope, InternalMessageEvent};
pub use queue::{EventPublisher, PublishError, RabbitPublisher};
pub use web::AppState;
