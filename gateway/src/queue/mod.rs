//! Queue module for RabbitMQ operations.
//!
//! This module provides:
//! - Topology constants and idempotent declaration (`topology`)
//! - The durable publisher with confirms and reconnection (`publisher`)
//! - The transport seam between publisher and broker (`transport`)
//! - Backoff policy (`retry`) and circuit breaker (`circuit`)
//! - The typed publish error taxonomy (`error`)
//!
//! ## Architecture
//!
//! ```text
//! Gateway → financial.main exchange → whatsapp.messages queue → Classifier
//!                      └─ expired/rejected → financial.dead-letter → dead.letter
//! ```

pub mod circuit;
pub mod error;
pub mod publisher;
pub mod retry;
pub mod topology;
pub mod transport;

pub use circuit::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use error::PublishError;
pub use publisher::{EventPublisher, RabbitPublisher};
pub use retry::{delay_for_attempt, with_backoff, RetryConfig, Retryable};
pub use topology::{
    EXCHANGE_DEAD_LETTER, EXCHANGE_MAIN, QUEUE_DEAD_LETTER, QUEUE_MESSAGE_CLASSIFICATION,
    QUEUE_PURCHASE_ORDERS, QUEUE_WHATSAPP_MESSAGES,
};
pub use transport::{BrokerTransport, ChannelOps, LapinTransport};
