//! Typed failures for the publish path.
//!
//! The retry policy needs to distinguish transient broker trouble from
//! permanent rejection, so publish failures are an enum rather than an
//! opaque error chain.

use std::time::Duration;

use thiserror::Error;

/// Failures surfaced by [`crate::queue::RabbitPublisher`].
#[derive(Debug, Error)]
pub enum PublishError {
    /// Circuit breaker is open; no broker I/O was attempted.
    #[error("circuit breaker open, publish rejected without broker contact")]
    CircuitOpen,

    /// No live channel; the publisher fails fast instead of buffering.
    #[error("not connected to broker")]
    Disconnected,

    /// Transport-level failure (connection refused, socket error, channel
    /// torn down mid-publish).
    #[error("broker connection error: {0}")]
    Connection(lapin::Error),

    /// AMQP protocol error, e.g. a topology precondition failure. Retrying
    /// cannot fix these.
    #[error("broker protocol error: {0}")]
    Protocol(lapin::Error),

    /// The broker confirm negatively acknowledged or returned the message.
    #[error("broker rejected message for queue {queue}")]
    Rejected { queue: String },

    /// The publish round-trip exceeded its bound.
    #[error("publish timed out after {0:?}")]
    Timeout(Duration),

    /// The envelope could not be serialized. Not retryable.
    #[error("failed to serialize envelope: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl PublishError {
    /// Classify a lapin error as transient or permanent.
    pub fn from_lapin(err: lapin::Error) -> Self {
        match err {
            lapin::Error::ProtocolError(_) => PublishError::Protocol(err),
            _ => PublishError::Connection(err),
        }
    }

    /// Whether the retry policy should attempt this operation again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PublishError::Disconnected | PublishError::Connection(_) | PublishError::Timeout(_)
        )
    }
}

impl crate::queue::retry::Retryable for PublishError {
    fn is_retryable(&self) -> bool {
        PublishError::is_retryable(self)
    }
}
