//! Async RabbitMQ publisher with confirms and automatic reconnection.
//!
//! The publisher is the one shared mutable resource in the process: it is
//! cheap to clone and safe to use from concurrent request handlers. While
//! disconnected, publishes fail fast instead of buffering in memory; a
//! single background task reconnects with backoff, and the upstream
//! provider's own webhook retries cover the gap.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use lapin::BasicProperties;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::event::{EventEnvelope, InternalMessageEvent};
use crate::queue::circuit::CircuitBreaker;
use crate::queue::error::PublishError;
use crate::queue::retry::{with_backoff, RetryConfig};
use crate::queue::topology::{self, EXCHANGE_MAIN};
use crate::queue::transport::{BrokerTransport, ChannelOps, LapinTransport};

/// Minimal publishing capability.
///
/// The real broker client and the in-memory test recorder both implement
/// this; the composition root decides which one the ingress handlers see.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Establish the broker connection and declare topology.
    async fn connect(&self) -> Result<(), PublishError>;

    /// Durably enqueue an envelope; success means "enqueued", not
    /// "processed". Delivery is at-least-once.
    async fn publish(
        &self,
        queue: &str,
        envelope: &EventEnvelope<InternalMessageEvent>,
    ) -> Result<(), PublishError>;

    /// Close the connection gracefully.
    async fn close(&self);
}

/// Broker publisher with connection management, built on [`BrokerTransport`].
#[derive(Clone)]
pub struct RabbitPublisher {
    inner: Arc<PublisherInner>,
}

struct PublisherInner {
    publish_timeout: Duration,
    retry: RetryConfig,
    transport: Arc<dyn BrokerTransport>,
    channel: RwLock<Option<Arc<dyn ChannelOps>>>,
    breaker: Mutex<CircuitBreaker>,
    reconnecting: AtomicBool,
}

impl RabbitPublisher {
    /// Create a new publisher from configuration. No I/O happens until
    /// [`EventPublisher::connect`].
    pub fn new(config: &Config) -> Self {
        Self::with_transport(
            config,
            Arc::new(LapinTransport::new(config.rabbitmq_url.clone())),
        )
    }

    fn with_transport(config: &Config, transport: Arc<dyn BrokerTransport>) -> Self {
        Self {
            inner: Arc::new(PublisherInner {
                publish_timeout: config.publish_timeout,
                retry: config.retry.clone(),
                transport,
                channel: RwLock::new(None),
                breaker: Mutex::new(CircuitBreaker::new(config.circuit_breaker.clone())),
                reconnecting: AtomicBool::new(false),
            }),
        }
    }

    /// One connection attempt: open a channel with confirms, declare
    /// topology, and swap in the new channel.
    async fn connect_once(&self) -> Result<(), PublishError> {
        info!("rabbitmq_publisher_connecting");

        let channel = self.inner.transport.open().await?;
        topology::declare_topology(channel.as_ref()).await?;

        let mut slot = self.inner.channel.write().await;
        *slot = Some(channel);

        info!("rabbitmq_publisher_connected");
        Ok(())
    }

    /// Currently connected channel, if any. Never blocks on network I/O.
    async fn current_channel(&self) -> Option<Arc<dyn ChannelOps>> {
        let channel = self.inner.channel.read().await;
        channel.as_ref().filter(|ch| ch.is_usable()).cloned()
    }

    /// Kick off at most one background reconnect loop.
    fn spawn_reconnect(&self) {
        if self.inner.reconnecting.swap(true, Ordering::SeqCst) {
            return;
        }

        let publisher = self.clone();
        tokio::spawn(async move {
            let retry = publisher.inner.retry.clone();
            match with_backoff(&retry, || publisher.connect_once()).await {
                Ok(()) => info!("rabbitmq_publisher_reconnected"),
                Err(e) => warn!(error = %e, "rabbitmq_publisher_reconnect_failed"),
            }
            publisher.inner.reconnecting.store(false, Ordering::SeqCst);
        });
    }

    async fn note_success(&self) {
        self.inner.breaker.lock().await.record_success();
    }

    async fn note_failure(&self) {
        self.inner.breaker.lock().await.record_failure();
    }

    /// A single publish attempt with confirm, bounded by the publish
    /// timeout. The circuit breaker gates the attempt before any I/O.
    async fn publish_once(
        &self,
        queue: &str,
        body: &[u8],
        envelope: &EventEnvelope<InternalMessageEvent>,
    ) -> Result<(), PublishError> {
        if !self.inner.breaker.lock().await.allow() {
            return Err(PublishError::CircuitOpen);
        }

        let Some(channel) = self.current_channel().await else {
            self.note_failure().await;
            self.spawn_reconnect();
            return Err(PublishError::Disconnected);
        };

        let properties = BasicProperties::default()
            .with_delivery_mode(2) // Persistent
            .with_content_type("application/json".into())
            .with_message_id(envelope.id.to_string().into())
            .with_timestamp(envelope.timestamp.timestamp().max(0) as u64);

        let attempt = channel.publish(EXCHANGE_MAIN, queue, body, properties);

        match tokio::time::timeout(self.inner.publish_timeout, attempt).await {
            Err(_) => {
                self.note_failure().await;
                Err(PublishError::Timeout(self.inner.publish_timeout))
            }
            Ok(Err(e)) => {
                self.note_failure().await;
                if matches!(e, PublishError::Connection(_)) {
                    self.spawn_reconnect();
                }
                Err(e)
            }
            Ok(Ok(())) => {
                self.note_success().await;
                debug!(
                    queue = queue,
                    message_id = %envelope.id,
                    body_length = body.len(),
                    "rabbitmq_message_published"
                );
                Ok(())
            }
        }
    }
}

#[async_trait]
impl EventPublisher for RabbitPublisher {
    async fn connect(&self) -> Result<(), PublishError> {
        with_backoff(&self.inner.retry, || self.connect_once()).await
    }

    async fn publish(
        &self,
        queue: &str,
        envelope: &EventEnvelope<InternalMessageEvent>,
    ) -> Result<(), PublishError> {
        // Serialize once; retried attempts reuse the bytes, so the envelope
        // id stays stable across attempts.
        let body = serde_json::to_vec(envelope)?;

        with_backoff(&self.inner.retry, || {
            self.publish_once(queue, &body, envelope)
        })
        .await
    }

    async fn close(&self) {
        let mut channel = self.inner.channel.write().await;
        if let Some(ch) = channel.take() {
            ch.close().await;
        }
        info!("rabbitmq_publisher_closed");
    }
}
