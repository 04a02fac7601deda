//! Transport seam between the publisher and the broker.
//!
//! The publisher drives the narrow [`ChannelOps`] trait instead of a lapin
//! channel directly, so connection handling, topology declaration and the
//! circuit breaker can be tested without a running broker.
//! [`LapinTransport`] is the production implementation.

use std::sync::Arc;

use async_trait::async_trait;
use lapin::options::{
    BasicPublishOptions, ConfirmSelectOptions, ExchangeDeclareOptions, QueueBindOptions,
    QueueDeclareOptions,
};
use lapin::publisher_confirm::Confirmation;
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties, ExchangeKind};
use tracing::warn;

use crate::queue::error::PublishError;

/// Operations the publisher needs from an open broker channel.
#[async_trait]
pub trait ChannelOps: Send + Sync {
    /// Whether the underlying channel is still usable.
    fn is_usable(&self) -> bool;

    /// Declare a durable direct exchange.
    async fn declare_exchange(&self, name: &str) -> Result<(), PublishError>;

    /// Declare a durable queue with the given arguments.
    async fn declare_queue(&self, name: &str, arguments: FieldTable) -> Result<(), PublishError>;

    /// Bind a queue to an exchange under a routing key.
    async fn bind_queue(
        &self,
        queue: &str,
        exchange: &str,
        routing_key: &str,
    ) -> Result<(), PublishError>;

    /// Publish one message and wait for the broker confirm.
    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        body: &[u8],
        properties: BasicProperties,
    ) -> Result<(), PublishError>;

    /// Close the channel and its connection gracefully.
    async fn close(&self);
}

/// Opens broker channels for the publisher.
#[async_trait]
pub trait BrokerTransport: Send + Sync {
    async fn open(&self) -> Result<Arc<dyn ChannelOps>, PublishError>;
}

/// Production transport backed by lapin.
pub struct LapinTransport {
    url: String,
}

impl LapinTransport {
    pub fn new(url: String) -> Self {
        Self { url }
    }
}

#[async_trait]
impl BrokerTransport for LapinTransport {
    async fn open(&self) -> Result<Arc<dyn ChannelOps>, PublishError> {
        let connection = Connection::connect(&self.url, ConnectionProperties::default())
            .await
            .map_err(PublishError::from_lapin)?;

        let channel = connection
            .create_channel()
            .await
            .map_err(PublishError::from_lapin)?;

        channel
            .confirm_select(ConfirmSelectOptions::default())
            .await
            .map_err(PublishError::from_lapin)?;

        Ok(Arc::new(LapinChannel {
            connection,
            channel,
        }))
    }
}

/// A lapin channel with confirms enabled, plus the connection that owns it.
struct LapinChannel {
    connection: Connection,
    channel: Channel,
}

#[async_trait]
impl ChannelOps for LapinChannel {
    fn is_usable(&self) -> bool {
        self.channel.status().connected()
    }

    async fn declare_exchange(&self, name: &str) -> Result<(), PublishError> {
        self.channel
            .exchange_declare(
                name,
                ExchangeKind::Direct,
                ExchangeDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(PublishError::from_lapin)
    }

    async fn declare_queue(&self, name: &str, arguments: FieldTable) -> Result<(), PublishError> {
        self.channel
            .queue_declare(
                name,
                QueueDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                arguments,
            )
            .await
            .map(|_| ())
            .map_err(PublishError::from_lapin)
    }

    async fn bind_queue(
        &self,
        queue: &str,
        exchange: &str,
        routing_key: &str,
    ) -> Result<(), PublishError> {
        self.channel
            .queue_bind(
                queue,
                exchange,
                routing_key,
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(PublishError::from_lapin)
    }

    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        body: &[u8],
        properties: BasicProperties,
    ) -> Result<(), PublishError> {
        let confirmation = self
            .channel
            .basic_publish(
                exchange,
                routing_key,
                BasicPublishOptions {
                    mandatory: true,
                    ..Default::default()
                },
                body,
                properties,
            )
            .await
            .map_err(PublishError::from_lapin)?
            .await
            .map_err(PublishError::from_lapin)?;

        match confirmation {
            // An ack carrying a returned message means the broker could not
            // route it; that is a failure, not fire-and-forget.
            Confirmation::Nack(_) | Confirmation::Ack(Some(_)) => Err(PublishError::Rejected {
                queue: routing_key.to_string(),
            }),
            Confirmation::Ack(None) | Confirmation::NotRequested => Ok(()),
        }
    }

    async fn close(&self) {
        if let Err(e) = self.channel.close(200, "Normal shutdown").await {
            warn!(error = %e, "rabbitmq_channel_close_error");
        }
        if let Err(e) = self.connection.close(200, "Normal shutdown").await {
            warn!(error = %e, "rabbitmq_connection_close_error");
        }
    }
}
