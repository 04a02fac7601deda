//! Broker topology: exchanges, queues and dead-letter routing.
//!
//! All declarations are idempotent, so `declare_topology` can run on every
//! reconnect. Undelivered messages expire after 24 hours and are routed to
//! the dead-letter queue instead of being dropped.

use lapin::types::{AMQPValue, FieldTable};
use tracing::info;

use crate::queue::error::PublishError;
use crate::queue::transport::ChannelOps;

/// Main direct-routed exchange for domain events.
pub const EXCHANGE_MAIN: &str = "financial.main";

/// Dead-letter exchange for expired or rejected messages.
pub const EXCHANGE_DEAD_LETTER: &str = "financial.dead-letter";

/// Queue of inbound WhatsApp message events.
pub const QUEUE_WHATSAPP_MESSAGES: &str = "whatsapp.messages";

/// Queue consumed by the classification engine.
pub const QUEUE_MESSAGE_CLASSIFICATION: &str = "message.classification";

/// Queue of classified purchase orders.
pub const QUEUE_PURCHASE_ORDERS: &str = "purchase.orders";

/// Dead-letter queue; also the dead-letter routing key.
pub const QUEUE_DEAD_LETTER: &str = "dead.letter";

/// Logical queues bound to the main exchange.
const MAIN_QUEUES: &[&str] = &[
    QUEUE_WHATSAPP_MESSAGES,
    QUEUE_MESSAGE_CLASSIFICATION,
    QUEUE_PURCHASE_ORDERS,
];

/// Per-message time-to-live before dead-lettering: 24 hours.
const MESSAGE_TTL_MS: i64 = 24 * 60 * 60 * 1000;

/// Declare exchanges, queues and bindings on the given channel.
pub async fn declare_topology(channel: &dyn ChannelOps) -> Result<(), PublishError> {
    channel.declare_exchange(EXCHANGE_MAIN).await?;
    channel.declare_exchange(EXCHANGE_DEAD_LETTER).await?;

    for queue in MAIN_QUEUES {
        channel.declare_queue(queue, main_queue_arguments()).await?;

        // Routing key equals the queue name
        channel.bind_queue(queue, EXCHANGE_MAIN, queue).await?;
    }

    channel
        .declare_queue(QUEUE_DEAD_LETTER, FieldTable::default())
        .await?;

    channel
        .bind_queue(QUEUE_DEAD_LETTER, EXCHANGE_DEAD_LETTER, QUEUE_DEAD_LETTER)
        .await?;

    info!(
        main_exchange = EXCHANGE_MAIN,
        dead_letter_exchange = EXCHANGE_DEAD_LETTER,
        queues = MAIN_QUEUES.len() + 1,
        "rabbitmq_topology_declared"
    );

    Ok(())
}

/// Arguments wiring a main queue to the dead-letter route with a 24h TTL.
fn main_queue_arguments() -> FieldTable {
    let mut arguments = FieldTable::default();
    arguments.insert(
        "x-dead-letter-exchange".into(),
        AMQPValue::LongString(EXCHANGE_DEAD_LETTER.into()),
    );
    arguments.insert(
        "x-dead-letter-routing-key".into(),
        AMQPValue::LongString(QUEUE_DEAD_LETTER.into()),
    );
    arguments.insert("x-message-ttl".into(), AMQPValue::LongLongInt(MESSAGE_TTL_MS));
    arguments
}

#[cfg(test)]
mod tests {
    use super::*;
    use lapin::types::ShortString;

    #[test]
    fn test_main_queue_arguments_wire_dead_letter_route() {
        let arguments = main_queue_arguments();
        let inner = arguments.inner();

        assert_eq!(
            inner.get(&ShortString::from("x-dead-letter-exchange")),
            Some(&AMQPValue::LongString(EXCHANGE_DEAD_LETTER.into()))
        );
        assert_eq!(
            inner.get(&ShortString::from("x-dead-letter-routing-key")),
            Some(&AMQPValue::LongString(QUEUE_DEAD_LETTER.into()))
        );
        assert_eq!(
            inner.get(&ShortString::from("x-message-ttl")),
            Some(&AMQPValue::LongLongInt(86_400_000))
        );
    }
}
