//! Event envelope construction.
//!
//! Every message crossing the broker is wrapped in an [`EventEnvelope`]
//! carrying identity and routing metadata. Envelope ids are random UUIDs:
//! several messages in one webhook delivery can share a wall-clock
//! millisecond, so ids must not be derived from time. The downstream
//! deduplication key is the provider's message id, not the envelope id.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::webhook::types::{Message, MessageKind, PhoneMetadata};

/// Envelope schema version.
pub const SCHEMA_VERSION: &str = "1.0.0";

/// Event type for inbound WhatsApp text messages.
pub const EVENT_MESSAGE_RECEIVED: &str = "whatsapp.message.received";

/// Source component name stamped on envelopes built by this gateway.
pub const SOURCE_GATEWAY: &str = "gateway-api";

/// Canonical wrapper for messages published to the broker.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventEnvelope<T> {
    /// Unique per envelope instance; retried publishes reuse the same id
    pub id: Uuid,
    #[serde(rename = "type")]
    pub event_type: String,
    pub timestamp: DateTime<Utc>,
    pub version: String,
    pub source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,
    pub data: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<HashMap<String, String>>,
}

impl<T> EventEnvelope<T> {
    /// Wrap event data in a new envelope with a fresh id and timestamp.
    pub fn new(event_type: &str, data: T, source: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            event_type: event_type.to_string(),
            timestamp: Utc::now(),
            version: SCHEMA_VERSION.to_string(),
            source: source.to_string(),
            correlation_id: None,
            reply_to: None,
            data,
            metadata: None,
        }
    }

    pub fn with_correlation_id(mut self, correlation_id: String) -> Self {
        self.correlation_id = Some(correlation_id);
        self
    }
}

/// Internal representation of an accepted inbound text message.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InternalMessageEvent {
    pub id: Uuid,
    /// Provider message id; downstream consumers dedup on this
    pub message_id: String,
    pub from: String,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    /// Originating channel, always "whatsapp" for this gateway
    pub source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<HashMap<String, String>>,
}

/// Failures while converting a provider message into an internal event.
#[derive(Debug, Error)]
pub enum EventError {
    #[error("message timestamp {0:?} is outside the representable range")]
    TimestampOutOfRange(String),

    #[error("message timestamp {0:?} is not a unix-seconds integer")]
    TimestampNotNumeric(String),
}

/// Convert a validated provider message into an internal event.
///
/// Returns `Ok(None)` for messages that are not forwardable (non-text types,
/// or a text type with no body): skipping them is expected behavior for
/// multi-message webhooks, not a fault. Timestamp problems are an error so
/// a bad instant is never silently defaulted.
pub fn build_message_event(
    message: &Message,
    metadata: &PhoneMetadata,
) -> Result<Option<InternalMessageEvent>, EventError> {
    if message.kind != MessageKind::Text {
        return Ok(None);
    }
    let Some(text) = &message.text else {
        return Ok(None);
    };

    let seconds: i64 = message
        .timestamp
        .parse()
        .map_err(|_| EventError::TimestampNotNumeric(message.timestamp.clone()))?;
    let timestamp = DateTime::from_timestamp(seconds, 0)
        .ok_or_else(|| EventError::TimestampOutOfRange(message.timestamp.clone()))?;

    let mut event_metadata = HashMap::new();
    event_metadata.insert(
        "phone_number_id".to_string(),
        metadata.phone_number_id.clone(),
    );
    event_metadata.insert(
        "display_phone_number".to_string(),
        metadata.display_phone_number.clone(),
    );

    Ok(Some(InternalMessageEvent {
        id: Uuid::new_v4(),
        message_id: message.id.clone(),
        from: message.from.clone(),
        text: text.body.clone(),
        timestamp,
        source: "whatsapp".to_string(),
        metadata: Some(event_metadata),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::webhook::types::TextBody;

    fn metadata() -> PhoneMetadata {
        PhoneMetadata {
            display_phone_number: "5511888888888".to_string(),
            phone_number_id: "phone-1".to_string(),
        }
    }

    fn text_message() -> Message {
        Message {
            from: "5511999999999".to_string(),
            id: "wamid.1".to_string(),
            timestamp: "1700000000".to_string(),
            text: Some(TextBody {
                body: "Mercado 50,00".to_string(),
            }),
            kind: MessageKind::Text,
        }
    }

    #[test]
    fn test_text_message_builds_event() {
        let event = build_message_event(&text_message(), &metadata())
            .unwrap()
            .expect("text message must produce an event");

        assert_eq!(event.message_id, "wamid.1");
        assert_eq!(event.from, "5511999999999");
        assert_eq!(event.text, "Mercado 50,00");
        assert_eq!(event.source, "whatsapp");
        assert_eq!(event.timestamp.timestamp(), 1_700_000_000);
        let meta = event.metadata.unwrap();
        assert_eq!(meta.get("phone_number_id").unwrap(), "phone-1");
    }

    #[test]
    fn test_non_text_message_skipped() {
        let mut message = text_message();
        message.kind = MessageKind::Image;
        message.text = None;

        assert!(build_message_event(&message, &metadata())
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_text_without_body_skipped() {
        let mut message = text_message();
        message.text = None;

        assert!(build_message_event(&message, &metadata())
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_non_numeric_timestamp_is_error() {
        let mut message = text_message();
        message.timestamp = "yesterday".to_string();

        assert!(matches!(
            build_message_event(&message, &metadata()),
            Err(EventError::TimestampNotNumeric(_))
        ));
    }

    #[test]
    fn test_out_of_range_timestamp_is_error() {
        let mut message = text_message();
        message.timestamp = i64::MAX.to_string();

        assert!(matches!(
            build_message_event(&message, &metadata()),
            Err(EventError::TimestampOutOfRange(_))
        ));
    }

    #[test]
    fn test_envelope_ids_are_unique() {
        let a = EventEnvelope::new(EVENT_MESSAGE_RECEIVED, 1u32, SOURCE_GATEWAY);
        let b = EventEnvelope::new(EVENT_MESSAGE_RECEIVED, 1u32, SOURCE_GATEWAY);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_envelope_serialization_shape() {
        let event = build_message_event(&text_message(), &metadata())
            .unwrap()
            .unwrap();
        let envelope = EventEnvelope::new(EVENT_MESSAGE_RECEIVED, event, SOURCE_GATEWAY);

        let json = serde_json::to_value(&envelope).unwrap();
        assert_eq!(json["type"], EVENT_MESSAGE_RECEIVED);
        assert_eq!(json["version"], SCHEMA_VERSION);
        assert_eq!(json["source"], SOURCE_GATEWAY);
        assert_eq!(json["data"]["messageId"], "wamid.1");
        assert!(json.get("correlationId").is_none());
    }

    #[test]
    fn test_correlation_id_serialized_when_present() {
        let envelope = EventEnvelope::new(EVENT_MESSAGE_RECEIVED, 1u32, SOURCE_GATEWAY)
            .with_correlation_id("corr-1".to_string());

        let json = serde_json::to_value(&envelope).unwrap();
        assert_eq!(json["correlationId"], "corr-1");
    }
}
