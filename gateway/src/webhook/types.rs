//! Typed model of the WhatsApp Cloud API webhook payload.
//!
//! Field names match the provider's JSON. A value of these types is only
//! constructed through [`crate::webhook::validate`], which guarantees the
//! structural invariants (closed enums, required fields) hold.

use serde::{Deserialize, Serialize};

/// Change field carrying inbound messages.
pub const FIELD_MESSAGES: &str = "messages";

/// Top-level webhook payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundWebhookPayload {
    /// Object tag, "whatsapp_business_account" for the Cloud API
    pub object: String,
    pub entry: Vec<Entry>,
}

/// One account entry in a webhook delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entry {
    pub id: String,
    pub changes: Vec<Change>,
}

/// A single change notification within an entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Change {
    pub value: ChangeValue,
    /// What changed; only "messages" changes are forwarded
    pub field: String,
}

/// The value of a change: phone metadata plus optional message/status lists.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeValue {
    pub messaging_product: String,
    pub metadata: PhoneMetadata,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contacts: Option<Vec<Contact>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub messages: Option<Vec<Message>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub statuses: Option<Vec<Status>>,
}

/// Identifies the business phone number the webhook belongs to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhoneMetadata {
    pub display_phone_number: String,
    pub phone_number_id: String,
}

/// Sender contact card.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contact {
    pub profile: Profile,
    pub wa_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    pub name: String,
}

/// An inbound message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub from: String,
    pub id: String,
    /// Unix seconds, string-encoded by the provider
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<TextBody>,
    #[serde(rename = "type")]
    pub kind: MessageKind,
}

/// Closed set of supported message types. Unknown types fail validation
/// rather than deserializing into a catch-all variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Text,
    Image,
    Audio,
    Video,
    Document,
}

impl MessageKind {
    pub fn as_str(self) -> &'static str {
        match self {
            MessageKind::Text => "text",
            MessageKind::Image => "image",
            MessageKind::Audio => "audio",
            MessageKind::Video => "video",
            MessageKind::Document => "document",
        }
    }
}

/// Text message body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextBody {
    pub body: String,
}

/// Delivery status update for an outbound message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Status {
    pub id: String,
    pub status: StatusKind,
    pub timestamp: String,
    pub recipient_id: String,
}

/// Closed set of delivery statuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusKind {
    Sent,
    Delivered,
    Read,
    Failed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_kind_round_trip() {
        let json = serde_json::to_string(&MessageKind::Text).unwrap();
        assert_eq!(json, "\"text\"");
        let parsed: MessageKind = serde_json::from_str("\"document\"").unwrap();
        assert_eq!(parsed, MessageKind::Document);
    }

    #[test]
    fn test_unknown_message_kind_rejected() {
        let result: Result<MessageKind, _> = serde_json::from_str("\"sticker\"");
        assert!(result.is_err());
    }

    #[test]
    fn test_payload_deserialization() {
        let json = serde_json::json!({
            "object": "whatsapp_business_account",
            "entry": [{
                "id": "entry-1",
                "changes": [{
                    "field": "messages",
                    "value": {
                        "messaging_product": "whatsapp",
                        "metadata": {
                            "display_phone_number": "5511888888888",
                            "phone_number_id": "phone-1"
                        },
                        "messages": [{
                            "from": "5511999999999",
                            "id": "wamid.1",
                            "timestamp": "1700000000",
                            "type": "text",
                            "text": { "body": "Mercado 50,00" }
                        }]
                    }
                }]
            }]
        });

        let payload: InboundWebhookPayload = serde_json::from_value(json).unwrap();
        let message = &payload.entry[0].changes[0].value.messages.as_ref().unwrap()[0];
        assert_eq!(message.id, "wamid.1");
        assert_eq!(message.kind, MessageKind::Text);
        assert_eq!(message.text.as_ref().unwrap().body, "Mercado 50,00");
    }
}
