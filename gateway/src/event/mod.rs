//! Canonical internal events published to the broker.

pub mod envelope;

pub use envelope::{
    build_message_event, EventEnvelope, EventError, InternalMessageEvent,
    EVENT_MESSAGE_RECEIVED, SCHEMA_VERSION, SOURCE_GATEWAY,
};
