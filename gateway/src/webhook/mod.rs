//! WhatsApp Cloud API webhook payload model and validation.
//!
//! The provider payload is untrusted input: the typed model in `types` only
//! comes into existence after the structural validator in `validator` has
//! walked the raw JSON and collected every field-level issue. Validation is
//! all-or-nothing per webhook delivery.

pub mod types;
pub mod validator;

pub use types::{
    Change, ChangeValue, Contact, InboundWebhookPayload, Message, MessageKind, PhoneMetadata,
    Status, StatusKind, TextBody,
};
pub use validator::{validate, ValidationIssue, ValidationOutcome};
