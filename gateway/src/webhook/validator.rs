//! Structural validation of raw webhook JSON.
//!
//! Walks the untyped JSON value and collects every field-level issue instead
//! of stopping at the first, so callers can log exactly which fields were
//! malformed. No business interpretation happens here; a structurally valid
//! payload with zero text messages is still valid.

use serde::Serialize;
use serde_json::Value;

use super::types::InboundWebhookPayload;

/// Message types the gateway accepts. Anything else fails validation.
const MESSAGE_TYPES: &[&str] = &["text", "image", "audio", "video", "document"];

/// Status values the gateway accepts.
const STATUS_VALUES: &[&str] = &["sent", "delivered", "read", "failed"];

/// A single field-level validation problem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationIssue {
    /// JSON path of the offending field, e.g. `entry[0].changes[0].field`
    pub path: String,
    pub message: String,
}

/// Result of validating a raw webhook body.
#[derive(Debug)]
pub enum ValidationOutcome {
    Valid(InboundWebhookPayload),
    Invalid(Vec<ValidationIssue>),
}

/// Validate a raw JSON value against the webhook payload shape.
///
/// Returns the typed payload when every check passes, or the full list of
/// issues otherwise. Validation is all-or-nothing for the delivery: one bad
/// entry rejects the whole batch.
pub fn validate(raw: &Value) -> ValidationOutcome {
    let mut issues = Vec::new();

    let Some(root) = as_object(raw, "$", &mut issues) else {
        return ValidationOutcome::Invalid(issues);
    };

    require_string(root, "object", "object", &mut issues);

    match root.get("entry") {
        Some(Value::Array(entries)) => {
            for (i, entry) in entries.iter().enumerate() {
                validate_entry(entry, &format!("entry[{i}]"), &mut issues);
            }
        }
        Some(_) => issues.push(issue("entry", "must be an array")),
        None => issues.push(issue("entry", "is required")),
    }

    if !issues.is_empty() {
        return ValidationOutcome::Invalid(issues);
    }

    // The checks above are a superset of what deserialization needs, so this
    // only fails if the two ever drift apart.
    match serde_json::from_value::<InboundWebhookPayload>(raw.clone()) {
        Ok(payload) => ValidationOutcome::Valid(payload),
        Err(e) => ValidationOutcome::Invalid(vec![issue("$", &format!("deserialization: {e}"))]),
    }
}

fn validate_entry(entry: &Value, path: &str, issues: &mut Vec<ValidationIssue>) {
    let Some(entry) = as_object(entry, path, issues) else {
        return;
    };

    require_string(entry, &format!("{path}.id"), "id", issues);

    match entry.get("changes") {
        Some(Value::Array(changes)) => {
            for (i, change) in changes.iter().enumerate() {
                validate_change(change, &format!("{path}.changes[{i}]"), issues);
            }
        }
        Some(_) => issues.push(issue(&format!("{path}.changes"), "must be an array")),
        None => issues.push(issue(&format!("{path}.changes"), "is required")),
    }
}

fn validate_change(change: &Value, path: &str, issues: &mut Vec<ValidationIssue>) {
    let Some(change) = as_object(change, path, issues) else {
        return;
    };

    require_string(change, &format!("{path}.field"), "field", issues);

    match change.get("value") {
        Some(value) => validate_change_value(value, &format!("{path}.value"), issues),
        None => issues.push(issue(&format!("{path}.value"), "is required")),
    }
}

fn validate_change_value(value: &Value, path: &str, issues: &mut Vec<ValidationIssue>) {
    let Some(value) = as_object(value, path, issues) else {
        return;
    };

    require_string(
        value,
        &format!("{path}.messaging_product"),
        "messaging_product",
        issues,
    );

    match value.get("metadata") {
        Some(metadata) => {
            let meta_path = format!("{path}.metadata");
            if let Some(metadata) = as_object(metadata, &meta_path, issues) {
                require_string(
                    metadata,
                    &format!("{meta_path}.display_phone_number"),
                    "display_phone_number",
                    issues,
                );
                require_string(
                    metadata,
                    &format!("{meta_path}.phone_number_id"),
                    "phone_number_id",
                    issues,
                );
            }
        }
        None => issues.push(issue(&format!("{path}.metadata"), "is required")),
    }

    validate_optional_array(value, path, "contacts", issues, validate_contact);
    validate_optional_array(value, path, "messages", issues, validate_message);
    validate_optional_array(value, path, "statuses", issues, validate_status);
}

fn validate_optional_array(
    value: &serde_json::Map<String, Value>,
    parent: &str,
    key: &str,
    issues: &mut Vec<ValidationIssue>,
    check: fn(&Value, &str, &mut Vec<ValidationIssue>),
) {
    match value.get(key) {
        None | Some(Value::Null) => {}
        Some(Value::Array(items)) => {
            for (i, item) in items.iter().enumerate() {
                check(item, &format!("{parent}.{key}[{i}]"), issues);
            }
        }
        Some(_) => issues.push(issue(&format!("{parent}.{key}"), "must be an array")),
    }
}

fn validate_contact(contact: &Value, path: &str, issues: &mut Vec<ValidationIssue>) {
    let Some(contact) = as_object(contact, path, issues) else {
        return;
    };

    require_string(contact, &format!("{path}.wa_id"), "wa_id", issues);

    match contact.get("profile") {
        Some(profile) => {
            let profile_path = format!("{path}.profile");
            if let Some(profile) = as_object(profile, &profile_path, issues) {
                require_string(profile, &format!("{profile_path}.name"), "name", issues);
            }
        }
        None => issues.push(issue(&format!("{path}.profile"), "is required")),
    }
}

fn validate_message(message: &Value, path: &str, issues: &mut Vec<ValidationIssue>) {
    let Some(message) = as_object(message, path, issues) else {
        return;
    };

    require_string(message, &format!("{path}.from"), "from", issues);
    require_string(message, &format!("{path}.id"), "id", issues);

    // The provider encodes unix seconds as a string; accept only values the
    // envelope builder can parse, rather than silently defaulting later.
    let ts_path = format!("{path}.timestamp");
    match message.get("timestamp") {
        Some(Value::String(raw)) => {
            if raw.parse::<i64>().is_err() {
                issues.push(issue(&ts_path, "must be a unix-seconds integer string"));
            }
        }
        Some(_) => issues.push(issue(&ts_path, "must be a string")),
        None => issues.push(issue(&ts_path, "is required")),
    }

    require_enum(message, &format!("{path}.type"), "type", MESSAGE_TYPES, issues);

    match message.get("text") {
        None | Some(Value::Null) => {}
        Some(text) => {
            let text_path = format!("{path}.text");
            if let Some(text) = as_object(text, &text_path, issues) {
                require_string(text, &format!("{text_path}.body"), "body", issues);
            }
        }
    }
}

fn validate_status(status: &Value, path: &str, issues: &mut Vec<ValidationIssue>) {
    let Some(status) = as_object(status, path, issues) else {
        return;
    };

    require_string(status, &format!("{path}.id"), "id", issues);
    require_string(status, &format!("{path}.timestamp"), "timestamp", issues);
    require_string(status, &format!("{path}.recipient_id"), "recipient_id", issues);
    require_enum(status, &format!("{path}.status"), "status", STATUS_VALUES, issues);
}

fn as_object<'a>(
    value: &'a Value,
    path: &str,
    issues: &mut Vec<ValidationIssue>,
) -> Option<&'a serde_json::Map<String, Value>> {
    match value.as_object() {
        Some(map) => Some(map),
        None => {
            issues.push(issue(path, "must be an object"));
            None
        }
    }
}

fn require_string(
    object: &serde_json::Map<String, Value>,
    path: &str,
    key: &str,
    issues: &mut Vec<ValidationIssue>,
) {
    match object.get(key) {
        Some(Value::String(_)) => {}
        Some(_) => issues.push(issue(path, "must be a string")),
        None => issues.push(issue(path, "is required")),
    }
}

fn require_enum(
    object: &serde_json::Map<String, Value>,
    path: &str,
    key: &str,
    allowed: &[&str],
    issues: &mut Vec<ValidationIssue>,
) {
    match object.get(key) {
        Some(Value::String(value)) => {
            if !allowed.contains(&value.as_str()) {
                issues.push(issue(
                    path,
                    &format!("must be one of: {}", allowed.join(", ")),
                ));
            }
        }
        Some(_) => issues.push(issue(path, "must be a string")),
        None => issues.push(issue(path, "is required")),
    }
}

fn issue(path: &str, message: &str) -> ValidationIssue {
    ValidationIssue {
        path: path.to_string(),
        message: message.to_string(),
    }
}
