//! Webhook endpoint handlers.
//!
//! Per-request state machine, terminal at the first rejection:
//! signature verify → schema validate → build envelopes → publish. Publish
//! failures for one message never abort its siblings, and the response is
//! still 200 once authentication and validation passed: the provider
//! retries per webhook delivery, so a non-200 would redeliver the whole
//! batch and double-publish the messages that already went through.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::event::{build_message_event, EventEnvelope, EVENT_MESSAGE_RECEIVED, SOURCE_GATEWAY};
use crate::queue::{EventPublisher, QUEUE_WHATSAPP_MESSAGES};
use crate::web::signature::verify_webhook_signature;
use crate::webhook::types::FIELD_MESSAGES;
use crate::webhook::{validate, ValidationIssue, ValidationOutcome};

/// Header carrying the provider's HMAC digest.
const SIGNATURE_HEADER: &str = "x-hub-signature-256";

/// Optional header whose value is stamped onto published envelopes so
/// downstream consumers can trace events back to the originating delivery.
const CORRELATION_HEADER: &str = "x-correlation-id";

/// Mode value of a subscription verification request.
const SUBSCRIBE_MODE: &str = "subscribe";

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub publisher: Arc<dyn EventPublisher>,
}

impl AppState {
    pub fn new(config: Config, publisher: Arc<dyn EventPublisher>) -> Self {
        Self {
            config: Arc::new(config),
            publisher,
        }
    }
}

// =============================================================================
// Health Check
// =============================================================================

/// Health check response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

/// Health check endpoint.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

// =============================================================================
// Verification Handshake (GET)
// =============================================================================

/// Query parameters of the provider's subscription handshake.
#[derive(Debug, Deserialize)]
pub struct VerifyQuery {
    #[serde(rename = "hub.mode")]
    pub mode: Option<String>,
    #[serde(rename = "hub.verify_token")]
    pub verify_token: Option<String>,
    #[serde(rename = "hub.challenge")]
    pub challenge: Option<String>,
}

/// Subscription verification endpoint.
///
/// Echoes the challenge verbatim when the mode is "subscribe" and the token
/// matches; 403 on mismatch, 400 when the triple is incomplete.
pub async fn verify_webhook(
    State(state): State<AppState>,
    Query(query): Query<VerifyQuery>,
) -> Response {
    let (Some(mode), Some(token), Some(challenge)) =
        (query.mode, query.verify_token, query.challenge)
    else {
        warn!("webhook_verify_malformed_query");
        return StatusCode::BAD_REQUEST.into_response();
    };

    if mode == SUBSCRIBE_MODE && token == state.config.verify_token {
        info!("webhook_verified");
        (StatusCode::OK, challenge).into_response()
    } else {
        warn!(mode = %mode, "webhook_verify_token_mismatch");
        StatusCode::FORBIDDEN.into_response()
    }
}

// =============================================================================
// Event Delivery (POST)
// =============================================================================

/// Webhook acceptance response.
#[derive(Serialize)]
struct WebhookAccepted {
    status: &'static str,
}

/// Webhook rejection response.
#[derive(Serialize)]
struct WebhookRejected {
    error: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    issues: Option<Vec<ValidationIssue>>,
}

/// Webhook event delivery endpoint.
///
/// The signature runs over the raw body bytes, so the body is taken as
/// `Bytes` and only parsed as JSON after verification succeeds.
pub async fn receive_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let signature_header = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    if !verify_webhook_signature(&body, signature_header, &state.config.app_secret) {
        warn!(body_length = body.len(), "webhook_signature_rejected");
        return (
            StatusCode::UNAUTHORIZED,
            Json(WebhookRejected {
                error: "Invalid signature",
                issues: None,
            }),
        )
            .into_response();
    }

    let raw: serde_json::Value = match serde_json::from_slice(&body) {
        Ok(value) => value,
        Err(e) => {
            warn!(error = %e, "webhook_body_not_json");
            return (
                StatusCode::BAD_REQUEST,
                Json(WebhookRejected {
                    error: "Invalid webhook structure",
                    issues: Some(vec![ValidationIssue {
                        path: "$".to_string(),
                        message: format!("body is not valid JSON: {e}"),
                    }]),
                }),
            )
                .into_response();
        }
    };

    // All-or-nothing: one malformed entry rejects the whole delivery
    let payload = match validate(&raw) {
        ValidationOutcome::Valid(payload) => payload,
        ValidationOutcome::Invalid(issues) => {
            warn!(issue_count = issues.len(), "webhook_validation_failed");
            return (
                StatusCode::BAD_REQUEST,
                Json(WebhookRejected {
                    error: "Invalid webhook structure",
                    issues: Some(issues),
                }),
            )
                .into_response();
        }
    };

    let correlation_id = headers
        .get(CORRELATION_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    info!(
        object = %payload.object,
        entry_count = payload.entry.len(),
        "webhook_received"
    );

    let mut published = 0u32;
    let mut skipped = 0u32;
    let mut failed = 0u32;

    for entry in &payload.entry {
        for change in &entry.changes {
            if change.field != FIELD_MESSAGES {
                debug!(field = %change.field, "webhook_change_ignored");
                continue;
            }

            let Some(messages) = &change.value.messages else {
                continue;
            };

            // Each message is handled independently: a failure on one must
            // not block the rest of the batch.
            for message in messages {
                let event = match build_message_event(message, &change.value.metadata) {
                    Ok(Some(event)) => event,
                    Ok(None) => {
                        debug!(
                            message_id = %message.id,
                            message_type = message.kind.as_str(),
                            "webhook_message_skipped"
                        );
                        skipped += 1;
                        continue;
                    }
                    Err(e) => {
                        error!(message_id = %message.id, error = %e, "event_build_failed");
                        failed += 1;
                        continue;
                    }
                };

                let mut envelope = EventEnvelope::new(EVENT_MESSAGE_RECEIVED, event, SOURCE_GATEWAY);
                if let Some(correlation_id) = &correlation_id {
                    envelope = envelope.with_correlation_id(correlation_id.clone());
                }

                match state
                    .publisher
                    .publish(QUEUE_WHATSAPP_MESSAGES, &envelope)
                    .await
                {
                    Ok(()) => {
                        info!(
                            message_id = %message.id,
                            envelope_id = %envelope.id,
                            queue = QUEUE_WHATSAPP_MESSAGES,
                            "message_enqueued"
                        );
                        published += 1;
                    }
                    Err(e) => {
                        error!(message_id = %message.id, error = %e, "message_publish_failed");
                        failed += 1;
                    }
                }
            }
        }
    }

    info!(
        published = published,
        skipped = skipped,
        failed = failed,
        "webhook_processed"
    );

    (StatusCode::OK, Json(WebhookAccepted { status: "success" })).into_response()
}
