//! WhatsApp webhook signature verification.
//!
//! Meta signs webhook requests with HMAC-SHA256 over the raw request body
//! and sends the hex digest in the `x-hub-signature-256` header.
//! Reference: https://developers.facebook.com/docs/graph-api/webhooks/getting-started#verification-requests

use hmac::{Hmac, Mac};
use sha2::Sha256;
use tracing::warn;

type HmacSha256 = Hmac<Sha256>;

/// Required header scheme prefix.
const SIGNATURE_PREFIX: &str = "sha256=";

/// Verify a webhook signature header against the raw body bytes.
///
/// The HMAC runs over the exact bytes received on the wire. Re-serializing
/// the parsed JSON would not match the provider's digest byte for byte, so
/// callers must pass the body before any parsing.
///
/// Fails closed: a missing prefix, non-hex digest, or any other anomaly
/// returns `false`. Never panics. The digest comparison is constant-time
/// (via `Mac::verify_slice`) to prevent timing side-channels.
pub fn verify_webhook_signature(raw_body: &[u8], signature_header: &str, secret: &str) -> bool {
    let Some(hex_digest) = signature_header.strip_prefix(SIGNATURE_PREFIX) else {
        warn!(
            header_length = signature_header.len(),
            "webhook_signature_missing_prefix"
        );
        return false;
    };

    let expected = match hex::decode(hex_digest) {
        Ok(bytes) => bytes,
        Err(_) => {
            warn!("webhook_signature_not_hex");
            return false;
        }
    };

    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(m) => m,
        Err(_) => {
            warn!("webhook_signature_invalid_key");
            return false;
        }
    };

    mac.update(raw_body);

    let valid = mac.verify_slice(&expected).is_ok();

    if !valid {
        warn!(
            body_length = raw_body.len(),
            "webhook_signature_mismatch"
        );
    }

    valid
}

/// Compute the signature header value for a body, used by tests and tooling.
#[cfg(test)]
pub fn sign(raw_body: &[u8], secret: &str) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("hmac accepts any key size");
    mac.update(raw_body);
    format!("{SIGNATURE_PREFIX}{}", hex::encode(mac.finalize().into_bytes()))
}
