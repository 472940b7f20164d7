// Stripe webhook signature verification and event parsing.
// State changes happen in the reconciler; nothing here touches the store.

use crate::stripe::errors::WebhookError;
use crate::stripe::types::StripeEvent;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::debug;

/// Verify the signature over the raw payload, then parse the event envelope.
pub fn verify_and_parse(
    payload: &[u8],
    headers: &http::HeaderMap,
    webhook_secret: &str,
    tolerance_seconds: i64,
) -> Result<StripeEvent, WebhookError> {
    verify_signature(payload, headers, webhook_secret, tolerance_seconds)?;

    serde_json::from_slice(payload)
        .map_err(|e| WebhookError::MalformedPayload(format!("JSON parse error: {e}")))
}

/// Verify Stripe webhook signature using HMAC SHA-256
pub fn verify_signature(
    payload: &[u8],
    headers: &http::HeaderMap,
    webhook_secret: &str,
    tolerance_seconds: i64,
) -> Result<(), WebhookError> {
    if webhook_secret.is_empty() {
        return Err(WebhookError::MissingSecret);
    }

    // Extract Stripe-Signature header
    let signature_header = headers
        .get("stripe-signature")
        .or_else(|| headers.get("Stripe-Signature"))
        .ok_or(WebhookError::MissingSignature)?
        .to_str()
        .map_err(|e| WebhookError::InvalidSignature(format!("Invalid header encoding: {e}")))?;

    // Parse signature header: t=timestamp,v1=signature[,v1=signature2,...]
    let mut timestamp: Option<i64> = None;
    let mut signatures: Vec<&str> = Vec::new();

    for part in signature_header.split(',') {
        let kv: Vec<&str> = part.splitn(2, '=').collect();
        if kv.len() != 2 {
            continue;
        }
        match kv[0] {
            "t" => {
                timestamp = kv[1].parse().ok();
            }
            "v1" => {
                signatures.push(kv[1]);
            }
            _ => {} // Ignore unknown fields
        }
    }

    let timestamp = timestamp.ok_or_else(|| {
        WebhookError::InvalidSignature("Missing timestamp in signature header".to_string())
    })?;

    if signatures.is_empty() {
        return Err(WebhookError::InvalidSignature(
            "No v1 signature found".to_string(),
        ));
    }

    // Check timestamp tolerance
    let current_time = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| WebhookError::InvalidSignature(format!("System time error: {e}")))?
        .as_secs() as i64;

    let time_diff = (current_time - timestamp).abs();
    if time_diff > tolerance_seconds {
        return Err(WebhookError::TimestampTolerance(format!(
            "Timestamp {} differs from current time {} by {} seconds (tolerance: {})",
            timestamp, current_time, time_diff, tolerance_seconds
        )));
    }

    // Construct signed payload: timestamp.payload
    let signed_payload = format!("{}.{}", timestamp, String::from_utf8_lossy(payload));

    // Compute expected signature using HMAC-SHA256
    use hmac::{Hmac, Mac};
    use sha2::Sha256;

    type HmacSha256 = Hmac<Sha256>;

    let mut mac = HmacSha256::new_from_slice(webhook_secret.as_bytes())
        .map_err(|e| WebhookError::InvalidSignature(format!("HMAC init error: {e}")))?;
    mac.update(signed_payload.as_bytes());
    let expected_signature = hex::encode(mac.finalize().into_bytes());

    // Compare with provided signatures (constant-time comparison)
    let signature_valid = signatures.iter().any(|sig| {
        expected_signature.as_bytes().len() == sig.as_bytes().len()
            && expected_signature
                .as_bytes()
                .iter()
                .zip(sig.as_bytes())
                .fold(0u8, |acc, (a, b)| acc | (a ^ b))
                == 0
    });

    if !signature_valid {
        return Err(WebhookError::InvalidSignature(
            "Signature mismatch".to_string(),
        ));
    }

    debug!(
        timestamp = timestamp,
        time_diff = time_diff,
        "Webhook signature verified successfully"
    );

    Ok(())
}
