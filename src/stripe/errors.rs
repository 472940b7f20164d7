// Stripe-specific error types and mappings.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StripeErrorType {
    ApiConnectionError,
    ApiError,
    AuthenticationError,
    CardError,
    IdempotencyError,
    InvalidRequestError,
    RateLimitError,
    ValidationError,
    Unknown,
}

impl From<&str> for StripeErrorType {
    fn from(s: &str) -> Self {
        match s {
            "api_connection_error" => StripeErrorType::ApiConnectionError,
            "api_error" => StripeErrorType::ApiError,
            "authentication_error" => StripeErrorType::AuthenticationError,
            "card_error" => StripeErrorType::CardError,
            "idempotency_error" => StripeErrorType::IdempotencyError,
            "invalid_request_error" => StripeErrorType::InvalidRequestError,
            "rate_limit_error" => StripeErrorType::RateLimitError,
            "validation_error" => StripeErrorType::ValidationError,
            _ => StripeErrorType::Unknown,
        }
    }
}

// Stripe REST error envelope: { error: { type, code, decline_code, message, param } }
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StripeErrorEnvelope {
    pub error: StripeErrorDetails,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StripeErrorDetails {
    #[serde(rename = "type")]
    pub type_: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decline_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub param: Option<String>,
}

impl StripeErrorEnvelope {
    pub fn to_api_error_with_status(self, status: Option<u16>) -> StripeApiError {
        StripeApiError::Stripe {
            type_: StripeErrorType::from(self.error.type_.as_str()),
            message: self.error.message,
            code: self.error.code,
            decline_code: self.error.decline_code,
            param: self.error.param,
            status,
        }
    }
}

#[derive(Debug, Error)]
pub enum StripeApiError {
    #[error("http error: {0}")]
    Http(String),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("stripe error: {type_:?} message={message:?} code={code:?} decline_code={decline_code:?}")]
    Stripe {
        type_: StripeErrorType,
        message: Option<String>,
        code: Option<String>,
        decline_code: Option<String>,
        param: Option<String>,
        status: Option<u16>,
    },
    #[error("precondition failed: {0}")]
    Precondition(&'static str),
    #[error("transient error: {0}")]
    Transient(String),
    // 3DS challenges are rejected back to the client, never driven here
    #[error("authorization {intent_id} requires an interactive challenge")]
    InteractiveRequired { intent_id: String },
    #[error("authorization {intent_id} in unexpected state {state}")]
    UnexpectedState { intent_id: String, state: String },
}

impl StripeApiError {
    /// Card-level decline, as opposed to our fault or Stripe's downtime.
    pub fn is_decline(&self) -> bool {
        matches!(
            self,
            StripeApiError::Stripe { type_: StripeErrorType::CardError, .. }
        )
    }

    /// Human-readable reason suitable for `failure_message` columns.
    pub fn failure_message(&self) -> String {
        match self {
            StripeApiError::Stripe { message: Some(m), .. } => m.clone(),
            other => other.to_string(),
        }
    }

    /// Provider failure code suitable for `failure_code` columns.
    pub fn failure_code(&self) -> Option<String> {
        match self {
            StripeApiError::Stripe { decline_code: Some(c), .. } => Some(c.clone()),
            StripeApiError::Stripe { code: Some(c), .. } => Some(c.clone()),
            _ => None,
        }
    }

    /// Cancel against an intent already in a final state. Stripe reports this
    /// as an invalid_request_error with code payment_intent_unexpected_state;
    /// callers treat it as success to keep cancellation idempotent.
    pub fn is_already_final(&self) -> bool {
        match self {
            StripeApiError::Stripe {
                type_: StripeErrorType::InvalidRequestError,
                code,
                message,
                ..
            } => {
                code.as_deref() == Some("payment_intent_unexpected_state")
                    || message
                        .as_deref()
                        .map(|m| m.contains("because it has a status of"))
                        .unwrap_or(false)
            }
            _ => false,
        }
    }
}

// Helper indicating whether an error is likely transient (api_error or 5xx)
pub fn is_transient(http_status: Option<u16>, type_: Option<&StripeErrorType>) -> bool {
    if let Some(s) = http_status {
        if (500..600).contains(&s) {
            return true;
        }
    }
    if let Some(t) = type_ {
        matches!(
            t,
            StripeErrorType::ApiConnectionError
                | StripeErrorType::ApiError
                | StripeErrorType::RateLimitError
        )
    } else {
        false
    }
}

// Webhook-specific errors
#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("invalid signature: {0}")]
    InvalidSignature(String),
    #[error("timestamp tolerance exceeded: {0}")]
    TimestampTolerance(String),
    #[error("malformed payload: {0}")]
    MalformedPayload(String),
    #[error("missing webhook secret")]
    MissingSecret,
    #[error("missing signature header")]
    MissingSignature,
    #[error("event processing failed: {0}")]
    ProcessingFailed(String),
}

impl WebhookError {
    /// Map webhook error to HTTP status code
    pub fn status_code(&self) -> u16 {
        match self {
            WebhookError::InvalidSignature(_) => 401,
            WebhookError::TimestampTolerance(_) => 400,
            WebhookError::MalformedPayload(_) => 400,
            WebhookError::MissingSecret => 500,
            WebhookError::MissingSignature => 401,
            WebhookError::ProcessingFailed(_) => 500,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stripe_err(type_: &str, code: Option<&str>, message: Option<&str>) -> StripeApiError {
        StripeErrorEnvelope {
            error: StripeErrorDetails {
                type_: type_.to_string(),
                code: code.map(String::from),
                decline_code: None,
                message: message.map(String::from),
                param: None,
            },
        }
        .to_api_error_with_status(Some(402))
    }

    #[test]
    fn test_card_error_is_decline() {
        let e = stripe_err("card_error", Some("card_declined"), Some("Your card was declined."));
        assert!(e.is_decline());
        assert_eq!(e.failure_message(), "Your card was declined.");
        assert_eq!(e.failure_code(), Some("card_declined".to_string()));
    }

    #[test]
    fn test_decline_code_preferred_over_code() {
        let e = StripeErrorEnvelope {
            error: StripeErrorDetails {
                type_: "card_error".into(),
                code: Some("card_declined".into()),
                decline_code: Some("insufficient_funds".into()),
                message: None,
                param: None,
            },
        }
        .to_api_error_with_status(Some(402));
        assert_eq!(e.failure_code(), Some("insufficient_funds".to_string()));
    }

    #[test]
    fn test_already_final_detection() {
        let by_code = stripe_err(
            "invalid_request_error",
            Some("payment_intent_unexpected_state"),
            None,
        );
        assert!(by_code.is_already_final());

        let by_message = stripe_err(
            "invalid_request_error",
            None,
            Some("You cannot cancel this PaymentIntent because it has a status of canceled."),
        );
        assert!(by_message.is_already_final());

        let unrelated = stripe_err("invalid_request_error", Some("parameter_missing"), None);
        assert!(!unrelated.is_already_final());
    }

    #[test]
    fn test_is_transient() {
        assert!(is_transient(Some(503), None));
        assert!(is_transient(None, Some(&StripeErrorType::RateLimitError)));
        assert!(!is_transient(Some(402), Some(&StripeErrorType::CardError)));
        assert!(!is_transient(None, None));
    }
}
