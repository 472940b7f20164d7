// Minimal Stripe DTOs and helper types.
// Narrow parsing structs at the provider boundary; strict typed records flow
// inward. Unknown status strings are rejected, never silently mapped.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::stripe::errors::StripeApiError;

/// PaymentIntent lifecycle states this service understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentStatus {
    RequiresPaymentMethod,
    RequiresConfirmation,
    RequiresAction,
    Processing,
    RequiresCapture,
    Succeeded,
    Canceled,
}

impl IntentStatus {
    pub fn parse(s: &str) -> Result<IntentStatus, StripeApiError> {
        match s {
            "requires_payment_method" => Ok(IntentStatus::RequiresPaymentMethod),
            "requires_confirmation" => Ok(IntentStatus::RequiresConfirmation),
            "requires_action" => Ok(IntentStatus::RequiresAction),
            "processing" => Ok(IntentStatus::Processing),
            "requires_capture" => Ok(IntentStatus::RequiresCapture),
            "succeeded" => Ok(IntentStatus::Succeeded),
            "canceled" => Ok(IntentStatus::Canceled),
            other => Err(StripeApiError::Decode(format!(
                "unknown payment_intent status: {other}"
            ))),
        }
    }

    /// A hold we may capture: the authorize phase counts these as success.
    pub fn is_authorized(self) -> bool {
        matches!(self, IntentStatus::RequiresCapture | IntentStatus::Succeeded)
    }
}

/// Provider-side refund states this service understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderRefundStatus {
    Pending,
    Succeeded,
    Failed,
}

impl ProviderRefundStatus {
    pub fn parse(s: &str) -> Result<ProviderRefundStatus, StripeApiError> {
        match s {
            "pending" => Ok(ProviderRefundStatus::Pending),
            "succeeded" => Ok(ProviderRefundStatus::Succeeded),
            // requires_action/canceled only arise for methods this service
            // never offers; anything else is a contract break
            "failed" => Ok(ProviderRefundStatus::Failed),
            other => Err(StripeApiError::Decode(format!(
                "unknown refund status: {other}"
            ))),
        }
    }
}

// ---- wire shapes -----------------------------------------------------------

/// PaymentIntent minimal shape
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentIntent {
    pub id: String,
    pub status: String,
    pub amount: i64,
    pub currency: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latest_charge: Option<LatestCharge>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_payment_error: Option<super::errors::StripeErrorDetails>,
}

/// latest_charge is a bare id unless the request expanded it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LatestCharge {
    Object(Box<Charge>),
    Id(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Charge {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_method_details: Option<PaymentMethodDetails>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentMethodDetails {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub card: Option<CardDetails>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CardDetails {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub brand: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last4: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exp_month: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exp_year: Option<i64>,
}

/// Refund minimal shape
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Refund {
    pub id: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_intent: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
}

/// Stripe webhook event envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StripeEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: StripeEventData,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub livemode: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StripeEventData {
    pub object: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_attributes: Option<serde_json::Value>,
}

/// Charge shape as delivered inside charge.* webhook events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChargeEventObject {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_intent: Option<String>,
    #[serde(default)]
    pub refunds: Option<RefundList>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefundList {
    #[serde(default)]
    pub data: Vec<Refund>,
}

// ---- typed records handed inward ------------------------------------------

/// Card identity recorded against a payment once the provider reveals it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CardSummary {
    pub brand: Option<String>,
    pub last_four: Option<String>,
    pub exp_month: Option<i64>,
    pub exp_year: Option<i64>,
}

impl CardSummary {
    pub fn from_intent(intent: &PaymentIntent) -> Option<CardSummary> {
        let charge = match intent.latest_charge.as_ref()? {
            LatestCharge::Object(c) => c,
            LatestCharge::Id(_) => return None,
        };
        let card = charge.payment_method_details.as_ref()?.card.as_ref()?;
        Some(CardSummary {
            brand: card.brand.clone(),
            last_four: card.last4.clone(),
            exp_month: card.exp_month,
            exp_year: card.exp_year,
        })
    }
}

/// Result of creating a manual-capture authorization.
#[derive(Debug, Clone)]
pub struct AuthorizationIntent {
    pub intent_id: String,
    pub client_secret: String,
    pub status: IntentStatus,
}

/// Result of confirming an authorization.
#[derive(Debug, Clone)]
pub struct ConfirmOutcome {
    pub status: IntentStatus,
    pub method_id: Option<String>,
    pub card: Option<CardSummary>,
}

/// Result of a provider refund creation.
#[derive(Debug, Clone)]
pub struct RefundOutcome {
    pub refund_id: String,
    pub status: ProviderRefundStatus,
}

/// Reasons Stripe accepts on refund creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefundReason {
    Duplicate,
    Fraudulent,
    RequestedByCustomer,
}

impl RefundReason {
    pub fn as_str(self) -> &'static str {
        match self {
            RefundReason::Duplicate => "duplicate",
            RefundReason::Fraudulent => "fraudulent",
            RefundReason::RequestedByCustomer => "requested_by_customer",
        }
    }

    pub fn parse(s: &str) -> Option<RefundReason> {
        match s {
            "duplicate" => Some(RefundReason::Duplicate),
            "fraudulent" => Some(RefundReason::Fraudulent),
            "requested_by_customer" => Some(RefundReason::RequestedByCustomer),
            _ => None,
        }
    }
}

/// Free-form key/value metadata attached to provider objects.
pub type Metadata = HashMap<String, String>;
