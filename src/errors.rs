// Service-level errors and their single mapping to HTTP status + stable
// error code. Adapter errors keep their kind on the way up; the orchestrator
// turns them into transaction-state transitions before they reach here.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use crate::shopify::ShopifyApiError;
use crate::stripe::errors::StripeApiError;
use crate::validate::ValidationError;

/// The card the widget should highlight after a decline.
#[derive(Debug, Clone, Serialize)]
pub struct FailedCard {
    pub payment_intent_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub card_brand: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub card_last_four: Option<String>,
    pub message: String,
}

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("missing required parameter: {0}")]
    MissingParams(&'static str),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("store not found")]
    StoreNotFound,
    #[error("transaction not found")]
    TransactionNotFound,
    #[error("session not found or expired")]
    SessionNotFound,
    #[error("payment not part of this session")]
    PaymentNotInSession,
    #[error("too many cards: limit is {0}")]
    TooManyCards(usize),
    #[error("checkout failed: {0}")]
    CheckoutFailed(String),
    #[error("card declined: {}", failed_card.message)]
    CardDeclined { failed_card: FailedCard },
    #[error("{0}")]
    Unauthorized(&'static str),
    #[error("{0}")]
    Forbidden(&'static str),
    #[error("stripe error: {0}")]
    Stripe(#[from] StripeApiError),
    #[error("platform error: {0}")]
    Platform(#[from] ShopifyApiError),
    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),
    #[error("internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    /// Stable machine-readable code for the JSON error envelope.
    pub fn code(&self) -> &'static str {
        match self {
            ServiceError::MissingParams(_) => "MISSING_PARAMS",
            ServiceError::Validation(v) => match v {
                ValidationError::InvalidShopDomain => "INVALID_SHOP",
                ValidationError::InvalidCheckoutToken => "INVALID_TOKEN",
                ValidationError::InvalidCardCount(_) => "TOO_MANY_CARDS",
                ValidationError::InvalidAmount(_)
                | ValidationError::AmountSumMismatch { .. } => "INVALID_AMOUNT",
                _ => "MISSING_PARAMS",
            },
            ServiceError::StoreNotFound => "STORE_NOT_FOUND",
            ServiceError::TransactionNotFound => "TRANSACTION_NOT_FOUND",
            ServiceError::SessionNotFound => "SESSION_NOT_FOUND",
            ServiceError::PaymentNotInSession => "TRANSACTION_NOT_FOUND",
            ServiceError::TooManyCards(_) => "TOO_MANY_CARDS",
            ServiceError::CheckoutFailed(_) => "CHECKOUT_FAILED",
            ServiceError::CardDeclined { .. } => "CARD_DECLINED",
            ServiceError::Unauthorized(_) => "UNAUTHORIZED",
            ServiceError::Forbidden(_) => "FORBIDDEN",
            ServiceError::Stripe(_) => "STRIPE_ERROR",
            ServiceError::Platform(_) => "CHECKOUT_FAILED",
            ServiceError::Db(_) | ServiceError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ServiceError::MissingParams(_)
            | ServiceError::Validation(_)
            | ServiceError::TooManyCards(_)
            | ServiceError::CheckoutFailed(_) => StatusCode::BAD_REQUEST,
            ServiceError::SessionNotFound | ServiceError::Unauthorized(_) => {
                StatusCode::UNAUTHORIZED
            }
            ServiceError::CardDeclined { .. } => StatusCode::PAYMENT_REQUIRED,
            ServiceError::Forbidden(_) => StatusCode::FORBIDDEN,
            ServiceError::StoreNotFound
            | ServiceError::TransactionNotFound
            | ServiceError::PaymentNotInSession => StatusCode::NOT_FOUND,
            ServiceError::Stripe(_) | ServiceError::Platform(_) => StatusCode::BAD_GATEWAY,
            ServiceError::Db(_) | ServiceError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    code: &'static str,
    message: String,
}

#[derive(Serialize)]
struct ErrorEnvelope {
    success: bool,
    error: ErrorBody,
    #[serde(rename = "failedCard", skip_serializing_if = "Option::is_none")]
    failed_card: Option<FailedCard>,
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, code = self.code(), "request failed");
        }
        let failed_card = match &self {
            ServiceError::CardDeclined { failed_card } => Some(failed_card.clone()),
            _ => None,
        };
        let body = ErrorEnvelope {
            success: false,
            error: ErrorBody {
                code: self.code(),
                message: self.to_string(),
            },
            failed_card,
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_codes() {
        let e = ServiceError::Validation(ValidationError::InvalidShopDomain);
        assert_eq!(e.code(), "INVALID_SHOP");
        assert_eq!(e.status(), StatusCode::BAD_REQUEST);

        let e = ServiceError::Validation(ValidationError::InvalidCardCount(6));
        assert_eq!(e.code(), "TOO_MANY_CARDS");
    }

    #[test]
    fn test_decline_maps_to_402() {
        let e = ServiceError::CardDeclined {
            failed_card: FailedCard {
                payment_intent_id: "pi_2".into(),
                card_brand: Some("visa".into()),
                card_last_four: Some("4242".into()),
                message: "Your card was declined.".into(),
            },
        };
        assert_eq!(e.status(), StatusCode::PAYMENT_REQUIRED);
        assert_eq!(e.code(), "CARD_DECLINED");
    }

    #[test]
    fn test_session_errors_are_401() {
        assert_eq!(ServiceError::SessionNotFound.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ServiceError::SessionNotFound.code(), "SESSION_NOT_FOUND");
    }
}
