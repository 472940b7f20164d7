// Stripe provider module

pub mod errors;
pub mod rest;
pub mod types;
pub mod webhook;

use async_trait::async_trait;
use reqwest::Client;

use crate::settings::StripeSettings;
use self::errors::StripeApiError;
use self::types::{
    AuthorizationIntent, CardSummary, ConfirmOutcome, IntentStatus, Metadata, RefundOutcome,
    RefundReason,
};

/// Boundary the orchestrator drives. One implementation speaks to Stripe;
/// tests script their own.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Create a manual-capture authorization. The hold is not a charge.
    async fn create_authorization(
        &self,
        amount_cents: i64,
        currency: &str,
        metadata: &Metadata,
    ) -> Result<AuthorizationIntent, StripeApiError>;

    /// Current provider-side state of an authorization.
    async fn retrieve_authorization(&self, intent_id: &str)
        -> Result<ConfirmOutcome, StripeApiError>;

    /// Attach the payment method and confirm. `requires_action` fails closed.
    async fn confirm_authorization(
        &self,
        intent_id: &str,
        method_id: &str,
    ) -> Result<ConfirmOutcome, StripeApiError>;

    /// Move an authorization to captured.
    async fn capture_authorization(
        &self,
        intent_id: &str,
        idempotency_key: Option<&str>,
    ) -> Result<IntentStatus, StripeApiError>;

    /// Release an authorization. "Already in a final state" is success.
    async fn cancel_authorization(&self, intent_id: &str) -> Result<(), StripeApiError>;

    /// Partial refund against a captured authorization.
    async fn create_refund(
        &self,
        intent_id: &str,
        amount_cents: i64,
        reason: RefundReason,
        metadata: &Metadata,
    ) -> Result<RefundOutcome, StripeApiError>;
}

#[derive(Clone)]
pub struct StripeProvider {
    pub(crate) rest: self::rest::StripeRestClient,
}

impl StripeProvider {
    // Build reqwest client with rustls and timeout from cfg.
    pub fn new(cfg: StripeSettings) -> Result<Self, StripeApiError> {
        let timeout =
            std::time::Duration::from_millis(if cfg.timeout_ms > 0 { cfg.timeout_ms } else { 30_000 });
        let http = Client::builder()
            .use_rustls_tls()
            .timeout(timeout)
            .build()
            .map_err(|e| StripeApiError::Http(e.to_string()))?;

        let rest = self::rest::StripeRestClient::new(http, cfg.secret_key.clone()).with_version(
            if cfg.stripe_version.is_empty() { None } else { Some(cfg.stripe_version.clone()) },
        );

        Ok(Self { rest })
    }

    pub fn rest(&self) -> &self::rest::StripeRestClient {
        &self.rest
    }
}

#[async_trait]
impl PaymentGateway for StripeProvider {
    async fn create_authorization(
        &self,
        amount_cents: i64,
        currency: &str,
        metadata: &Metadata,
    ) -> Result<AuthorizationIntent, StripeApiError> {
        let intent = self
            .rest
            .create_payment_intent(amount_cents, currency, metadata)
            .await?;
        let status = IntentStatus::parse(&intent.status)?;
        let client_secret = intent.client_secret.ok_or_else(|| {
            StripeApiError::Decode("payment_intent missing client_secret".to_string())
        })?;
        Ok(AuthorizationIntent {
            intent_id: intent.id,
            client_secret,
            status,
        })
    }

    async fn retrieve_authorization(
        &self,
        intent_id: &str,
    ) -> Result<ConfirmOutcome, StripeApiError> {
        let intent = self.rest.retrieve_intent(intent_id).await?;
        let status = IntentStatus::parse(&intent.status)?;
        Ok(ConfirmOutcome {
            status,
            method_id: intent.payment_method.clone(),
            card: CardSummary::from_intent(&intent),
        })
    }

    async fn confirm_authorization(
        &self,
        intent_id: &str,
        method_id: &str,
    ) -> Result<ConfirmOutcome, StripeApiError> {
        let intent = self.rest.confirm_intent(intent_id, method_id).await?;
        let status = IntentStatus::parse(&intent.status)?;
        match status {
            // Interactive challenges are the widget's problem, before complete()
            IntentStatus::RequiresAction => Err(StripeApiError::InteractiveRequired {
                intent_id: intent_id.to_string(),
            }),
            IntentStatus::RequiresCapture | IntentStatus::Succeeded => Ok(ConfirmOutcome {
                status,
                method_id: intent.payment_method.clone(),
                card: CardSummary::from_intent(&intent),
            }),
            other => Err(StripeApiError::UnexpectedState {
                intent_id: intent_id.to_string(),
                state: format!("{other:?}"),
            }),
        }
    }

    async fn capture_authorization(
        &self,
        intent_id: &str,
        idempotency_key: Option<&str>,
    ) -> Result<IntentStatus, StripeApiError> {
        let intent = self.rest.capture_intent(intent_id, idempotency_key).await?;
        IntentStatus::parse(&intent.status)
    }

    async fn cancel_authorization(&self, intent_id: &str) -> Result<(), StripeApiError> {
        match self.rest.cancel_intent(intent_id).await {
            Ok(_) => Ok(()),
            Err(e) if e.is_already_final() => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn create_refund(
        &self,
        intent_id: &str,
        amount_cents: i64,
        reason: RefundReason,
        metadata: &Metadata,
    ) -> Result<RefundOutcome, StripeApiError> {
        let refund = self
            .rest
            .create_refund(intent_id, amount_cents, reason, metadata)
            .await?;
        let status = types::ProviderRefundStatus::parse(&refund.status)?;
        Ok(RefundOutcome {
            refund_id: refund.id,
            status,
        })
    }
}
