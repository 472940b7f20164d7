// Stripe REST client
// Implements the manual-capture authorization lifecycle with cents
// enforcement and idempotency header propagation.

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use reqwest::{Client, StatusCode};
use std::future::Future;
use tracing::{info, instrument, warn};

use crate::stripe::errors::{is_transient, StripeApiError, StripeErrorEnvelope};
use crate::stripe::types::{Metadata, PaymentIntent, Refund, RefundReason};

const STRIPE_API_BASE: &str = "https://api.stripe.com";

#[derive(Clone)]
pub struct StripeRestClient {
    pub(crate) http: Client,
    pub(crate) api_key: String,
    pub(crate) stripe_version: Option<String>,
    // Retry knobs with safe defaults
    pub(crate) max_retries: u32,
    pub(crate) base_delay_ms: u64,
    pub(crate) max_delay_ms: u64,
}

impl StripeRestClient {
    pub fn new(http: Client, api_key: String) -> Self {
        Self {
            http,
            api_key,
            stripe_version: None,
            max_retries: 2,
            base_delay_ms: 100,
            max_delay_ms: 2_000,
        }
    }

    pub fn with_version(mut self, ver: impl Into<Option<String>>) -> Self {
        self.stripe_version = ver.into();
        self
    }

    #[allow(dead_code)]
    pub fn with_retry(mut self, max_retries: u32, base_delay_ms: u64, max_delay_ms: u64) -> Self {
        self.max_retries = max_retries;
        self.base_delay_ms = base_delay_ms.max(1);
        self.max_delay_ms = if max_delay_ms == 0 { self.base_delay_ms } else { max_delay_ms };
        if self.max_delay_ms < self.base_delay_ms {
            self.max_delay_ms = self.base_delay_ms;
        }
        self
    }

    fn apply_common_headers(
        &self,
        req: reqwest::RequestBuilder,
        idempotency_key: Option<&str>,
    ) -> reqwest::RequestBuilder {
        let mut req = req.bearer_auth(&self.api_key);
        if let Some(k) = idempotency_key {
            req = req.header("Idempotency-Key", k);
        }
        if let Some(v) = &self.stripe_version {
            if !v.is_empty() {
                req = req.header("Stripe-Version", v);
            }
        }
        req
    }

    fn map_error(status: StatusCode, body: &str) -> StripeApiError {
        if let Ok(env) = serde_json::from_str::<StripeErrorEnvelope>(body) {
            env.to_api_error_with_status(Some(status.as_u16()))
        } else {
            StripeApiError::Http(format!("status={} body={}", status.as_u16(), body))
        }
    }

    async fn with_retries<F, Fut, T>(
        &self,
        desc: &str,
        max_retries: u32,
        mut op: F,
    ) -> Result<T, StripeApiError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, StripeApiError>>,
    {
        let mut attempt: u32 = 0;
        loop {
            match op().await {
                Ok(v) => return Ok(v),
                Err(e) => {
                    let (http_status, err_type) = match &e {
                        StripeApiError::Stripe { status, type_, .. } => (*status, Some(type_)),
                        StripeApiError::Http(_) => (Some(503), None),
                        StripeApiError::Transient(_) => (Some(503), None),
                        _ => (None, None),
                    };
                    let retryable = is_transient(http_status, err_type);
                    if !retryable || attempt >= max_retries {
                        return Err(e);
                    }

                    // Exponential backoff with full jitter
                    let exp = self
                        .base_delay_ms
                        .saturating_mul(1u64 << attempt.min(20));
                    let cap = exp.min(self.max_delay_ms.max(self.base_delay_ms));
                    let mut rng = SmallRng::from_entropy();
                    let delay_ms = if cap > self.base_delay_ms {
                        rng.gen_range(self.base_delay_ms..=cap)
                    } else {
                        self.base_delay_ms
                    };

                    warn!(
                        target: "stripe",
                        desc = %desc,
                        attempt = attempt + 1,
                        max_retries = max_retries,
                        http_status = ?http_status,
                        error_type = ?err_type,
                        next_delay_ms = delay_ms,
                        "retrying transient Stripe error"
                    );

                    tokio::time::sleep(std::time::Duration::from_millis(delay_ms)).await;
                    attempt += 1;
                }
            }
        }
    }

    async fn post_form(
        &self,
        path: &str,
        form: &[(String, String)],
        idempotency_key: Option<&str>,
    ) -> Result<String, StripeApiError> {
        let url = format!("{STRIPE_API_BASE}{path}");
        let req = self.http.post(url).form(form);
        let req = self.apply_common_headers(req, idempotency_key);
        let resp = req.send().await.map_err(|e| StripeApiError::Http(e.to_string()))?;
        let status = resp.status();
        let text = resp.text().await.map_err(|e| StripeApiError::Decode(e.to_string()))?;
        if status.is_success() {
            Ok(text)
        } else {
            Err(Self::map_error(status, &text))
        }
    }

    fn metadata_fields(form: &mut Vec<(String, String)>, metadata: &Metadata) {
        for (k, v) in metadata {
            form.push((format!("metadata[{k}]"), v.clone()));
        }
    }

    // POST /v1/payment_intents
    // Always manual capture: the authorization is a hold, not a charge.
    #[instrument(skip(self, metadata), fields(method="POST", path="/v1/payment_intents"))]
    pub async fn create_payment_intent(
        &self,
        amount_cents: i64,
        currency: &str,
        metadata: &Metadata,
    ) -> Result<PaymentIntent, StripeApiError> {
        if amount_cents <= 0 {
            return Err(StripeApiError::Precondition("amount must be positive cents"));
        }

        let mut form: Vec<(String, String)> = vec![
            ("amount".into(), amount_cents.to_string()),
            ("currency".into(), currency.to_ascii_lowercase()),
            ("capture_method".into(), "manual".into()),
            ("payment_method_types[]".into(), "card".into()),
        ];
        Self::metadata_fields(&mut form, metadata);

        info!(
            target: "stripe",
            method = "POST",
            path = "/v1/payment_intents",
            amount_cents = amount_cents,
            currency = %currency,
            "stripe request"
        );

        let req_builder = || {
            let client = self;
            let form = &form;
            async move {
                let text = client.post_form("/v1/payment_intents", form, None).await?;
                serde_json::from_str::<PaymentIntent>(&text)
                    .map_err(|e| StripeApiError::Decode(e.to_string()))
            }
        };
        self.with_retries("create_payment_intent", self.max_retries, req_builder)
            .await
    }

    // GET /v1/payment_intents/{id}
    #[instrument(skip(self), fields(method="GET", path="/v1/payment_intents/{id}", intent_id=%intent_id))]
    pub async fn retrieve_intent(&self, intent_id: &str) -> Result<PaymentIntent, StripeApiError> {
        info!(
            target: "stripe",
            method = "GET",
            path = "/v1/payment_intents/{id}",
            intent_id = %intent_id,
            "stripe request"
        );
        // Keep retrieve lightweight: single retry only
        let req_builder = || {
            let url = format!("{STRIPE_API_BASE}/v1/payment_intents/{intent_id}");
            let req = self.http.get(url);
            let req = self.apply_common_headers(req, None);
            async move {
                let resp = req.send().await.map_err(|e| StripeApiError::Http(e.to_string()))?;
                let status = resp.status();
                let text = resp.text().await.map_err(|e| StripeApiError::Decode(e.to_string()))?;
                if status.is_success() {
                    serde_json::from_str::<PaymentIntent>(&text)
                        .map_err(|e| StripeApiError::Decode(e.to_string()))
                } else {
                    Err(Self::map_error(status, &text))
                }
            }
        };
        self.with_retries("retrieve_intent", 1, req_builder).await
    }

    // POST /v1/payment_intents/{id}/confirm
    // Expands latest_charge so the caller learns the card identity.
    #[instrument(skip(self), fields(method="POST", path="/v1/payment_intents/{id}/confirm", intent_id=%intent_id))]
    pub async fn confirm_intent(
        &self,
        intent_id: &str,
        payment_method_id: &str,
    ) -> Result<PaymentIntent, StripeApiError> {
        let form: Vec<(String, String)> = vec![
            ("payment_method".into(), payment_method_id.to_string()),
            ("expand[]".into(), "latest_charge".into()),
        ];

        info!(
            target: "stripe",
            method = "POST",
            path = "/v1/payment_intents/{id}/confirm",
            intent_id = %intent_id,
            "stripe request"
        );

        // Confirm is not retried: a transient failure here leaves the intent
        // state unknown and the orchestrator re-checks via retrieve.
        let path = format!("/v1/payment_intents/{intent_id}/confirm");
        let text = self.post_form(&path, &form, None).await?;
        serde_json::from_str::<PaymentIntent>(&text)
            .map_err(|e| StripeApiError::Decode(e.to_string()))
    }

    // POST /v1/payment_intents/{id}/capture
    #[instrument(skip(self), fields(method="POST", path="/v1/payment_intents/{id}/capture", intent_id=%intent_id))]
    pub async fn capture_intent(
        &self,
        intent_id: &str,
        idempotency_key: Option<&str>,
    ) -> Result<PaymentIntent, StripeApiError> {
        info!(
            target: "stripe",
            method = "POST",
            path = "/v1/payment_intents/{id}/capture",
            intent_id = %intent_id,
            idempotency_key = idempotency_key.unwrap_or(""),
            "stripe request"
        );

        let path = format!("/v1/payment_intents/{intent_id}/capture");
        let req_builder = || {
            let client = self;
            let path = path.as_str();
            async move {
                let text = client.post_form(path, &[], idempotency_key).await?;
                serde_json::from_str::<PaymentIntent>(&text)
                    .map_err(|e| StripeApiError::Decode(e.to_string()))
            }
        };
        self.with_retries("capture_intent", self.max_retries, req_builder)
            .await
    }

    // POST /v1/payment_intents/{id}/cancel
    #[instrument(skip(self), fields(method="POST", path="/v1/payment_intents/{id}/cancel", intent_id=%intent_id))]
    pub async fn cancel_intent(&self, intent_id: &str) -> Result<PaymentIntent, StripeApiError> {
        info!(
            target: "stripe",
            method = "POST",
            path = "/v1/payment_intents/{id}/cancel",
            intent_id = %intent_id,
            "stripe request"
        );

        let path = format!("/v1/payment_intents/{intent_id}/cancel");
        let req_builder = || {
            let client = self;
            let path = path.as_str();
            async move {
                let text = client.post_form(path, &[], None).await?;
                serde_json::from_str::<PaymentIntent>(&text)
                    .map_err(|e| StripeApiError::Decode(e.to_string()))
            }
        };
        self.with_retries("cancel_intent", self.max_retries, req_builder)
            .await
    }

    // POST /v1/refunds
    // Partial refunds permitted; Stripe caps them at captured minus refunded.
    #[instrument(skip(self, metadata), fields(method="POST", path="/v1/refunds", intent_id=%intent_id))]
    pub async fn create_refund(
        &self,
        intent_id: &str,
        amount_cents: i64,
        reason: RefundReason,
        metadata: &Metadata,
    ) -> Result<Refund, StripeApiError> {
        if amount_cents <= 0 {
            return Err(StripeApiError::Precondition("refund amount must be positive cents"));
        }

        let mut form: Vec<(String, String)> = vec![
            ("payment_intent".into(), intent_id.to_string()),
            ("amount".into(), amount_cents.to_string()),
            ("reason".into(), reason.as_str().to_string()),
        ];
        Self::metadata_fields(&mut form, metadata);

        info!(
            target: "stripe",
            method = "POST",
            path = "/v1/refunds",
            intent_id = %intent_id,
            amount_cents = amount_cents,
            "stripe request"
        );

        let req_builder = || {
            let client = self;
            let form = &form;
            async move {
                let text = client.post_form("/v1/refunds", form, None).await?;
                serde_json::from_str::<Refund>(&text)
                    .map_err(|e| StripeApiError::Decode(e.to_string()))
            }
        };
        self.with_retries("create_refund", self.max_retries, req_builder)
            .await
    }
}
