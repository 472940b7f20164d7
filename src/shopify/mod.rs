// Shopify Admin API client: authoritative checkout reads, order creation,
// webhook HMAC verification.

pub mod types;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::{Client, StatusCode};
use thiserror::Error;
use tracing::{info, instrument};

use crate::settings::ShopifySettings;
use self::types::{
    CheckoutEnvelope, CheckoutSummary, CreatedOrder, OrderCreateEnvelope, OrderDraft,
    OrderEnvelope, ShopifyErrorEnvelope,
};

#[derive(Debug, Error)]
pub enum ShopifyApiError {
    #[error("http error: {0}")]
    Http(String),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("shopify error: status={status} {detail}")]
    Api { status: u16, detail: String },
    #[error("checkout {0} not found")]
    CheckoutNotFound(String),
}

/// Commerce-platform boundary the orchestrator consumes. One implementation
/// speaks to Shopify; tests script their own.
#[async_trait]
pub trait CommercePlatform: Send + Sync {
    /// Authoritative total/currency/email for a live checkout.
    async fn fetch_checkout(
        &self,
        shop_domain: &str,
        checkout_token: &str,
        access_token: &str,
    ) -> Result<CheckoutSummary, ShopifyApiError>;

    /// Record the paid order platform-side after capture-all.
    async fn create_order(
        &self,
        shop_domain: &str,
        access_token: &str,
        draft: &OrderDraft,
    ) -> Result<CreatedOrder, ShopifyApiError>;
}

#[derive(Clone)]
pub struct ShopifyClient {
    http: Client,
    api_version: String,
}

impl ShopifyClient {
    pub fn new(cfg: &ShopifySettings) -> Result<Self, ShopifyApiError> {
        let http = Client::builder()
            .use_rustls_tls()
            .timeout(std::time::Duration::from_millis(cfg.timeout_ms))
            .build()
            .map_err(|e| ShopifyApiError::Http(e.to_string()))?;
        Ok(Self {
            http,
            api_version: cfg.api_version.clone(),
        })
    }

    fn admin_url(&self, shop_domain: &str, path: &str) -> String {
        format!(
            "https://{}/admin/api/{}/{}",
            shop_domain, self.api_version, path
        )
    }

    async fn map_error(resp: reqwest::Response) -> ShopifyApiError {
        let status = resp.status();
        let text = resp.text().await.unwrap_or_default();
        let detail = serde_json::from_str::<ShopifyErrorEnvelope>(&text)
            .map(|e| e.errors.to_string())
            .unwrap_or(text);
        ShopifyApiError::Api {
            status: status.as_u16(),
            detail,
        }
    }
}

#[async_trait]
impl CommercePlatform for ShopifyClient {
    #[instrument(skip(self, access_token), fields(shop=%shop_domain))]
    async fn fetch_checkout(
        &self,
        shop_domain: &str,
        checkout_token: &str,
        access_token: &str,
    ) -> Result<CheckoutSummary, ShopifyApiError> {
        let url = self.admin_url(shop_domain, &format!("checkouts/{checkout_token}.json"));
        info!(target: "shopify", method = "GET", shop = %shop_domain, "fetching checkout");

        let resp = self
            .http
            .get(url)
            .header("X-Shopify-Access-Token", access_token)
            .send()
            .await
            .map_err(|e| ShopifyApiError::Http(e.to_string()))?;

        if resp.status() == StatusCode::NOT_FOUND {
            return Err(ShopifyApiError::CheckoutNotFound(checkout_token.to_string()));
        }
        if !resp.status().is_success() {
            return Err(Self::map_error(resp).await);
        }

        let envelope: CheckoutEnvelope = resp
            .json()
            .await
            .map_err(|e| ShopifyApiError::Decode(e.to_string()))?;
        if envelope.checkout.token != checkout_token {
            return Err(ShopifyApiError::Decode(format!(
                "platform returned checkout {} for token {}",
                envelope.checkout.token, checkout_token
            )));
        }
        envelope.checkout.into_summary()
    }

    #[instrument(skip(self, access_token, draft), fields(shop=%shop_domain, transaction_id=draft.transaction_id))]
    async fn create_order(
        &self,
        shop_domain: &str,
        access_token: &str,
        draft: &OrderDraft,
    ) -> Result<CreatedOrder, ShopifyApiError> {
        let url = self.admin_url(shop_domain, "orders.json");
        let payload = OrderCreateEnvelope::from_draft(draft);
        info!(
            target: "shopify",
            method = "POST",
            shop = %shop_domain,
            transaction_id = draft.transaction_id,
            payment_count = draft.payment_count,
            "creating order"
        );

        let resp = self
            .http
            .post(url)
            .header("X-Shopify-Access-Token", access_token)
            .json(&payload)
            .send()
            .await
            .map_err(|e| ShopifyApiError::Http(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(Self::map_error(resp).await);
        }

        let envelope: OrderEnvelope = resp
            .json()
            .await
            .map_err(|e| ShopifyApiError::Decode(e.to_string()))?;
        Ok(envelope.order.into_created())
    }
}

/// Verify a Shopify webhook: HMAC-SHA256 over the raw body keyed with the
/// app secret, base64, compared constant-time against the header value.
pub fn verify_webhook(payload: &[u8], hmac_header: &str, secret: &str) -> bool {
    use hmac::{Hmac, Mac};
    use sha2::Sha256;

    type HmacSha256 = Hmac<Sha256>;

    if secret.is_empty() {
        return false;
    }
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return false,
    };
    mac.update(payload);
    let expected = STANDARD.encode(mac.finalize().into_bytes());

    expected.as_bytes().len() == hmac_header.as_bytes().len()
        && expected
            .as_bytes()
            .iter()
            .zip(hmac_header.as_bytes())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sign(payload: &[u8], secret: &str) -> String {
        use hmac::{Hmac, Mac};
        use sha2::Sha256;
        type HmacSha256 = Hmac<Sha256>;

        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(payload);
        STANDARD.encode(mac.finalize().into_bytes())
    }

    #[test]
    fn test_verify_webhook_valid() {
        let payload = br#"{"id":1234}"#;
        let secret = "shpss_test_secret";
        assert!(verify_webhook(payload, &sign(payload, secret), secret));
    }

    #[test]
    fn test_verify_webhook_wrong_secret() {
        let payload = br#"{"id":1234}"#;
        assert!(!verify_webhook(
            payload,
            &sign(payload, "other_secret"),
            "shpss_test_secret"
        ));
    }

    #[test]
    fn test_verify_webhook_modified_payload() {
        let payload = br#"{"id":1234}"#;
        let secret = "shpss_test_secret";
        let sig = sign(payload, secret);
        assert!(!verify_webhook(br#"{"id":9999}"#, &sig, secret));
    }

    #[test]
    fn test_verify_webhook_empty_secret_rejected() {
        let payload = b"x";
        assert!(!verify_webhook(payload, "AAAA", ""));
    }
}
