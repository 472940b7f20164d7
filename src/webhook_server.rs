// HTTP webhook server for provider and platform events.
// Both routes take the raw body: signatures are computed over exact bytes.

use crate::reconciler::Reconciler;
use crate::shopify;
use crate::stripe::errors::WebhookError;
use crate::stripe::webhook;
use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::post,
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, info, warn};

#[derive(Clone)]
pub struct WebhookState {
    pub reconciler: Arc<Reconciler>,
    pub stripe_webhook_secret: String,
    pub stripe_tolerance_seconds: i64,
    pub shopify_api_secret: String,
}

pub fn router(state: WebhookState) -> Router {
    Router::new()
        .route("/api/stripe/webhook", post(handle_stripe_webhook))
        .route("/api/webhooks/shopify", post(handle_shopify_webhook))
        .route("/health", axum::routing::get(health_check))
        .with_state(state)
}

pub async fn run_webhook_server(port: u16, state: WebhookState) -> anyhow::Result<()> {
    let app = router(state);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("Starting webhook HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

async fn handle_stripe_webhook(
    State(state): State<WebhookState>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    let event = match webhook::verify_and_parse(
        &body,
        &headers,
        &state.stripe_webhook_secret,
        state.stripe_tolerance_seconds,
    ) {
        Ok(event) => event,
        Err(e) => {
            error!("Stripe webhook rejected: {}", e);
            let status_code = match e {
                WebhookError::InvalidSignature(_) => StatusCode::UNAUTHORIZED,
                WebhookError::MissingSignature => StatusCode::UNAUTHORIZED,
                WebhookError::TimestampTolerance(_) => StatusCode::BAD_REQUEST,
                WebhookError::MalformedPayload(_) => StatusCode::BAD_REQUEST,
                WebhookError::MissingSecret => StatusCode::INTERNAL_SERVER_ERROR,
                WebhookError::ProcessingFailed(_) => StatusCode::INTERNAL_SERVER_ERROR,
            };
            return (status_code, e.to_string());
        }
    };

    // valid signature: processing failures are swallowed inside the
    // reconciler so the provider never retry-floods this endpoint
    state.reconciler.process_stripe_event(&event).await;
    (StatusCode::OK, "OK".to_string())
}

async fn handle_shopify_webhook(
    State(state): State<WebhookState>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    let hmac_header = headers
        .get("x-shopify-hmac-sha256")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    if !shopify::verify_webhook(&body, hmac_header, &state.shopify_api_secret) {
        warn!("Shopify webhook rejected: invalid HMAC");
        return (StatusCode::UNAUTHORIZED, "invalid signature".to_string());
    }

    let topic = headers
        .get("x-shopify-topic")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    let shop_domain = headers
        .get("x-shopify-shop-domain")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();

    state
        .reconciler
        .process_shopify_event(&topic, &shop_domain, &body)
        .await;
    (StatusCode::OK, "OK".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    async fn test_state() -> WebhookState {
        let db = Database::in_memory().await.unwrap();
        WebhookState {
            reconciler: Arc::new(Reconciler::new(db)),
            stripe_webhook_secret: "whsec_test".to_string(),
            stripe_tolerance_seconds: 300,
            shopify_api_secret: "shpss_test".to_string(),
        }
    }

    #[tokio::test]
    async fn test_health_check() {
        let response = health_check().await.into_response();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_stripe_webhook_missing_signature() {
        let state = test_state().await;
        let headers = HeaderMap::new();
        let body = Bytes::from("{}");

        let response = handle_stripe_webhook(State(state), headers, body)
            .await
            .into_response();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_shopify_webhook_bad_hmac_no_mutation() {
        let state = test_state().await;
        let mut headers = HeaderMap::new();
        headers.insert("x-shopify-hmac-sha256", "Zm9yZ2Vk".parse().unwrap());
        headers.insert("x-shopify-topic", "app/uninstalled".parse().unwrap());
        headers.insert("x-shopify-shop-domain", "s.myshopify.com".parse().unwrap());

        let response = handle_shopify_webhook(State(state), headers, Bytes::from("{}"))
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_shopify_webhook_valid_hmac_returns_200() {
        use base64::{engine::general_purpose::STANDARD, Engine as _};
        use hmac::{Hmac, Mac};
        use sha2::Sha256;
        type HmacSha256 = Hmac<Sha256>;

        let state = test_state().await;
        let body = br#"{"id": 1}"#;
        let mut mac = HmacSha256::new_from_slice(b"shpss_test").unwrap();
        mac.update(body);
        let sig = STANDARD.encode(mac.finalize().into_bytes());

        let mut headers = HeaderMap::new();
        headers.insert("x-shopify-hmac-sha256", sig.parse().unwrap());
        headers.insert("x-shopify-topic", "orders/create".parse().unwrap());
        headers.insert("x-shopify-shop-domain", "s.myshopify.com".parse().unwrap());

        let response = handle_shopify_webhook(State(state), headers, Bytes::from(&body[..]))
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
