// JSON API: the public widget surface and the admin surface.
// Every response is `{success, ...}` or `{success: false, error: {code, message}}`.

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

use crate::db::transactions::{CustomerMeta, TransactionFilter, TransactionStatus};
use crate::db::Database;
use crate::errors::ServiceError;
use crate::orchestrator::{CardSubmission, Orchestrator};
use crate::db::refunds::RefundInitiator;
use crate::stripe::types::RefundReason;
use crate::validate;

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub db: Database,
    pub admin_api_token: String,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/widget/init", post(widget_init))
        .route("/api/widget/create-payment-intent", post(widget_create_payment_intent))
        .route("/api/widget/remove-payment", post(widget_remove_payment))
        .route("/api/widget/complete-checkout", post(widget_complete_checkout))
        .route("/api/admin/stats", get(admin_stats))
        .route("/api/admin/transactions", get(admin_list_transactions))
        .route("/api/admin/transactions/:id", get(admin_get_transaction))
        .route("/api/admin/refund", post(admin_refund))
        .route("/api/admin/stores", get(admin_list_stores))
        .route("/api/admin/settings", put(admin_update_settings))
        .route("/health", get(health_check))
        .with_state(state)
}

pub async fn run_api_server(port: u16, state: AppState) -> anyhow::Result<()> {
    let app = router(state);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("Starting API server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

async fn health_check() -> impl IntoResponse {
    Json(json!({"success": true, "status": "ok"}))
}

// ---- widget surface --------------------------------------------------------

#[derive(Deserialize)]
struct InitRequest {
    shop_domain: Option<String>,
    checkout_token: Option<String>,
}

async fn widget_init(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<InitRequest>,
) -> Result<Json<serde_json::Value>, ServiceError> {
    let shop_domain = body
        .shop_domain
        .ok_or(ServiceError::MissingParams("shop_domain"))?;
    let checkout_token = body
        .checkout_token
        .ok_or(ServiceError::MissingParams("checkout_token"))?;

    let customer = customer_meta_from_headers(&headers);
    let outcome = state
        .orchestrator
        .init(&shop_domain, &checkout_token, customer)
        .await?;

    Ok(Json(json!({
        "success": true,
        "session_id": outcome.session_id,
        "transaction_id": outcome.transaction_id,
        "total_amount": outcome.total_amount,
        "currency": outcome.currency,
        "max_cards": outcome.max_cards,
        "min_amount": outcome.min_amount,
    })))
}

#[derive(Deserialize)]
struct CreateIntentRequest {
    session_id: Option<String>,
    amount: Option<i64>,
}

async fn widget_create_payment_intent(
    State(state): State<AppState>,
    Json(body): Json<CreateIntentRequest>,
) -> Result<Json<serde_json::Value>, ServiceError> {
    let session_id = body.session_id.ok_or(ServiceError::MissingParams("session_id"))?;
    let amount = body.amount.ok_or(ServiceError::MissingParams("amount"))?;

    let outcome = state.orchestrator.add_card(&session_id, amount).await?;
    Ok(Json(json!({
        "success": true,
        "payment_intent_id": outcome.payment_intent_id,
        "client_secret": outcome.client_secret,
        "payment_id": outcome.payment_id,
    })))
}

#[derive(Deserialize)]
struct RemovePaymentRequest {
    session_id: Option<String>,
    payment_intent_id: Option<String>,
}

async fn widget_remove_payment(
    State(state): State<AppState>,
    Json(body): Json<RemovePaymentRequest>,
) -> Result<Json<serde_json::Value>, ServiceError> {
    let session_id = body.session_id.ok_or(ServiceError::MissingParams("session_id"))?;
    let payment_intent_id = body
        .payment_intent_id
        .ok_or(ServiceError::MissingParams("payment_intent_id"))?;

    state
        .orchestrator
        .remove_card(&session_id, &payment_intent_id)
        .await?;
    Ok(Json(json!({"success": true})))
}

#[derive(Deserialize)]
struct CompleteRequestCard {
    payment_intent_id: String,
    payment_method_id: String,
}

#[derive(Deserialize)]
struct CompleteRequest {
    session_id: Option<String>,
    payments: Option<Vec<CompleteRequestCard>>,
}

async fn widget_complete_checkout(
    State(state): State<AppState>,
    Json(body): Json<CompleteRequest>,
) -> Result<Json<serde_json::Value>, ServiceError> {
    let session_id = body.session_id.ok_or(ServiceError::MissingParams("session_id"))?;
    let payments = body.payments.ok_or(ServiceError::MissingParams("payments"))?;

    let submissions: Vec<CardSubmission> = payments
        .into_iter()
        .map(|p| CardSubmission {
            payment_intent_id: p.payment_intent_id,
            payment_method_id: p.payment_method_id,
        })
        .collect();

    let outcome = state.orchestrator.complete(&session_id, &submissions).await?;
    Ok(Json(json!({
        "success": true,
        "transaction_id": outcome.transaction_id,
        "order_id": outcome.order_id,
        "order_number": outcome.order_number,
    })))
}

fn customer_meta_from_headers(headers: &HeaderMap) -> CustomerMeta {
    let ip = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| validate::ip_address(v).is_ok())
        .map(String::from);
    let user_agent = headers
        .get("user-agent")
        .and_then(|v| v.to_str().ok())
        .map(String::from);
    CustomerMeta { email: None, ip, user_agent }
}

// ---- admin surface ---------------------------------------------------------

fn check_admin(headers: &HeaderMap, state: &AppState) -> Result<(), ServiceError> {
    if state.admin_api_token.is_empty() {
        return Err(ServiceError::Unauthorized("admin API is not configured"));
    }
    let presented = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or(ServiceError::Unauthorized("missing bearer token"))?;
    if presented != state.admin_api_token {
        return Err(ServiceError::Forbidden("invalid admin token"));
    }
    Ok(())
}

#[derive(Deserialize)]
struct StatsQuery {
    store_id: Option<i64>,
}

async fn admin_stats(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<StatsQuery>,
) -> Result<Json<serde_json::Value>, ServiceError> {
    check_admin(&headers, &state)?;
    let rollups = state.db.transaction_stats(query.store_id).await?;
    Ok(Json(json!({"success": true, "stats": rollups})))
}

#[derive(Deserialize)]
struct ListTransactionsQuery {
    page: Option<i64>,
    limit: Option<i64>,
    status: Option<String>,
    store_id: Option<i64>,
    #[serde(rename = "startDate")]
    start_date: Option<String>,
    #[serde(rename = "endDate")]
    end_date: Option<String>,
}

fn parse_date(value: &str) -> Result<DateTime<Utc>, ServiceError> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
        .ok_or_else(|| ServiceError::CheckoutFailed(format!("unparseable date filter: {value}")))
}

async fn admin_list_transactions(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<ListTransactionsQuery>,
) -> Result<Json<serde_json::Value>, ServiceError> {
    check_admin(&headers, &state)?;

    let status = match &query.status {
        Some(s) => Some(TransactionStatus::parse(s).ok_or_else(|| {
            ServiceError::CheckoutFailed(format!("unknown status filter: {s}"))
        })?),
        None => None,
    };
    let filter = TransactionFilter {
        store_id: query.store_id,
        status,
        start_date: query.start_date.as_deref().map(parse_date).transpose()?,
        end_date: query.end_date.as_deref().map(parse_date).transpose()?,
    };

    let page = state
        .db
        .list_transactions(&filter, query.page.unwrap_or(1), query.limit.unwrap_or(20))
        .await?;
    Ok(Json(json!({
        "success": true,
        "items": page.items,
        "total": page.total,
        "page": page.page,
        "pages": page.pages,
    })))
}

async fn admin_get_transaction(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<Json<serde_json::Value>, ServiceError> {
    check_admin(&headers, &state)?;

    let transaction = state
        .db
        .get_transaction(id)
        .await?
        .ok_or(ServiceError::TransactionNotFound)?;
    let payments = state.db.list_payments_for_transaction(id).await?;
    let refunds = state.db.list_refunds_for_transaction(id).await?;
    let total_refunded = state.db.refunded_total(id).await?;

    Ok(Json(json!({
        "success": true,
        "transaction": transaction,
        "payments": payments,
        "refunds": refunds,
        "total_refunded": total_refunded,
    })))
}

#[derive(Deserialize)]
struct AdminRefundRequest {
    transaction_id: Option<i64>,
    amount: Option<i64>,
    reason: Option<String>,
}

async fn admin_refund(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<AdminRefundRequest>,
) -> Result<Json<serde_json::Value>, ServiceError> {
    check_admin(&headers, &state)?;

    let transaction_id = body
        .transaction_id
        .ok_or(ServiceError::MissingParams("transaction_id"))?;
    let amount = body.amount.ok_or(ServiceError::MissingParams("amount"))?;
    let reason = body
        .reason
        .as_deref()
        .map(|r| {
            RefundReason::parse(r)
                .ok_or_else(|| ServiceError::CheckoutFailed(format!("unknown refund reason: {r}")))
        })
        .transpose()?
        .unwrap_or(RefundReason::RequestedByCustomer);

    let summary = state
        .orchestrator
        .refund(transaction_id, amount, reason, RefundInitiator::Admin)
        .await?;

    let refunds: Vec<serde_json::Value> = summary
        .refunds
        .iter()
        .map(|r| {
            json!({
                "payment_id": r.payment_id,
                "payment_intent_id": r.provider_intent_id,
                "amount": r.amount_cents,
                "status": r.status.as_str(),
                "refund_id": r.provider_refund_id,
                "error": r.error,
            })
        })
        .collect();
    Ok(Json(json!({
        "success": true,
        "refunds": refunds,
        "total_refunded": summary.total_refunded,
        "new_status": summary.new_status.as_str(),
    })))
}

async fn admin_list_stores(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, ServiceError> {
    check_admin(&headers, &state)?;
    let stores = state.db.list_stores().await?;
    Ok(Json(json!({"success": true, "stores": stores})))
}

#[derive(Deserialize)]
struct UpdateSettingsRequest {
    shop_domain: Option<String>,
    max_cards: Option<usize>,
    min_amount_cents: Option<i64>,
}

async fn admin_update_settings(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<UpdateSettingsRequest>,
) -> Result<Json<serde_json::Value>, ServiceError> {
    check_admin(&headers, &state)?;

    let shop_domain = body
        .shop_domain
        .ok_or(ServiceError::MissingParams("shop_domain"))?;
    let store = state
        .db
        .get_store_by_domain(&shop_domain)
        .await?
        .ok_or(ServiceError::StoreNotFound)?;

    let mut settings = store.settings();
    if let Some(max_cards) = body.max_cards {
        settings.max_cards = max_cards;
    }
    if let Some(min_amount_cents) = body.min_amount_cents {
        settings.min_amount_cents = min_amount_cents;
    }
    let settings = settings.normalized();

    state.db.update_store_settings(&shop_domain, &settings).await?;
    Ok(Json(json!({"success": true, "settings": settings})))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionStore;
    use crate::shopify::types::{CheckoutSummary, CreatedOrder, OrderDraft};
    use crate::shopify::{CommercePlatform, ShopifyApiError};
    use crate::stripe::errors::StripeApiError;
    use crate::stripe::types::{
        AuthorizationIntent, ConfirmOutcome, IntentStatus, Metadata, RefundOutcome,
    };
    use crate::stripe::PaymentGateway;
    use async_trait::async_trait;

    struct NullGateway;

    #[async_trait]
    impl PaymentGateway for NullGateway {
        async fn create_authorization(
            &self,
            _amount_cents: i64,
            _currency: &str,
            _metadata: &Metadata,
        ) -> Result<AuthorizationIntent, StripeApiError> {
            Err(StripeApiError::Precondition("not wired in this test"))
        }
        async fn retrieve_authorization(
            &self,
            _intent_id: &str,
        ) -> Result<ConfirmOutcome, StripeApiError> {
            Err(StripeApiError::Precondition("not wired in this test"))
        }
        async fn confirm_authorization(
            &self,
            _intent_id: &str,
            _method_id: &str,
        ) -> Result<ConfirmOutcome, StripeApiError> {
            Err(StripeApiError::Precondition("not wired in this test"))
        }
        async fn capture_authorization(
            &self,
            _intent_id: &str,
            _idempotency_key: Option<&str>,
        ) -> Result<IntentStatus, StripeApiError> {
            Err(StripeApiError::Precondition("not wired in this test"))
        }
        async fn cancel_authorization(&self, _intent_id: &str) -> Result<(), StripeApiError> {
            Ok(())
        }
        async fn create_refund(
            &self,
            _intent_id: &str,
            _amount_cents: i64,
            _reason: RefundReason,
            _metadata: &Metadata,
        ) -> Result<RefundOutcome, StripeApiError> {
            Err(StripeApiError::Precondition("not wired in this test"))
        }
    }

    struct NullPlatform;

    #[async_trait]
    impl CommercePlatform for NullPlatform {
        async fn fetch_checkout(
            &self,
            _shop_domain: &str,
            _checkout_token: &str,
            _access_token: &str,
        ) -> Result<CheckoutSummary, ShopifyApiError> {
            Err(ShopifyApiError::CheckoutNotFound("test".to_string()))
        }
        async fn create_order(
            &self,
            _shop_domain: &str,
            _access_token: &str,
            _draft: &OrderDraft,
        ) -> Result<CreatedOrder, ShopifyApiError> {
            Err(ShopifyApiError::Api { status: 500, detail: "test".to_string() })
        }
    }

    async fn test_state(admin_token: &str) -> AppState {
        let db = Database::in_memory().await.unwrap();
        let orchestrator = Arc::new(Orchestrator::new(
            db.clone(),
            Arc::new(NullGateway),
            Arc::new(NullPlatform),
            Arc::new(SessionStore::new()),
        ));
        AppState {
            orchestrator,
            db,
            admin_api_token: admin_token.to_string(),
        }
    }

    fn bearer(token: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", format!("Bearer {token}").parse().unwrap());
        headers
    }

    #[tokio::test]
    async fn test_admin_requires_bearer_token() {
        let state = test_state("secret").await;

        assert!(check_admin(&HeaderMap::new(), &state).is_err());
        assert!(matches!(
            check_admin(&bearer("wrong"), &state),
            Err(ServiceError::Forbidden(_))
        ));
        assert!(check_admin(&bearer("secret"), &state).is_ok());
    }

    #[tokio::test]
    async fn test_admin_rejected_when_unconfigured() {
        let state = test_state("").await;
        assert!(matches!(
            check_admin(&bearer("anything"), &state),
            Err(ServiceError::Unauthorized(_))
        ));
    }

    #[test]
    fn test_parse_date_formats() {
        assert!(parse_date("2024-03-01").is_ok());
        assert!(parse_date("2024-03-01T10:30:00Z").is_ok());
        assert!(parse_date("03/01/2024").is_err());
    }

    #[test]
    fn test_customer_meta_from_headers() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", "203.0.113.9, 10.0.0.1".parse().unwrap());
        headers.insert("user-agent", "widget/1.0".parse().unwrap());
        let meta = customer_meta_from_headers(&headers);
        assert_eq!(meta.ip.as_deref(), Some("203.0.113.9"));
        assert_eq!(meta.user_agent.as_deref(), Some("widget/1.0"));

        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", "not-an-ip".parse().unwrap());
        let meta = customer_meta_from_headers(&headers);
        assert!(meta.ip.is_none());
    }
}
