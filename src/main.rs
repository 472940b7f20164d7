mod db;
mod errors;
mod metrics;
mod money;
mod orchestrator;
mod reconciler;
mod server;
mod session;
mod settings;
mod shopify;
mod stripe;
mod validate;
mod webhook_server;

use crate::db::Database;
use crate::orchestrator::Orchestrator;
use crate::reconciler::Reconciler;
use crate::server::AppState;
use crate::session::SessionStore;
use crate::shopify::ShopifyClient;
use crate::stripe::StripeProvider;
use crate::webhook_server::WebhookState;
use anyhow::Result;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse().unwrap()))
        .init();

    // Load configuration from environment
    let cfg = settings::Config::from_env();

    // Validate provider configuration
    if cfg.stripe.secret_key.is_empty() {
        tracing::error!("STRIPE_SECRET_KEY not set; exiting");
        return Ok(());
    }
    if cfg.shopify.api_secret.is_empty() {
        tracing::error!("SHOPIFY_API_SECRET not set; exiting");
        return Ok(());
    }
    tracing::info!("Starting split-payment processor");

    // Durable store; migrations run before anything serves traffic
    let db = Database::connect(&cfg.database_url, cfg.database_max_connections).await?;

    let gateway = Arc::new(StripeProvider::new(cfg.stripe.clone())?);
    let platform = Arc::new(ShopifyClient::new(&cfg.shopify)?);
    let sessions = Arc::new(SessionStore::new().with_ttl(cfg.session_ttl));
    let orchestrator = Arc::new(Orchestrator::new(
        db.clone(),
        gateway,
        platform,
        sessions,
    ));

    // Walk the post-capture crash window before accepting new checkouts:
    // completed transactions with no platform order get their order retried.
    match orchestrator.recover_pending_orders().await {
        Ok(0) => {}
        Ok(recovered) => tracing::info!(recovered, "recovered orders for captured transactions"),
        Err(e) => tracing::error!("order recovery scan failed: {}", e),
    }

    // Start webhook HTTP server in background if webhook secret is configured
    if !cfg.stripe.webhook_secret.is_empty() {
        let webhook_port = cfg.server_port + 1; // Use next port for webhooks
        let webhook_state = WebhookState {
            reconciler: Arc::new(Reconciler::new(db.clone())),
            stripe_webhook_secret: cfg.stripe.webhook_secret.clone(),
            stripe_tolerance_seconds: cfg.stripe.webhook_tolerance_seconds,
            shopify_api_secret: cfg.shopify.api_secret.clone(),
        };

        tokio::spawn(async move {
            if let Err(e) = webhook_server::run_webhook_server(webhook_port, webhook_state).await {
                tracing::error!("Webhook server failed: {}", e);
            }
        });

        tracing::info!(
            webhook_port = webhook_port,
            "Webhook HTTP server starting on port {}",
            webhook_port
        );
    } else {
        tracing::warn!("Webhook secret not configured - webhook server will not start");
    }

    let state = AppState {
        orchestrator,
        db,
        admin_api_token: cfg.admin_api_token.clone(),
    };
    server::run_api_server(cfg.server_port, state).await?;

    Ok(())
}
