// Webhook reconciler: aligns local payment/refund state to provider-pushed
// events and handles platform lifecycle topics. Signatures are verified
// before this module runs; processing errors are logged through the alert
// path and swallowed so the caller can answer 200 and stop provider retries.

use tracing::{debug, error, info, warn};

use crate::db::payments::PaymentStatus;
use crate::db::refunds::RefundStatus;
use crate::db::Database;
use crate::payment_counter_inc;
use crate::stripe::types::{ChargeEventObject, PaymentIntent, StripeEvent};

pub struct Reconciler {
    db: Database,
}

impl Reconciler {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    // ---- provider events ---------------------------------------------------

    /// Dispatch a verified Stripe event. Errors are reported, never returned:
    /// the webhook surface always answers 200 for a valid signature.
    pub async fn process_stripe_event(&self, event: &StripeEvent) {
        debug!(
            event_id = %event.id,
            event_type = %event.event_type,
            "processing provider event"
        );

        let result = match event.event_type.as_str() {
            "payment_intent.succeeded" => self.on_intent_succeeded(event).await,
            "payment_intent.payment_failed" => self.on_intent_failed(event).await,
            "payment_intent.canceled" => self.on_intent_canceled(event).await,
            "charge.refunded" => self.on_charge_refunded(event).await,
            "charge.dispute.created" => self.on_dispute_created(event).await,
            other => {
                info!(event_type = %other, "ignoring unsupported provider event");
                payment_counter_inc!("webhook.ignored", "event_type" => other);
                return;
            }
        };

        match result {
            Ok(()) => {
                payment_counter_inc!("webhook.processed", "event_type" => event.event_type.as_str());
            }
            Err(e) => {
                // swallow-200 policy: keep the provider from retry-flooding,
                // but make the failure loud enough to monitor
                error!(
                    target: "alert",
                    event_id = %event.id,
                    event_type = %event.event_type,
                    error = %e,
                    "provider event processing failed; replied 200 anyway"
                );
                payment_counter_inc!("webhook.swallowed", "event_type" => event.event_type.as_str());
            }
        }
    }

    fn intent_from(event: &StripeEvent) -> Result<PaymentIntent, String> {
        serde_json::from_value(event.data.object.clone())
            .map_err(|e| format!("failed to parse PaymentIntent: {e}"))
    }

    async fn on_intent_succeeded(&self, event: &StripeEvent) -> Result<(), String> {
        let intent = Self::intent_from(event)?;
        let payment = self
            .db
            .get_payment_by_intent(&intent.id)
            .await
            .map_err(|e| e.to_string())?;
        let Some(payment) = payment else {
            warn!(intent_id = %intent.id, "succeeded event for unknown payment");
            return Ok(());
        };
        if let Some(status) = payment.status() {
            if status.is_terminal() && status != PaymentStatus::Captured {
                warn!(
                    intent_id = %intent.id,
                    status = status.as_str(),
                    "succeeded event for payment already terminal; not reapplied"
                );
                return Ok(());
            }
        }

        // Races with complete() are benign: the guarded update refuses to
        // regress a terminal row and re-capturing a captured row is a no-op.
        let changed = self
            .db
            .mark_payment_captured(&intent.id)
            .await
            .map_err(|e| e.to_string())?;
        if changed {
            info!(
                intent_id = %intent.id,
                transaction_id = payment.transaction_id,
                "payment marked captured from provider event"
            );
        }
        Ok(())
    }

    async fn on_intent_failed(&self, event: &StripeEvent) -> Result<(), String> {
        let intent = Self::intent_from(event)?;
        let (code, message) = intent
            .last_payment_error
            .as_ref()
            .map(|e| {
                (
                    e.code.clone().or_else(|| e.decline_code.clone()),
                    e.message.clone().unwrap_or_else(|| "payment failed".to_string()),
                )
            })
            .unwrap_or((None, "payment failed".to_string()));

        let changed = self
            .db
            .mark_payment_failed(&intent.id, code.as_deref(), &message)
            .await
            .map_err(|e| e.to_string())?;
        if changed {
            info!(intent_id = %intent.id, "payment marked failed from provider event");
        }
        Ok(())
    }

    async fn on_intent_canceled(&self, event: &StripeEvent) -> Result<(), String> {
        let intent = Self::intent_from(event)?;
        let changed = self
            .db
            .mark_payment_voided(&intent.id)
            .await
            .map_err(|e| e.to_string())?;
        if changed {
            info!(intent_id = %intent.id, "payment marked voided from provider event");
        }
        Ok(())
    }

    async fn on_charge_refunded(&self, event: &StripeEvent) -> Result<(), String> {
        let charge: ChargeEventObject = serde_json::from_value(event.data.object.clone())
            .map_err(|e| format!("failed to parse Charge: {e}"))?;
        debug!(
            charge_id = %charge.id,
            intent_id = ?charge.payment_intent,
            "syncing refunds from charge event"
        );

        let refunds = charge.refunds.map(|r| r.data).unwrap_or_default();
        for refund in refunds {
            let status = match refund.status.as_str() {
                "pending" => RefundStatus::Pending,
                "succeeded" => RefundStatus::Succeeded,
                "failed" => RefundStatus::Failed,
                other => {
                    warn!(refund_id = %refund.id, status = %other, "unknown refund status in event");
                    continue;
                }
            };
            let synced = self
                .db
                .set_refund_status(&refund.id, status, refund.failure_reason.as_deref())
                .await
                .map_err(|e| e.to_string())?;
            if synced {
                info!(refund_id = %refund.id, status = status.as_str(), "refund status synced");
            } else {
                debug!(refund_id = %refund.id, "refund event for unknown local row");
            }
        }
        Ok(())
    }

    async fn on_dispute_created(&self, event: &StripeEvent) -> Result<(), String> {
        // no automatic state change; money movement waits on the dispute
        error!(
            target: "alert",
            event_id = %event.id,
            object = %event.data.object,
            "chargeback dispute opened"
        );
        payment_counter_inc!("webhook.dispute");
        Ok(())
    }

    // ---- platform events ---------------------------------------------------

    /// Dispatch a verified Shopify webhook by topic. Same swallow policy.
    pub async fn process_shopify_event(&self, topic: &str, shop_domain: &str, payload: &[u8]) {
        debug!(topic = %topic, shop = %shop_domain, "processing platform event");

        let result = match topic {
            "app/uninstalled" => self.on_uninstalled(shop_domain).await,
            "orders/create" | "orders/refunded" => {
                // advisory only; money state is never driven from order events
                info!(topic = %topic, shop = %shop_domain, "platform order event received");
                Ok(())
            }
            "customers/redact" | "shop/redact" => self.on_redact(shop_domain).await,
            "customers/data_request" => {
                info!(shop = %shop_domain, "customer data request acknowledged");
                Ok(())
            }
            other => {
                info!(topic = %other, "ignoring unsupported platform event");
                let _ = payload;
                Ok(())
            }
        };

        if let Err(e) = result {
            error!(
                target: "alert",
                topic = %topic,
                shop = %shop_domain,
                error = %e,
                "platform event processing failed; replied 200 anyway"
            );
            payment_counter_inc!("webhook.swallowed", "topic" => topic);
        }
    }

    async fn on_uninstalled(&self, shop_domain: &str) -> Result<(), String> {
        let deactivated = self
            .db
            .deactivate_store(shop_domain)
            .await
            .map_err(|e| e.to_string())?;
        if deactivated {
            info!(shop = %shop_domain, "store deactivated on uninstall");
        } else {
            warn!(shop = %shop_domain, "uninstall event for unknown store");
        }
        Ok(())
    }

    /// GDPR redaction: uninstall semantics plus purge of buyer PII.
    async fn on_redact(&self, shop_domain: &str) -> Result<(), String> {
        let store = self
            .db
            .get_store_by_domain(shop_domain)
            .await
            .map_err(|e| e.to_string())?;
        let Some(store) = store else {
            warn!(shop = %shop_domain, "redact event for unknown store");
            return Ok(());
        };

        self.db
            .deactivate_store(shop_domain)
            .await
            .map_err(|e| e.to_string())?;
        let purged = self
            .db
            .purge_customer_fields(store.id)
            .await
            .map_err(|e| e.to_string())?;
        info!(shop = %shop_domain, purged_rows = purged, "customer data redacted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::payments::PaymentStatus;
    use crate::db::refunds::RefundInitiator;
    use crate::db::stores::StoreSettings;
    use crate::db::transactions::CustomerMeta;
    use crate::stripe::types::StripeEventData;

    async fn setup() -> (Database, Reconciler, i64) {
        let db = Database::in_memory().await.unwrap();
        let store = db
            .create_store("w.myshopify.com", "tok", &StoreSettings::default())
            .await
            .unwrap();
        let tx = db
            .create_transaction(store.id, &"w".repeat(32), 15000, "USD", &CustomerMeta::default())
            .await
            .unwrap();
        (db.clone(), Reconciler::new(db), tx.id)
    }

    fn intent_event(event_type: &str, object: serde_json::Value) -> StripeEvent {
        StripeEvent {
            id: "evt_1".to_string(),
            event_type: event_type.to_string(),
            data: StripeEventData { object, previous_attributes: None },
            created: None,
            livemode: Some(false),
        }
    }

    #[tokio::test]
    async fn test_succeeded_event_captures_authorized_payment() {
        let (db, reconciler, tx) = setup().await;
        db.create_payment(tx, "pi_1", 15000).await.unwrap();
        db.mark_payment_authorized("pi_1", None, &Default::default())
            .await
            .unwrap();

        let event = intent_event(
            "payment_intent.succeeded",
            serde_json::json!({"id": "pi_1", "status": "succeeded", "amount": 15000, "currency": "usd"}),
        );
        reconciler.process_stripe_event(&event).await;

        let p = db.get_payment_by_intent("pi_1").await.unwrap().unwrap();
        assert_eq!(p.status(), Some(PaymentStatus::Captured));
    }

    #[tokio::test]
    async fn test_succeeded_event_after_capture_is_idempotent() {
        // the webhook race: complete() already marked captured
        let (db, reconciler, tx) = setup().await;
        db.create_payment(tx, "pi_1", 15000).await.unwrap();
        db.mark_payment_authorized("pi_1", None, &Default::default())
            .await
            .unwrap();
        db.mark_payment_captured("pi_1").await.unwrap();
        let before = db.get_payment_by_intent("pi_1").await.unwrap().unwrap();

        let event = intent_event(
            "payment_intent.succeeded",
            serde_json::json!({"id": "pi_1", "status": "succeeded", "amount": 15000, "currency": "usd"}),
        );
        reconciler.process_stripe_event(&event).await;

        let after = db.get_payment_by_intent("pi_1").await.unwrap().unwrap();
        assert_eq!(after.status(), Some(PaymentStatus::Captured));
        assert_eq!(after.captured_at, before.captured_at);
    }

    #[tokio::test]
    async fn test_failed_event_records_provider_code() {
        let (db, reconciler, tx) = setup().await;
        db.create_payment(tx, "pi_1", 15000).await.unwrap();

        let event = intent_event(
            "payment_intent.payment_failed",
            serde_json::json!({
                "id": "pi_1", "status": "requires_payment_method", "amount": 15000,
                "currency": "usd",
                "last_payment_error": {
                    "type": "card_error", "code": "card_declined",
                    "message": "Your card was declined."
                }
            }),
        );
        reconciler.process_stripe_event(&event).await;

        let p = db.get_payment_by_intent("pi_1").await.unwrap().unwrap();
        assert_eq!(p.status(), Some(PaymentStatus::Failed));
        assert_eq!(p.failure_code.as_deref(), Some("card_declined"));
        assert_eq!(p.failure_message.as_deref(), Some("Your card was declined."));
    }

    #[tokio::test]
    async fn test_canceled_event_voids_removed_card() {
        let (db, reconciler, tx) = setup().await;
        db.create_payment(tx, "pi_1", 15000).await.unwrap();

        let event = intent_event(
            "payment_intent.canceled",
            serde_json::json!({"id": "pi_1", "status": "canceled", "amount": 15000, "currency": "usd"}),
        );
        reconciler.process_stripe_event(&event).await;

        let p = db.get_payment_by_intent("pi_1").await.unwrap().unwrap();
        assert_eq!(p.status(), Some(PaymentStatus::Voided));
        assert!(p.voided_at.is_some());
    }

    #[tokio::test]
    async fn test_charge_refunded_syncs_refund_rows() {
        let (db, reconciler, tx) = setup().await;
        let p = db.create_payment(tx, "pi_1", 15000).await.unwrap();
        db.create_refund(tx, p.id, "re_1", 5000, "requested_by_customer",
            RefundStatus::Pending, RefundInitiator::Admin, None)
            .await
            .unwrap();

        let event = intent_event(
            "charge.refunded",
            serde_json::json!({
                "id": "ch_1", "payment_intent": "pi_1",
                "refunds": {"data": [{"id": "re_1", "status": "succeeded", "amount": 5000}]}
            }),
        );
        reconciler.process_stripe_event(&event).await;

        let row = db.get_refund_by_provider_id("re_1").await.unwrap().unwrap();
        assert_eq!(row.status(), Some(RefundStatus::Succeeded));
    }

    #[tokio::test]
    async fn test_unknown_payment_swallowed() {
        let (_db, reconciler, _tx) = setup().await;
        let event = intent_event(
            "payment_intent.succeeded",
            serde_json::json!({"id": "pi_ghost", "status": "succeeded", "amount": 1, "currency": "usd"}),
        );
        // must not panic or error outward
        reconciler.process_stripe_event(&event).await;
    }

    #[tokio::test]
    async fn test_uninstall_deactivates_store() {
        let (db, reconciler, _tx) = setup().await;
        reconciler
            .process_shopify_event("app/uninstalled", "w.myshopify.com", b"{}")
            .await;
        let store = db.get_store_by_domain("w.myshopify.com").await.unwrap().unwrap();
        assert!(!store.active);
        assert!(store.access_token.is_empty());
    }

    #[tokio::test]
    async fn test_redact_purges_customer_fields() {
        let db = Database::in_memory().await.unwrap();
        let store = db
            .create_store("g.myshopify.com", "tok", &StoreSettings::default())
            .await
            .unwrap();
        let meta = CustomerMeta {
            email: Some("b@example.com".into()),
            ip: Some("203.0.113.9".into()),
            user_agent: Some("widget/1.0".into()),
        };
        let tx = db
            .create_transaction(store.id, &"g".repeat(32), 1000, "USD", &meta)
            .await
            .unwrap();

        let reconciler = Reconciler::new(db.clone());
        reconciler
            .process_shopify_event("customers/redact", "g.myshopify.com", b"{}")
            .await;

        let after = db.get_transaction(tx.id).await.unwrap().unwrap();
        assert!(after.customer_email.is_none());
        let store = db.get_store_by_domain("g.myshopify.com").await.unwrap().unwrap();
        assert!(!store.active);
    }

    #[tokio::test]
    async fn test_order_events_do_not_mutate_state() {
        let (db, reconciler, tx) = setup().await;
        reconciler
            .process_shopify_event("orders/create", "w.myshopify.com", b"{}")
            .await;
        let after = db.get_transaction(tx).await.unwrap().unwrap();
        assert_eq!(after.status, "pending");
    }
}
