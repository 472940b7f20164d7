// Payment orchestration state machine: init -> add-card -> remove-card ->
// complete (fan-out authorize, all-or-nothing capture, compensating cancel)
// -> proportional refund.
//
// Phase order inside complete() is strict: no capture before every
// authorization reported success, no compensation cancel against an intent
// that never authorized. Within a phase, order is unspecified.

use futures::future::join_all;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::db::payments::{Payment, PaymentStatus};
use crate::db::refunds::{RefundInitiator, RefundStatus};
use crate::db::stores::Store;
use crate::db::transactions::{CustomerMeta, Transaction, TransactionStatus};
use crate::db::Database;
use crate::errors::{FailedCard, ServiceError};
use crate::money;
use crate::payment_counter_inc;
use crate::session::{SessionPayment, SessionStore};
use crate::shopify::types::OrderDraft;
use crate::shopify::CommercePlatform;
use crate::stripe::errors::StripeApiError;
use crate::stripe::types::{ConfirmOutcome, Metadata, ProviderRefundStatus, RefundReason};
use crate::stripe::PaymentGateway;
use crate::validate;

pub struct Orchestrator {
    db: Database,
    gateway: Arc<dyn PaymentGateway>,
    platform: Arc<dyn CommercePlatform>,
    sessions: Arc<SessionStore>,
}

/// What the widget needs to start collecting cards.
#[derive(Debug, Clone)]
pub struct InitOutcome {
    pub session_id: String,
    pub transaction_id: i64,
    pub total_amount: i64,
    pub currency: String,
    pub max_cards: usize,
    pub min_amount: i64,
}

#[derive(Debug, Clone)]
pub struct AddCardOutcome {
    pub payment_intent_id: String,
    pub client_secret: String,
    pub payment_id: i64,
}

/// One card the widget submits to complete(): the intent it created plus the
/// payment method the buyer attached browser-side.
#[derive(Debug, Clone)]
pub struct CardSubmission {
    pub payment_intent_id: String,
    pub payment_method_id: String,
}

#[derive(Debug, Clone)]
pub struct CompleteOutcome {
    pub transaction_id: i64,
    pub order_id: Option<String>,
    pub order_number: Option<String>,
}

/// Per-payment result of one refund operation.
#[derive(Debug, Clone)]
pub struct RefundSplit {
    pub payment_id: i64,
    pub provider_intent_id: String,
    pub amount_cents: i64,
    pub status: RefundStatus,
    pub provider_refund_id: String,
    pub error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RefundSummary {
    pub refunds: Vec<RefundSplit>,
    pub total_refunded: i64,
    pub new_status: TransactionStatus,
}

impl Orchestrator {
    pub fn new(
        db: Database,
        gateway: Arc<dyn PaymentGateway>,
        platform: Arc<dyn CommercePlatform>,
        sessions: Arc<SessionStore>,
    ) -> Self {
        Self { db, gateway, platform, sessions }
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    // ---- init --------------------------------------------------------------

    pub async fn init(
        &self,
        shop_domain: &str,
        checkout_token: &str,
        customer: CustomerMeta,
    ) -> Result<InitOutcome, ServiceError> {
        validate::shop_domain(shop_domain)?;
        validate::checkout_token(checkout_token)?;

        let store = self
            .db
            .get_store_by_domain(shop_domain)
            .await?
            .ok_or(ServiceError::StoreNotFound)?;
        if !store.active {
            return Err(ServiceError::Forbidden("store is not active"));
        }

        if self
            .db
            .find_transaction_by_checkout(store.id, checkout_token, TransactionStatus::Completed)
            .await?
            .is_some()
        {
            return Err(ServiceError::CheckoutFailed(
                "checkout has already been completed".to_string(),
            ));
        }

        // The platform owns the total; the widget is never asked for it.
        let checkout = self
            .platform
            .fetch_checkout(shop_domain, checkout_token, &store.access_token)
            .await?;

        let mut customer = customer;
        if customer.email.is_none() {
            customer.email = checkout.email.clone();
        }
        if let Some(email) = &customer.email {
            if validate::email(email).is_err() {
                customer.email = None;
            }
        }

        let transaction = match self
            .db
            .find_transaction_by_checkout(store.id, checkout_token, TransactionStatus::Pending)
            .await?
        {
            Some(existing) => {
                if existing.total_amount_cents != checkout.total_cents
                    || existing.currency != checkout.currency
                {
                    // cart changed since the last widget load
                    self.db
                        .update_transaction_total(
                            existing.id,
                            checkout.total_cents,
                            &checkout.currency,
                        )
                        .await?;
                }
                self.db
                    .get_transaction(existing.id)
                    .await?
                    .ok_or(ServiceError::TransactionNotFound)?
            }
            None => {
                self.db
                    .create_transaction(
                        store.id,
                        checkout_token,
                        checkout.total_cents,
                        &checkout.currency,
                        &customer,
                    )
                    .await?
            }
        };

        let session = self
            .sessions
            .create(
                transaction.id,
                shop_domain.to_string(),
                checkout_token.to_string(),
            )
            .await;

        let settings = store.settings();
        info!(
            transaction_id = transaction.id,
            shop = %shop_domain,
            total_cents = transaction.total_amount_cents,
            "checkout session initialized"
        );

        Ok(InitOutcome {
            session_id: session.session_id,
            transaction_id: transaction.id,
            total_amount: transaction.total_amount_cents,
            currency: transaction.currency,
            max_cards: settings.max_cards.min(validate::MAX_CARDS),
            min_amount: settings.min_amount_cents,
        })
    }

    // ---- add card ----------------------------------------------------------

    pub async fn add_card(
        &self,
        session_id: &str,
        amount_cents: i64,
    ) -> Result<AddCardOutcome, ServiceError> {
        let session = self
            .sessions
            .get(session_id)
            .await
            .ok_or(ServiceError::SessionNotFound)?;
        let transaction = self
            .db
            .get_transaction(session.transaction_id)
            .await?
            .ok_or(ServiceError::TransactionNotFound)?;
        let store = self
            .db
            .get_store_by_domain(&session.shop_domain)
            .await?
            .ok_or(ServiceError::StoreNotFound)?;
        let settings = store.settings();

        if transaction.status() != Some(TransactionStatus::Pending) {
            return Err(ServiceError::CheckoutFailed(
                "transaction is no longer accepting cards".to_string(),
            ));
        }

        let limit = settings.max_cards.min(validate::MAX_CARDS);
        if session.payments.len() >= limit {
            return Err(ServiceError::TooManyCards(limit));
        }

        let reserved: Vec<i64> = session.payments.iter().map(|p| p.amount_cents).collect();
        let remaining = money::remaining(transaction.total_amount_cents, &reserved);
        validate::amount(amount_cents, settings.min_amount_cents, Some(remaining))?;

        let mut metadata = Metadata::new();
        metadata.insert("transaction_id".to_string(), transaction.id.to_string());
        metadata.insert("card_index".to_string(), session.payments.len().to_string());

        let authorization = self
            .gateway
            .create_authorization(amount_cents, &transaction.currency, &metadata)
            .await?;

        let payment = self
            .db
            .create_payment(transaction.id, &authorization.intent_id, amount_cents)
            .await?;

        self.sessions
            .append_payment(
                session_id,
                SessionPayment {
                    payment_id: payment.id,
                    provider_intent_id: authorization.intent_id.clone(),
                    amount_cents,
                },
            )
            .await
            .ok_or(ServiceError::SessionNotFound)?;

        info!(
            transaction_id = transaction.id,
            payment_id = payment.id,
            amount_cents = amount_cents,
            "card authorization created"
        );

        Ok(AddCardOutcome {
            payment_intent_id: authorization.intent_id,
            client_secret: authorization.client_secret,
            payment_id: payment.id,
        })
    }

    // ---- remove card -------------------------------------------------------

    pub async fn remove_card(
        &self,
        session_id: &str,
        provider_intent_id: &str,
    ) -> Result<(), ServiceError> {
        let session = self
            .sessions
            .get(session_id)
            .await
            .ok_or(ServiceError::SessionNotFound)?;
        if !session
            .payments
            .iter()
            .any(|p| p.provider_intent_id == provider_intent_id)
        {
            return Err(ServiceError::PaymentNotInSession);
        }

        // already-final cancels come back as success from the adapter
        self.gateway.cancel_authorization(provider_intent_id).await?;
        self.sessions.remove_payment(session_id, provider_intent_id).await;

        // the payment row stays for audit; the reconciler flips it to voided
        // when the provider's cancellation event lands
        info!(
            transaction_id = session.transaction_id,
            intent_id = %provider_intent_id,
            "card removed from checkout"
        );
        Ok(())
    }

    // ---- complete ----------------------------------------------------------

    pub async fn complete(
        &self,
        session_id: &str,
        submissions: &[CardSubmission],
    ) -> Result<CompleteOutcome, ServiceError> {
        let session = self
            .sessions
            .get(session_id)
            .await
            .ok_or(ServiceError::SessionNotFound)?;
        let transaction = self
            .db
            .get_transaction(session.transaction_id)
            .await?
            .ok_or(ServiceError::TransactionNotFound)?;
        let store = self
            .db
            .get_store_by_domain(&session.shop_domain)
            .await?
            .ok_or(ServiceError::StoreNotFound)?;
        if !store.active {
            return Err(ServiceError::Forbidden("store is not active"));
        }

        // The submitted list must cover the session's cards exactly.
        for submission in submissions {
            validate::payment_intent_id(&submission.payment_intent_id)?;
            validate::payment_method_id(&submission.payment_method_id)?;
        }
        let submitted: HashSet<&str> = submissions
            .iter()
            .map(|s| s.payment_intent_id.as_str())
            .collect();
        let in_session: HashSet<&str> = session
            .payments
            .iter()
            .map(|p| p.provider_intent_id.as_str())
            .collect();
        if submitted.len() != submissions.len() || submitted != in_session {
            return Err(ServiceError::CheckoutFailed(
                "submitted cards do not match the checkout session".to_string(),
            ));
        }
        let amounts: Vec<i64> = session.payments.iter().map(|p| p.amount_cents).collect();
        validate::payment_amounts(
            transaction.total_amount_cents,
            &amounts,
            store.settings().min_amount_cents,
        )?;

        // CAS gate: exactly one concurrent complete() moves pending->processing.
        if !self.db.begin_processing(transaction.id).await? {
            return Err(ServiceError::CheckoutFailed(
                "checkout is already being processed".to_string(),
            ));
        }

        // Authorize phase: concurrent fan-out, all-settle.
        let authorize_results = self.authorize_all(submissions).await;

        let mut authorized: Vec<&CardSubmission> = Vec::new();
        let mut first_failure: Option<(&CardSubmission, StripeApiError)> = None;
        for (submission, result) in authorize_results {
            match result {
                Ok(outcome) => {
                    self.db
                        .mark_payment_authorized(
                            &submission.payment_intent_id,
                            outcome.method_id.as_deref(),
                            &outcome.card.unwrap_or_default(),
                        )
                        .await?;
                    authorized.push(submission);
                }
                Err(e) => {
                    self.db
                        .mark_payment_failed(
                            &submission.payment_intent_id,
                            e.failure_code().as_deref(),
                            &e.failure_message(),
                        )
                        .await?;
                    if first_failure.is_none() {
                        first_failure = Some((submission, e));
                    }
                }
            }
        }

        if let Some((failed_submission, cause)) = first_failure {
            return Err(self
                .compensate_authorize_failure(&transaction, &authorized, failed_submission, cause)
                .await?);
        }

        // Capture phase: only runs once every authorization reported success.
        let capture_results = self.capture_all(&transaction, &authorized).await;

        let mut uncaptured: Vec<&CardSubmission> = Vec::new();
        let mut capture_failed = false;
        for (submission, result) in capture_results {
            match result {
                Ok(_) => {
                    self.db.mark_payment_captured(&submission.payment_intent_id).await?;
                }
                Err(e) => {
                    capture_failed = true;
                    warn!(
                        transaction_id = transaction.id,
                        intent_id = %submission.payment_intent_id,
                        error = %e,
                        "capture failed after authorization"
                    );
                    uncaptured.push(submission);
                }
            }
        }

        if capture_failed {
            return Err(self
                .handle_partial_capture(&transaction, &uncaptured)
                .await?);
        }

        self.db
            .set_transaction_status(transaction.id, TransactionStatus::Completed, None)
            .await?;
        payment_counter_inc!("checkout.completed", "cards" => submissions.len().to_string().as_str());
        info!(
            transaction_id = transaction.id,
            cards = submissions.len(),
            total_cents = transaction.total_amount_cents,
            "all captures succeeded"
        );

        // Post-capture hand-off. Money is safe either way; a submission
        // failure leaves the transaction completed for the recovery scan.
        let order = self
            .submit_order(&store, &transaction, submissions.len())
            .await;

        self.sessions.remove(session_id).await;

        let (order_id, order_number) = match order {
            Some(o) => (Some(o.0), Some(o.1)),
            None => (None, None),
        };
        Ok(CompleteOutcome {
            transaction_id: transaction.id,
            order_id,
            order_number,
        })
    }

    /// Confirm every submitted card concurrently, treating intents the
    /// provider already holds in an authorized state as confirmed.
    async fn authorize_all<'a>(
        &self,
        submissions: &'a [CardSubmission],
    ) -> Vec<(&'a CardSubmission, Result<ConfirmOutcome, StripeApiError>)> {
        let futures = submissions.iter().map(|submission| {
            let gateway = &self.gateway;
            async move {
                let result = match gateway
                    .retrieve_authorization(&submission.payment_intent_id)
                    .await
                {
                    Ok(outcome) if outcome.status.is_authorized() => Ok(outcome),
                    _ => {
                        gateway
                            .confirm_authorization(
                                &submission.payment_intent_id,
                                &submission.payment_method_id,
                            )
                            .await
                    }
                };
                (submission, result)
            }
        });
        join_all(futures).await
    }

    async fn capture_all<'a>(
        &self,
        transaction: &Transaction,
        authorized: &[&'a CardSubmission],
    ) -> Vec<(&'a CardSubmission, Result<(), StripeApiError>)> {
        let futures = authorized.iter().map(|submission| {
            let gateway = &self.gateway;
            let idempotency_key =
                format!("cap_{}_{}", transaction.id, submission.payment_intent_id);
            async move {
                let result = gateway
                    .capture_authorization(&submission.payment_intent_id, Some(&idempotency_key))
                    .await
                    .map(|_| ());
                (*submission, result)
            }
        });
        join_all(futures).await
    }

    /// Cancel every authorization that succeeded, void them locally, and fail
    /// the transaction with the declining card surfaced to the caller.
    async fn compensate_authorize_failure(
        &self,
        transaction: &Transaction,
        authorized: &[&CardSubmission],
        failed_submission: &CardSubmission,
        cause: StripeApiError,
    ) -> Result<ServiceError, ServiceError> {
        let cancels = authorized.iter().map(|submission| {
            let gateway = &self.gateway;
            async move {
                (
                    submission.payment_intent_id.as_str(),
                    gateway.cancel_authorization(&submission.payment_intent_id).await,
                )
            }
        });
        for (intent_id, result) in join_all(cancels).await {
            match result {
                Ok(()) => {
                    self.db.mark_payment_voided(intent_id).await?;
                }
                Err(e) => {
                    // the reconciler or an operator picks up the orphan hold
                    error!(
                        target: "alert",
                        transaction_id = transaction.id,
                        intent_id = %intent_id,
                        error = %e,
                        "compensation cancel failed; authorization may still be held"
                    );
                }
            }
        }

        let message = cause.failure_message();
        self.db
            .set_transaction_status(
                transaction.id,
                TransactionStatus::Failed,
                Some(&format!("Payment failed: {message}")),
            )
            .await?;
        payment_counter_inc!("checkout.failed", "phase" => "authorize");

        let failed_payment = self
            .db
            .get_payment_by_intent(&failed_submission.payment_intent_id)
            .await?;
        Ok(ServiceError::CardDeclined {
            failed_card: FailedCard {
                payment_intent_id: failed_submission.payment_intent_id.clone(),
                card_brand: failed_payment.as_ref().and_then(|p| p.card_brand.clone()),
                card_last_four: failed_payment.as_ref().and_then(|p| p.card_last_four.clone()),
                message,
            },
        })
    }

    /// Partial-capture anomaly: a subset of captures landed and cannot be
    /// taken back by cancel. Release what is still held, fail the
    /// transaction, and page the operator for manual reversal of the rest.
    async fn handle_partial_capture(
        &self,
        transaction: &Transaction,
        uncaptured: &[&CardSubmission],
    ) -> Result<ServiceError, ServiceError> {
        let cancels = uncaptured.iter().map(|submission| {
            let gateway = &self.gateway;
            async move {
                (
                    submission.payment_intent_id.as_str(),
                    gateway.cancel_authorization(&submission.payment_intent_id).await,
                )
            }
        });
        for (intent_id, result) in join_all(cancels).await {
            match result {
                Ok(()) => {
                    self.db.mark_payment_voided(intent_id).await?;
                }
                Err(e) => {
                    error!(
                        target: "alert",
                        transaction_id = transaction.id,
                        intent_id = %intent_id,
                        error = %e,
                        "best-effort cancel failed during partial-capture cleanup"
                    );
                }
            }
        }

        self.db
            .set_transaction_status(
                transaction.id,
                TransactionStatus::Failed,
                Some("Capture failed after authorization"),
            )
            .await?;
        error!(
            target: "alert",
            transaction_id = transaction.id,
            "partial capture: some cards captured, transaction failed; manual refund required"
        );
        payment_counter_inc!("checkout.failed", "phase" => "capture");

        Ok(ServiceError::CheckoutFailed(
            "Capture failed after authorization".to_string(),
        ))
    }

    /// Record the order with the platform and link it back. Returns None on
    /// failure; the transaction stays completed and the recovery scan retries.
    async fn submit_order(
        &self,
        store: &Store,
        transaction: &Transaction,
        payment_count: usize,
    ) -> Option<(String, String)> {
        let draft = OrderDraft {
            transaction_id: transaction.id,
            total_cents: transaction.total_amount_cents,
            currency: transaction.currency.clone(),
            email: transaction.customer_email.clone(),
            payment_count,
            checkout_token: transaction.checkout_token.clone(),
        };
        match self
            .platform
            .create_order(&store.shop_domain, &store.access_token, &draft)
            .await
        {
            Ok(order) => {
                if let Err(e) = self
                    .db
                    .set_transaction_order(transaction.id, &order.order_id, &order.order_number)
                    .await
                {
                    error!(
                        target: "alert",
                        transaction_id = transaction.id,
                        order_id = %order.order_id,
                        error = %e,
                        "order created but could not be linked to the transaction"
                    );
                }
                Some((order.order_id, order.order_number))
            }
            Err(e) => {
                error!(
                    target: "alert",
                    transaction_id = transaction.id,
                    error = %e,
                    "order submission failed after capture; funds remain captured"
                );
                payment_counter_inc!("order.submission_failed");
                None
            }
        }
    }

    // ---- refund ------------------------------------------------------------

    pub async fn refund(
        &self,
        transaction_id: i64,
        amount_cents: i64,
        reason: RefundReason,
        initiated_by: RefundInitiator,
    ) -> Result<RefundSummary, ServiceError> {
        let transaction = self
            .db
            .get_transaction(transaction_id)
            .await?
            .ok_or(ServiceError::TransactionNotFound)?;
        let status = transaction
            .status()
            .ok_or_else(|| ServiceError::Internal("unknown transaction status".to_string()))?;
        if !status.is_refundable() {
            return Err(ServiceError::CheckoutFailed(format!(
                "transaction in status {} cannot be refunded",
                transaction.status
            )));
        }

        let already_refunded = self.db.refunded_total(transaction_id).await?;
        let remaining = transaction.total_amount_cents - already_refunded;
        if amount_cents <= 0 || amount_cents > remaining {
            return Err(ServiceError::Validation(
                crate::validate::ValidationError::InvalidAmount(format!(
                    "refundable balance is {remaining} cents"
                )),
            ));
        }

        let payments = self
            .db
            .list_payments_for_transaction(transaction_id)
            .await?;
        let captured: Vec<&Payment> = payments
            .iter()
            .filter(|p| p.status() == Some(PaymentStatus::Captured))
            .collect();
        if captured.is_empty() {
            return Err(ServiceError::CheckoutFailed(
                "no captured payments left to refund".to_string(),
            ));
        }

        let weights: Vec<i64> = captured.iter().map(|p| p.amount_cents).collect();
        let splits = money::distribute(amount_cents, &weights);

        let mut results: Vec<RefundSplit> = Vec::new();
        let mut succeeded_now: i64 = 0;
        for (payment, split) in captured.iter().zip(splits) {
            if split == 0 {
                continue;
            }

            let mut metadata = Metadata::new();
            metadata.insert("transaction_id".to_string(), transaction_id.to_string());
            metadata.insert("payment_id".to_string(), payment.id.to_string());

            match self
                .gateway
                .create_refund(&payment.provider_intent_id, split, reason, &metadata)
                .await
            {
                Ok(outcome) => {
                    let status = match outcome.status {
                        ProviderRefundStatus::Pending => RefundStatus::Pending,
                        ProviderRefundStatus::Succeeded => RefundStatus::Succeeded,
                        ProviderRefundStatus::Failed => RefundStatus::Failed,
                    };
                    self.db
                        .create_refund(
                            transaction_id,
                            payment.id,
                            &outcome.refund_id,
                            split,
                            reason.as_str(),
                            status,
                            initiated_by,
                            None,
                        )
                        .await?;
                    if status == RefundStatus::Succeeded {
                        succeeded_now += split;
                        let refunded_for_payment =
                            self.db.refunded_total_for_payment(payment.id).await?;
                        if refunded_for_payment >= payment.amount_cents {
                            self.db
                                .mark_payment_refunded(&payment.provider_intent_id)
                                .await?;
                        }
                    }
                    results.push(RefundSplit {
                        payment_id: payment.id,
                        provider_intent_id: payment.provider_intent_id.clone(),
                        amount_cents: split,
                        status,
                        provider_refund_id: outcome.refund_id,
                        error: None,
                    });
                }
                Err(e) => {
                    // one split failing does not abort the siblings
                    let placeholder = Self::unsent_refund_id();
                    let message = e.failure_message();
                    self.db
                        .create_refund(
                            transaction_id,
                            payment.id,
                            &placeholder,
                            split,
                            reason.as_str(),
                            RefundStatus::Failed,
                            initiated_by,
                            Some(&message),
                        )
                        .await?;
                    warn!(
                        transaction_id = transaction_id,
                        payment_id = payment.id,
                        amount_cents = split,
                        error = %e,
                        "refund split failed"
                    );
                    results.push(RefundSplit {
                        payment_id: payment.id,
                        provider_intent_id: payment.provider_intent_id.clone(),
                        amount_cents: split,
                        status: RefundStatus::Failed,
                        provider_refund_id: placeholder,
                        error: Some(message),
                    });
                }
            }
        }

        // Status advances only on what actually succeeded.
        let total_refunded = already_refunded + succeeded_now;
        let new_status = if succeeded_now > 0 {
            let status = if total_refunded >= transaction.total_amount_cents {
                TransactionStatus::Refunded
            } else {
                TransactionStatus::PartiallyRefunded
            };
            self.db
                .set_transaction_status(transaction_id, status, None)
                .await?;
            status
        } else {
            status
        };

        payment_counter_inc!("refund.processed", "initiated_by" => initiated_by.as_str());
        info!(
            transaction_id = transaction_id,
            amount_cents = amount_cents,
            succeeded_cents = succeeded_now,
            new_status = new_status.as_str(),
            "refund operation finished"
        );

        Ok(RefundSummary {
            refunds: results,
            total_refunded,
            new_status,
        })
    }

    fn unsent_refund_id() -> String {
        use rand::RngCore;
        let mut bytes = [0u8; 12];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        format!("re_unsent_{}", hex::encode(bytes))
    }

    // ---- startup recovery --------------------------------------------------

    /// Walk transactions that captured money but never got an order (crash in
    /// the post-capture window) and retry order creation. Runs at boot.
    pub async fn recover_pending_orders(&self) -> Result<usize, ServiceError> {
        let stranded = self.db.transactions_missing_orders().await?;
        if stranded.is_empty() {
            return Ok(0);
        }
        warn!(count = stranded.len(), "recovering completed transactions without orders");

        let mut recovered = 0usize;
        for transaction in stranded {
            let store = match self.db.get_store_by_id(transaction.store_id).await? {
                Some(s) => s,
                None => continue,
            };
            let payment_count = self
                .db
                .list_payments_for_transaction(transaction.id)
                .await?
                .iter()
                .filter(|p| {
                    matches!(
                        p.status(),
                        Some(PaymentStatus::Captured) | Some(PaymentStatus::Refunded)
                    )
                })
                .count();
            if self
                .submit_order(&store, &transaction, payment_count)
                .await
                .is_some()
            {
                recovered += 1;
            }
        }
        info!(recovered = recovered, "order recovery scan finished");
        Ok(recovered)
    }
}
