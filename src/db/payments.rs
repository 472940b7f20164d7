// Payment rows: one per card in a transaction.
// Every status mark is a guarded UPDATE admitting only the legal prior
// states, so no sequence of orchestrator and reconciler writes can regress
// a payment out of a terminal state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::Database;
use crate::stripe::types::CardSummary;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Authorized,
    Captured,
    Voided,
    Failed,
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Authorized => "authorized",
            PaymentStatus::Captured => "captured",
            PaymentStatus::Voided => "voided",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Refunded => "refunded",
        }
    }

    pub fn parse(s: &str) -> Option<PaymentStatus> {
        match s {
            "pending" => Some(PaymentStatus::Pending),
            "authorized" => Some(PaymentStatus::Authorized),
            "captured" => Some(PaymentStatus::Captured),
            "voided" => Some(PaymentStatus::Voided),
            "failed" => Some(PaymentStatus::Failed),
            "refunded" => Some(PaymentStatus::Refunded),
            _ => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            PaymentStatus::Captured
                | PaymentStatus::Voided
                | PaymentStatus::Failed
                | PaymentStatus::Refunded
        )
    }
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Payment {
    pub id: i64,
    pub transaction_id: i64,
    pub provider_intent_id: String,
    pub provider_method_id: Option<String>,
    pub amount_cents: i64,
    pub card_brand: Option<String>,
    pub card_last_four: Option<String>,
    pub card_exp_month: Option<i64>,
    pub card_exp_year: Option<i64>,
    pub status: String,
    pub failure_code: Option<String>,
    pub failure_message: Option<String>,
    pub authorized_at: Option<DateTime<Utc>>,
    pub captured_at: Option<DateTime<Utc>>,
    pub voided_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Payment {
    pub fn status(&self) -> Option<PaymentStatus> {
        PaymentStatus::parse(&self.status)
    }
}

const PAYMENT_COLUMNS: &str = "id, transaction_id, provider_intent_id, provider_method_id, \
     amount_cents, card_brand, card_last_four, card_exp_month, card_exp_year, \
     status, failure_code, failure_message, authorized_at, captured_at, voided_at, \
     created_at, updated_at";

impl Database {
    pub async fn create_payment(
        &self,
        transaction_id: i64,
        provider_intent_id: &str,
        amount_cents: i64,
    ) -> Result<Payment, sqlx::Error> {
        let now = Utc::now();
        sqlx::query_as::<_, Payment>(&format!(
            "INSERT INTO payments
                 (transaction_id, provider_intent_id, amount_cents, status,
                  created_at, updated_at)
             VALUES (?, ?, ?, 'pending', ?, ?)
             RETURNING {PAYMENT_COLUMNS}"
        ))
        .bind(transaction_id)
        .bind(provider_intent_id)
        .bind(amount_cents)
        .bind(now)
        .bind(now)
        .fetch_one(self.pool())
        .await
    }

    pub async fn get_payment(&self, id: i64) -> Result<Option<Payment>, sqlx::Error> {
        sqlx::query_as::<_, Payment>(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(self.pool())
        .await
    }

    pub async fn get_payment_by_intent(
        &self,
        provider_intent_id: &str,
    ) -> Result<Option<Payment>, sqlx::Error> {
        sqlx::query_as::<_, Payment>(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE provider_intent_id = ?"
        ))
        .bind(provider_intent_id)
        .fetch_optional(self.pool())
        .await
    }

    pub async fn list_payments_for_transaction(
        &self,
        transaction_id: i64,
    ) -> Result<Vec<Payment>, sqlx::Error> {
        sqlx::query_as::<_, Payment>(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE transaction_id = ? ORDER BY id ASC"
        ))
        .bind(transaction_id)
        .fetch_all(self.pool())
        .await
    }

    /// pending -> authorized, recording the method and card identity the
    /// provider revealed at confirm time. Re-marking an authorized row is a
    /// permitted no-op (idempotent confirm).
    pub async fn mark_payment_authorized(
        &self,
        provider_intent_id: &str,
        provider_method_id: Option<&str>,
        card: &CardSummary,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE payments
             SET status = 'authorized',
                 provider_method_id = COALESCE(?, provider_method_id),
                 card_brand = COALESCE(?, card_brand),
                 card_last_four = COALESCE(?, card_last_four),
                 card_exp_month = COALESCE(?, card_exp_month),
                 card_exp_year = COALESCE(?, card_exp_year),
                 authorized_at = ?
             WHERE provider_intent_id = ? AND status IN ('pending', 'authorized')",
        )
        .bind(provider_method_id)
        .bind(&card.brand)
        .bind(&card.last_four)
        .bind(card.exp_month)
        .bind(card.exp_year)
        .bind(Utc::now())
        .bind(provider_intent_id)
        .execute(self.pool())
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// pending|authorized -> captured. The webhook reconciler takes the same
    /// path, so a capture that already landed is a clean no-op.
    pub async fn mark_payment_captured(
        &self,
        provider_intent_id: &str,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE payments
             SET status = 'captured', captured_at = ?
             WHERE provider_intent_id = ? AND status IN ('pending', 'authorized')",
        )
        .bind(Utc::now())
        .bind(provider_intent_id)
        .execute(self.pool())
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// pending|authorized -> voided (compensation or buyer card removal).
    pub async fn mark_payment_voided(
        &self,
        provider_intent_id: &str,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE payments
             SET status = 'voided', voided_at = ?
             WHERE provider_intent_id = ? AND status IN ('pending', 'authorized')",
        )
        .bind(Utc::now())
        .bind(provider_intent_id)
        .execute(self.pool())
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// pending|authorized -> failed with the provider's code and message.
    pub async fn mark_payment_failed(
        &self,
        provider_intent_id: &str,
        failure_code: Option<&str>,
        failure_message: &str,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE payments
             SET status = 'failed', failure_code = ?, failure_message = ?
             WHERE provider_intent_id = ? AND status IN ('pending', 'authorized')",
        )
        .bind(failure_code)
        .bind(failure_message)
        .bind(provider_intent_id)
        .execute(self.pool())
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// captured -> refunded, once succeeded refunds cover the full amount.
    pub async fn mark_payment_refunded(
        &self,
        provider_intent_id: &str,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE payments
             SET status = 'refunded'
             WHERE provider_intent_id = ? AND status = 'captured'",
        )
        .bind(provider_intent_id)
        .execute(self.pool())
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
