// Refund rows: one per partial refund operation against one payment.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::Database;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefundStatus {
    Pending,
    Succeeded,
    Failed,
}

impl RefundStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RefundStatus::Pending => "pending",
            RefundStatus::Succeeded => "succeeded",
            RefundStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<RefundStatus> {
        match s {
            "pending" => Some(RefundStatus::Pending),
            "succeeded" => Some(RefundStatus::Succeeded),
            "failed" => Some(RefundStatus::Failed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefundInitiator {
    Admin,
    Webhook,
    Automatic,
}

impl RefundInitiator {
    pub fn as_str(self) -> &'static str {
        match self {
            RefundInitiator::Admin => "admin",
            RefundInitiator::Webhook => "webhook",
            RefundInitiator::Automatic => "automatic",
        }
    }
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct RefundRow {
    pub id: i64,
    pub transaction_id: i64,
    pub payment_id: i64,
    pub provider_refund_id: String,
    pub amount_cents: i64,
    pub reason: String,
    pub status: String,
    pub initiated_by: String,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RefundRow {
    pub fn status(&self) -> Option<RefundStatus> {
        RefundStatus::parse(&self.status)
    }
}

const REFUND_COLUMNS: &str = "id, transaction_id, payment_id, provider_refund_id, amount_cents, \
     reason, status, initiated_by, failure_reason, created_at, updated_at";

impl Database {
    #[allow(clippy::too_many_arguments)]
    pub async fn create_refund(
        &self,
        transaction_id: i64,
        payment_id: i64,
        provider_refund_id: &str,
        amount_cents: i64,
        reason: &str,
        status: RefundStatus,
        initiated_by: RefundInitiator,
        failure_reason: Option<&str>,
    ) -> Result<RefundRow, sqlx::Error> {
        let now = Utc::now();
        sqlx::query_as::<_, RefundRow>(&format!(
            "INSERT INTO refunds
                 (transaction_id, payment_id, provider_refund_id, amount_cents,
                  reason, status, initiated_by, failure_reason, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             RETURNING {REFUND_COLUMNS}"
        ))
        .bind(transaction_id)
        .bind(payment_id)
        .bind(provider_refund_id)
        .bind(amount_cents)
        .bind(reason)
        .bind(status.as_str())
        .bind(initiated_by.as_str())
        .bind(failure_reason)
        .bind(now)
        .bind(now)
        .fetch_one(self.pool())
        .await
    }

    pub async fn get_refund_by_provider_id(
        &self,
        provider_refund_id: &str,
    ) -> Result<Option<RefundRow>, sqlx::Error> {
        sqlx::query_as::<_, RefundRow>(&format!(
            "SELECT {REFUND_COLUMNS} FROM refunds WHERE provider_refund_id = ?"
        ))
        .bind(provider_refund_id)
        .fetch_optional(self.pool())
        .await
    }

    pub async fn set_refund_status(
        &self,
        provider_refund_id: &str,
        status: RefundStatus,
        failure_reason: Option<&str>,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE refunds SET status = ?, failure_reason = ? WHERE provider_refund_id = ?",
        )
        .bind(status.as_str())
        .bind(failure_reason)
        .bind(provider_refund_id)
        .execute(self.pool())
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn list_refunds_for_transaction(
        &self,
        transaction_id: i64,
    ) -> Result<Vec<RefundRow>, sqlx::Error> {
        sqlx::query_as::<_, RefundRow>(&format!(
            "SELECT {REFUND_COLUMNS} FROM refunds WHERE transaction_id = ? ORDER BY id ASC"
        ))
        .bind(transaction_id)
        .fetch_all(self.pool())
        .await
    }

    /// Sum of succeeded refunds against the transaction.
    pub async fn refunded_total(&self, transaction_id: i64) -> Result<i64, sqlx::Error> {
        let (total,): (i64,) = sqlx::query_as(
            "SELECT COALESCE(SUM(amount_cents), 0) FROM refunds
             WHERE transaction_id = ? AND status = 'succeeded'",
        )
        .bind(transaction_id)
        .fetch_one(self.pool())
        .await?;
        Ok(total)
    }

    /// Sum of succeeded refunds against one payment.
    pub async fn refunded_total_for_payment(
        &self,
        payment_id: i64,
    ) -> Result<i64, sqlx::Error> {
        let (total,): (i64,) = sqlx::query_as(
            "SELECT COALESCE(SUM(amount_cents), 0) FROM refunds
             WHERE payment_id = ? AND status = 'succeeded'",
        )
        .bind(payment_id)
        .fetch_one(self.pool())
        .await?;
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::stores::StoreSettings;
    use crate::db::transactions::CustomerMeta;

    async fn seed(db: &Database) -> (i64, i64) {
        let store = db
            .create_store("r.myshopify.com", "tok", &StoreSettings::default())
            .await
            .unwrap();
        let tx = db
            .create_transaction(store.id, &"r".repeat(32), 12000, "USD", &CustomerMeta::default())
            .await
            .unwrap();
        let p = db.create_payment(tx.id, "pi_r1", 8000).await.unwrap();
        (tx.id, p.id)
    }

    #[tokio::test]
    async fn test_refunded_total_counts_succeeded_only() {
        let db = Database::in_memory().await.unwrap();
        let (tx, p) = seed(&db).await;

        db.create_refund(tx, p, "re_1", 2000, "requested_by_customer",
            RefundStatus::Succeeded, RefundInitiator::Admin, None)
            .await
            .unwrap();
        db.create_refund(tx, p, "re_2", 3000, "requested_by_customer",
            RefundStatus::Failed, RefundInitiator::Admin, Some("insufficient balance"))
            .await
            .unwrap();
        db.create_refund(tx, p, "re_3", 1000, "duplicate",
            RefundStatus::Pending, RefundInitiator::Webhook, None)
            .await
            .unwrap();

        assert_eq!(db.refunded_total(tx).await.unwrap(), 2000);
        assert_eq!(db.refunded_total_for_payment(p).await.unwrap(), 2000);
    }

    #[tokio::test]
    async fn test_provider_refund_id_unique() {
        let db = Database::in_memory().await.unwrap();
        let (tx, p) = seed(&db).await;
        db.create_refund(tx, p, "re_dup", 100, "duplicate",
            RefundStatus::Succeeded, RefundInitiator::Admin, None)
            .await
            .unwrap();
        assert!(db
            .create_refund(tx, p, "re_dup", 100, "duplicate",
                RefundStatus::Succeeded, RefundInitiator::Admin, None)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_set_refund_status_by_provider_id() {
        let db = Database::in_memory().await.unwrap();
        let (tx, p) = seed(&db).await;
        db.create_refund(tx, p, "re_sync", 500, "requested_by_customer",
            RefundStatus::Pending, RefundInitiator::Admin, None)
            .await
            .unwrap();

        assert!(db
            .set_refund_status("re_sync", RefundStatus::Succeeded, None)
            .await
            .unwrap());
        let row = db.get_refund_by_provider_id("re_sync").await.unwrap().unwrap();
        assert_eq!(row.status(), Some(RefundStatus::Succeeded));

        assert!(!db
            .set_refund_status("re_missing", RefundStatus::Failed, None)
            .await
            .unwrap());
    }
}
