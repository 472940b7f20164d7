// Transaction rows: one per checkout attempt.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, QueryBuilder, Sqlite};

use super::{Database, Page};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    PartiallyRefunded,
    Refunded,
}

impl TransactionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Processing => "processing",
            TransactionStatus::Completed => "completed",
            TransactionStatus::Failed => "failed",
            TransactionStatus::PartiallyRefunded => "partially_refunded",
            TransactionStatus::Refunded => "refunded",
        }
    }

    pub fn parse(s: &str) -> Option<TransactionStatus> {
        match s {
            "pending" => Some(TransactionStatus::Pending),
            "processing" => Some(TransactionStatus::Processing),
            "completed" => Some(TransactionStatus::Completed),
            "failed" => Some(TransactionStatus::Failed),
            "partially_refunded" => Some(TransactionStatus::PartiallyRefunded),
            "refunded" => Some(TransactionStatus::Refunded),
            _ => None,
        }
    }

    /// Refundable states: money has been captured and not fully returned.
    pub fn is_refundable(self) -> bool {
        matches!(
            self,
            TransactionStatus::Completed | TransactionStatus::PartiallyRefunded
        )
    }
}

/// Buyer metadata captured at init; purged wholesale on GDPR redaction.
#[derive(Debug, Clone, Default)]
pub struct CustomerMeta {
    pub email: Option<String>,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Transaction {
    pub id: i64,
    pub store_id: i64,
    pub checkout_token: String,
    pub order_id: Option<String>,
    pub order_number: Option<String>,
    pub total_amount_cents: i64,
    pub currency: String,
    pub status: String,
    pub failure_reason: Option<String>,
    pub customer_email: Option<String>,
    pub customer_ip: Option<String>,
    pub customer_user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Transaction {
    pub fn status(&self) -> Option<TransactionStatus> {
        TransactionStatus::parse(&self.status)
    }
}

/// Admin listing filters; page/limit are 1-based and capped by the caller.
#[derive(Debug, Clone, Default)]
pub struct TransactionFilter {
    pub store_id: Option<i64>,
    pub status: Option<TransactionStatus>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
}

/// Per-status rollup for the admin stats endpoint.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct StatusRollup {
    pub status: String,
    pub count: i64,
    pub amount_cents: i64,
}

const TX_COLUMNS: &str = "id, store_id, checkout_token, order_id, order_number, \
     total_amount_cents, currency, status, failure_reason, customer_email, \
     customer_ip, customer_user_agent, created_at, updated_at";

impl Database {
    pub async fn create_transaction(
        &self,
        store_id: i64,
        checkout_token: &str,
        total_amount_cents: i64,
        currency: &str,
        customer: &CustomerMeta,
    ) -> Result<Transaction, sqlx::Error> {
        let now = Utc::now();
        sqlx::query_as::<_, Transaction>(&format!(
            "INSERT INTO transactions
                 (store_id, checkout_token, total_amount_cents, currency, status,
                  customer_email, customer_ip, customer_user_agent, created_at, updated_at)
             VALUES (?, ?, ?, ?, 'pending', ?, ?, ?, ?, ?)
             RETURNING {TX_COLUMNS}"
        ))
        .bind(store_id)
        .bind(checkout_token)
        .bind(total_amount_cents)
        .bind(currency)
        .bind(&customer.email)
        .bind(&customer.ip)
        .bind(&customer.user_agent)
        .bind(now)
        .bind(now)
        .fetch_one(self.pool())
        .await
    }

    pub async fn get_transaction(&self, id: i64) -> Result<Option<Transaction>, sqlx::Error> {
        sqlx::query_as::<_, Transaction>(&format!(
            "SELECT {TX_COLUMNS} FROM transactions WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(self.pool())
        .await
    }

    /// Newest transaction for (store, checkout token) in the given status.
    pub async fn find_transaction_by_checkout(
        &self,
        store_id: i64,
        checkout_token: &str,
        status: TransactionStatus,
    ) -> Result<Option<Transaction>, sqlx::Error> {
        sqlx::query_as::<_, Transaction>(&format!(
            "SELECT {TX_COLUMNS} FROM transactions
             WHERE store_id = ? AND checkout_token = ? AND status = ?
             ORDER BY created_at DESC, id DESC
             LIMIT 1"
        ))
        .bind(store_id)
        .bind(checkout_token)
        .bind(status.as_str())
        .fetch_optional(self.pool())
        .await
    }

    /// The pending -> processing gate. Exactly one concurrent complete() can
    /// win this conditional update; everyone else sees false.
    pub async fn begin_processing(&self, id: i64) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE transactions SET status = 'processing' WHERE id = ? AND status = 'pending'",
        )
        .bind(id)
        .execute(self.pool())
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn set_transaction_status(
        &self,
        id: i64,
        status: TransactionStatus,
        failure_reason: Option<&str>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE transactions SET status = ?, failure_reason = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(failure_reason)
            .bind(id)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    /// Refresh the platform-authoritative total on a reused pending row.
    pub async fn update_transaction_total(
        &self,
        id: i64,
        total_amount_cents: i64,
        currency: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE transactions SET total_amount_cents = ?, currency = ?
             WHERE id = ? AND status = 'pending'",
        )
        .bind(total_amount_cents)
        .bind(currency)
        .bind(id)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    pub async fn set_transaction_order(
        &self,
        id: i64,
        order_id: &str,
        order_number: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE transactions SET order_id = ?, order_number = ? WHERE id = ?")
            .bind(order_id)
            .bind(order_number)
            .bind(id)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    pub async fn list_transactions(
        &self,
        filter: &TransactionFilter,
        page: i64,
        limit: i64,
    ) -> Result<Page<Transaction>, sqlx::Error> {
        let page = page.max(1);
        let limit = limit.clamp(1, 100);

        fn apply_filter<'a>(
            qb: &mut QueryBuilder<'a, Sqlite>,
            filter: &'a TransactionFilter,
        ) {
            qb.push(" WHERE 1=1");
            if let Some(store_id) = filter.store_id {
                qb.push(" AND store_id = ").push_bind(store_id);
            }
            if let Some(status) = filter.status {
                qb.push(" AND status = ").push_bind(status.as_str());
            }
            if let Some(start) = filter.start_date {
                qb.push(" AND created_at >= ").push_bind(start);
            }
            if let Some(end) = filter.end_date {
                qb.push(" AND created_at <= ").push_bind(end);
            }
        }

        let mut count_qb: QueryBuilder<Sqlite> =
            QueryBuilder::new("SELECT COUNT(*) FROM transactions");
        apply_filter(&mut count_qb, filter);
        let (total,): (i64,) = count_qb.build_query_as().fetch_one(self.pool()).await?;

        let mut qb: QueryBuilder<Sqlite> =
            QueryBuilder::new(format!("SELECT {TX_COLUMNS} FROM transactions"));
        apply_filter(&mut qb, filter);
        qb.push(" ORDER BY created_at DESC, id DESC LIMIT ")
            .push_bind(limit)
            .push(" OFFSET ")
            .push_bind((page - 1) * limit);
        let items = qb
            .build_query_as::<Transaction>()
            .fetch_all(self.pool())
            .await?;

        Ok(Page::new(items, total, page, limit))
    }

    /// Captured money with no platform order yet: the crash window the
    /// startup recovery scan walks.
    pub async fn transactions_missing_orders(&self) -> Result<Vec<Transaction>, sqlx::Error> {
        sqlx::query_as::<_, Transaction>(&format!(
            "SELECT {TX_COLUMNS} FROM transactions
             WHERE status = 'completed' AND order_id IS NULL
             ORDER BY created_at ASC"
        ))
        .fetch_all(self.pool())
        .await
    }

    /// GDPR redaction: strip buyer PII, keep the money audit trail.
    pub async fn purge_customer_fields(&self, store_id: i64) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE transactions
             SET customer_email = NULL, customer_ip = NULL, customer_user_agent = NULL
             WHERE store_id = ?",
        )
        .bind(store_id)
        .execute(self.pool())
        .await?;
        Ok(result.rows_affected())
    }

    pub async fn transaction_stats(
        &self,
        store_id: Option<i64>,
    ) -> Result<Vec<StatusRollup>, sqlx::Error> {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT status, COUNT(*) AS count,
                    COALESCE(SUM(total_amount_cents), 0) AS amount_cents
             FROM transactions WHERE 1=1",
        );
        if let Some(store_id) = store_id {
            qb.push(" AND store_id = ").push_bind(store_id);
        }
        qb.push(" GROUP BY status");
        qb.build_query_as::<StatusRollup>()
            .fetch_all(self.pool())
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::stores::StoreSettings;

    async fn seed(db: &Database) -> i64 {
        db.create_store("s.myshopify.com", "tok", &StoreSettings::default())
            .await
            .unwrap()
            .id
    }

    fn token(n: u8) -> String {
        format!("{:032}", n)
    }

    #[tokio::test]
    async fn test_begin_processing_single_winner() {
        let db = Database::in_memory().await.unwrap();
        let store_id = seed(&db).await;
        let tx = db
            .create_transaction(store_id, &token(1), 15000, "USD", &CustomerMeta::default())
            .await
            .unwrap();

        assert!(db.begin_processing(tx.id).await.unwrap());
        // second mover loses the CAS
        assert!(!db.begin_processing(tx.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_find_by_checkout_picks_newest_pending() {
        let db = Database::in_memory().await.unwrap();
        let store_id = seed(&db).await;
        let first = db
            .create_transaction(store_id, &token(2), 1000, "USD", &CustomerMeta::default())
            .await
            .unwrap();
        let second = db
            .create_transaction(store_id, &token(2), 2000, "USD", &CustomerMeta::default())
            .await
            .unwrap();

        let found = db
            .find_transaction_by_checkout(store_id, &token(2), TransactionStatus::Pending)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, second.id);

        db.set_transaction_status(first.id, TransactionStatus::Failed, Some("declined"))
            .await
            .unwrap();
        let completed = db
            .find_transaction_by_checkout(store_id, &token(2), TransactionStatus::Completed)
            .await
            .unwrap();
        assert!(completed.is_none());
    }

    #[tokio::test]
    async fn test_updated_at_trigger_refreshes() {
        let db = Database::in_memory().await.unwrap();
        let store_id = seed(&db).await;
        let tx = db
            .create_transaction(store_id, &token(3), 1000, "USD", &CustomerMeta::default())
            .await
            .unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        db.set_transaction_status(tx.id, TransactionStatus::Processing, None)
            .await
            .unwrap();
        let after = db.get_transaction(tx.id).await.unwrap().unwrap();
        assert!(after.updated_at > tx.updated_at);
    }

    #[tokio::test]
    async fn test_list_transactions_pagination_and_filters() {
        let db = Database::in_memory().await.unwrap();
        let store_id = seed(&db).await;
        for i in 0..5u8 {
            db.create_transaction(store_id, &token(10 + i), 1000, "USD", &CustomerMeta::default())
                .await
                .unwrap();
        }

        let filter = TransactionFilter { store_id: Some(store_id), ..Default::default() };
        let page = db.list_transactions(&filter, 1, 2).await.unwrap();
        assert_eq!(page.total, 5);
        assert_eq!(page.pages, 3);
        assert_eq!(page.items.len(), 2);

        let filter = TransactionFilter {
            status: Some(TransactionStatus::Completed),
            ..Default::default()
        };
        let page = db.list_transactions(&filter, 1, 20).await.unwrap();
        assert_eq!(page.total, 0);
    }

    #[tokio::test]
    async fn test_purge_customer_fields() {
        let db = Database::in_memory().await.unwrap();
        let store_id = seed(&db).await;
        let meta = CustomerMeta {
            email: Some("b@example.com".into()),
            ip: Some("203.0.113.9".into()),
            user_agent: Some("widget/1.0".into()),
        };
        let tx = db
            .create_transaction(store_id, &token(20), 1000, "USD", &meta)
            .await
            .unwrap();

        assert_eq!(db.purge_customer_fields(store_id).await.unwrap(), 1);
        let after = db.get_transaction(tx.id).await.unwrap().unwrap();
        assert!(after.customer_email.is_none());
        assert!(after.customer_ip.is_none());
        assert!(after.customer_user_agent.is_none());
    }
}
