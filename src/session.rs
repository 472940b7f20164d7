// Checkout session cache: short-lived in-process mapping from session id to
// the transaction being built and its pending authorizations.
// Durable writes protect the money; losing a session only loses an in-flight
// checkout.

use rand::RngCore;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::debug;

const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(30 * 60);

/// One pending card authorization held by a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionPayment {
    pub payment_id: i64,
    pub provider_intent_id: String,
    pub amount_cents: i64,
}

#[derive(Debug, Clone)]
pub struct CheckoutSession {
    pub session_id: String,
    pub transaction_id: i64,
    pub shop_domain: String,
    pub checkout_token: String,
    pub payments: Vec<SessionPayment>,
}

struct SessionEntry {
    session: CheckoutSession,
    created_at: Instant,
}

impl SessionEntry {
    fn is_expired(&self, ttl: Duration) -> bool {
        self.created_at.elapsed() > ttl
    }
}

/// Shared session store
pub struct SessionStore {
    sessions: Arc<RwLock<HashMap<String, SessionEntry>>>,
    session_ttl: Duration,
}

impl SessionStore {
    pub fn new() -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            session_ttl: DEFAULT_SESSION_TTL,
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.session_ttl = ttl;
        self
    }

    /// 192 bits from the OS CSPRNG, hex-encoded: unguessable by construction.
    fn generate_id() -> String {
        let mut bytes = [0u8; 24];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        hex::encode(bytes)
    }

    /// Allocate a session for a transaction and return it.
    pub async fn create(
        &self,
        transaction_id: i64,
        shop_domain: String,
        checkout_token: String,
    ) -> CheckoutSession {
        let mut sessions = self.sessions.write().await;

        // Clean up expired sessions opportunistically
        self.cleanup_expired_sessions(&mut sessions);

        let session_id = Self::generate_id();
        let session = CheckoutSession {
            session_id: session_id.clone(),
            transaction_id,
            shop_domain,
            checkout_token,
            payments: Vec::new(),
        };
        debug!(
            session_id = %session_id,
            transaction_id = transaction_id,
            "Registered new checkout session"
        );
        sessions.insert(
            session_id,
            SessionEntry { session: session.clone(), created_at: Instant::now() },
        );
        session
    }

    /// Fetch a live session; expired entries read as not-found.
    pub async fn get(&self, session_id: &str) -> Option<CheckoutSession> {
        let sessions = self.sessions.read().await;
        let entry = sessions.get(session_id)?;
        if entry.is_expired(self.session_ttl) {
            return None;
        }
        Some(entry.session.clone())
    }

    /// Append a pending authorization to a live session.
    pub async fn append_payment(
        &self,
        session_id: &str,
        payment: SessionPayment,
    ) -> Option<CheckoutSession> {
        let mut sessions = self.sessions.write().await;
        let entry = sessions.get_mut(session_id)?;
        if entry.is_expired(self.session_ttl) {
            return None;
        }
        entry.session.payments.push(payment);
        Some(entry.session.clone())
    }

    /// Drop one pending authorization by intent id. False when absent.
    pub async fn remove_payment(&self, session_id: &str, provider_intent_id: &str) -> bool {
        let mut sessions = self.sessions.write().await;
        let entry = match sessions.get_mut(session_id) {
            Some(e) if !e.is_expired(self.session_ttl) => e,
            _ => return false,
        };
        let before = entry.session.payments.len();
        entry
            .session
            .payments
            .retain(|p| p.provider_intent_id != provider_intent_id);
        entry.session.payments.len() < before
    }

    /// Delete the session outright (checkout finished or abandoned).
    pub async fn remove(&self, session_id: &str) {
        let mut sessions = self.sessions.write().await;
        if sessions.remove(session_id).is_some() {
            debug!(session_id = %session_id, "Removed checkout session");
        }
    }

    fn cleanup_expired_sessions(&self, sessions: &mut HashMap<String, SessionEntry>) {
        let expired: Vec<String> = sessions
            .iter()
            .filter(|(_, entry)| entry.is_expired(self.session_ttl))
            .map(|(id, _)| id.clone())
            .collect();

        for id in expired {
            sessions.remove(&id);
            debug!(session_id = %id, "Cleaned up expired checkout session");
        }
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payment(id: i64, intent: &str, amount: i64) -> SessionPayment {
        SessionPayment {
            payment_id: id,
            provider_intent_id: intent.to_string(),
            amount_cents: amount,
        }
    }

    #[tokio::test]
    async fn test_create_and_append() {
        let store = SessionStore::new();
        let session = store.create(1, "s.myshopify.com".into(), "tok".into()).await;
        assert_eq!(session.payments.len(), 0);

        store
            .append_payment(&session.session_id, payment(10, "pi_1", 10000))
            .await
            .unwrap();
        let session = store.get(&session.session_id).await.unwrap();
        assert_eq!(session.payments.len(), 1);
        assert_eq!(session.payments[0].amount_cents, 10000);
    }

    #[tokio::test]
    async fn test_remove_payment_by_intent() {
        let store = SessionStore::new();
        let session = store.create(1, "s.myshopify.com".into(), "tok".into()).await;
        store
            .append_payment(&session.session_id, payment(10, "pi_1", 10000))
            .await
            .unwrap();
        store
            .append_payment(&session.session_id, payment(11, "pi_2", 5000))
            .await
            .unwrap();

        assert!(store.remove_payment(&session.session_id, "pi_1").await);
        assert!(!store.remove_payment(&session.session_id, "pi_1").await);
        let session = store.get(&session.session_id).await.unwrap();
        assert_eq!(session.payments.len(), 1);
        assert_eq!(session.payments[0].provider_intent_id, "pi_2");
    }

    #[tokio::test]
    async fn test_expired_session_reads_not_found() {
        let store = SessionStore::new().with_ttl(Duration::from_millis(50));
        let session = store.create(1, "s.myshopify.com".into(), "tok".into()).await;
        assert!(store.get(&session.session_id).await.is_some());

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(store.get(&session.session_id).await.is_none());
        assert!(store
            .append_payment(&session.session_id, payment(10, "pi_1", 100))
            .await
            .is_none());

        // cleanup sweep runs on the next create
        store.create(2, "s.myshopify.com".into(), "tok2".into()).await;
    }

    #[tokio::test]
    async fn test_session_ids_unique_and_long() {
        let store = SessionStore::new();
        let a = store.create(1, "s.myshopify.com".into(), "t1".into()).await;
        let b = store.create(2, "s.myshopify.com".into(), "t2".into()).await;
        assert_ne!(a.session_id, b.session_id);
        assert_eq!(a.session_id.len(), 48);
    }
}
