// Store rows: one per installed merchant. Soft-deleted on uninstall.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::Database;
use crate::validate::{MAX_CARDS, MIN_AMOUNT_CENTS, MIN_CARDS};

/// Recognized keys of the free-form settings map.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoreSettings {
    #[serde(default = "default_max_cards")]
    pub max_cards: usize,
    #[serde(default = "default_min_amount_cents")]
    pub min_amount_cents: i64,
}

fn default_max_cards() -> usize {
    MAX_CARDS
}

fn default_min_amount_cents() -> i64 {
    MIN_AMOUNT_CENTS
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            max_cards: default_max_cards(),
            min_amount_cents: default_min_amount_cents(),
        }
    }
}

impl StoreSettings {
    /// Clamp unrecognized values back into the supported ranges.
    pub fn normalized(mut self) -> Self {
        self.max_cards = self.max_cards.clamp(MIN_CARDS, MAX_CARDS);
        self.min_amount_cents = self.min_amount_cents.max(MIN_AMOUNT_CENTS);
        self
    }
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Store {
    pub id: i64,
    pub shop_domain: String,
    #[serde(skip_serializing)]
    pub access_token: String,
    pub settings: String,
    pub active: bool,
    pub installed_at: Option<DateTime<Utc>>,
    pub uninstalled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Store {
    /// Parsed settings; malformed stored JSON falls back to defaults.
    pub fn settings(&self) -> StoreSettings {
        serde_json::from_str::<StoreSettings>(&self.settings)
            .unwrap_or_default()
            .normalized()
    }
}

const STORE_COLUMNS: &str =
    "id, shop_domain, access_token, settings, active, installed_at, uninstalled_at, created_at, updated_at";

impl Database {
    pub async fn create_store(
        &self,
        shop_domain: &str,
        access_token: &str,
        settings: &StoreSettings,
    ) -> Result<Store, sqlx::Error> {
        let settings_json =
            serde_json::to_string(settings).unwrap_or_else(|_| "{}".to_string());
        let now = Utc::now();
        sqlx::query_as::<_, Store>(&format!(
            "INSERT INTO stores
                 (shop_domain, access_token, settings, active, installed_at,
                  created_at, updated_at)
             VALUES (?, ?, ?, 1, ?, ?, ?)
             RETURNING {STORE_COLUMNS}"
        ))
        .bind(shop_domain)
        .bind(access_token)
        .bind(settings_json)
        .bind(now)
        .bind(now)
        .bind(now)
        .fetch_one(self.pool())
        .await
    }

    pub async fn get_store_by_id(&self, id: i64) -> Result<Option<Store>, sqlx::Error> {
        sqlx::query_as::<_, Store>(&format!(
            "SELECT {STORE_COLUMNS} FROM stores WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(self.pool())
        .await
    }

    pub async fn get_store_by_domain(
        &self,
        shop_domain: &str,
    ) -> Result<Option<Store>, sqlx::Error> {
        sqlx::query_as::<_, Store>(&format!(
            "SELECT {STORE_COLUMNS} FROM stores WHERE shop_domain = ?"
        ))
        .bind(shop_domain)
        .fetch_optional(self.pool())
        .await
    }

    /// Reinstall: flip back to active with a fresh token.
    pub async fn reactivate_store(
        &self,
        shop_domain: &str,
        access_token: &str,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE stores
             SET active = 1, access_token = ?, installed_at = ?, uninstalled_at = NULL
             WHERE shop_domain = ?",
        )
        .bind(access_token)
        .bind(Utc::now())
        .bind(shop_domain)
        .execute(self.pool())
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Uninstall: soft-delete, clear the token so it cannot be replayed.
    pub async fn deactivate_store(&self, shop_domain: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE stores
             SET active = 0, access_token = '', uninstalled_at = ?
             WHERE shop_domain = ?",
        )
        .bind(Utc::now())
        .bind(shop_domain)
        .execute(self.pool())
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn update_store_settings(
        &self,
        shop_domain: &str,
        settings: &StoreSettings,
    ) -> Result<bool, sqlx::Error> {
        let settings_json =
            serde_json::to_string(settings).unwrap_or_else(|_| "{}".to_string());
        let result = sqlx::query("UPDATE stores SET settings = ? WHERE shop_domain = ?")
            .bind(settings_json)
            .bind(shop_domain)
            .execute(self.pool())
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn list_stores(&self) -> Result<Vec<Store>, sqlx::Error> {
        sqlx::query_as::<_, Store>(&format!(
            "SELECT {STORE_COLUMNS} FROM stores ORDER BY created_at DESC"
        ))
        .fetch_all(self.pool())
        .await
    }
}
