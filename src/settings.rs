use figment::{
    providers::{Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct StripeSettings {
    pub secret_key: String,
    #[serde(default)]
    pub public_key: String,
    #[serde(default)]
    pub stripe_version: String,
    #[serde(default = "default_stripe_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default)]
    pub webhook_secret: String,
    #[serde(default = "default_webhook_tolerance_seconds")]
    pub webhook_tolerance_seconds: i64,
}

impl Default for StripeSettings {
    fn default() -> Self {
        Self {
            secret_key: String::new(),
            public_key: String::new(),
            stripe_version: String::new(),
            timeout_ms: default_stripe_timeout_ms(),
            webhook_secret: String::new(),
            webhook_tolerance_seconds: default_webhook_tolerance_seconds(),
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ShopifySettings {
    pub api_key: String,
    pub api_secret: String,
    #[serde(default = "default_shopify_scopes")]
    pub scopes: String,
    #[serde(default = "default_shopify_api_version")]
    pub api_version: String,
    #[serde(default = "default_shopify_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for ShopifySettings {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_secret: String::new(),
            scopes: default_shopify_scopes(),
            api_version: default_shopify_api_version(),
            timeout_ms: default_shopify_timeout_ms(),
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub stripe: StripeSettings,
    #[serde(default)]
    pub shopify: ShopifySettings,
    pub database_url: String,
    #[serde(default = "default_database_max_connections")]
    pub database_max_connections: u32,
    pub server_port: u16,
    #[serde(default)]
    pub app_url: String,
    #[serde(default)]
    pub admin_api_token: String,
    #[serde(default = "default_session_ttl", with = "humantime_serde")]
    pub session_ttl: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            stripe: StripeSettings::default(),
            shopify: ShopifySettings::default(),
            database_url: "sqlite://data/splitpay.db".to_string(),
            database_max_connections: default_database_max_connections(),
            server_port: 3000,
            app_url: String::new(),
            admin_api_token: String::new(),
            session_ttl: default_session_ttl(),
        }
    }
}

impl Config {
    /// Load from config.toml (if present) and environment variables.
    /// Environment variables override file values.
    /// Supported env keys: DATABASE_URL, DATABASE_MAX_CONNECTIONS, PORT,
    /// APP_URL, ADMIN_API_TOKEN, SESSION_TTL, STRIPE_SECRET_KEY,
    /// STRIPE_PUBLIC_KEY, STRIPE_VERSION, STRIPE_TIMEOUT_MS,
    /// STRIPE_WEBHOOK_SECRET, STRIPE_WEBHOOK_TOLERANCE_SECONDS,
    /// SHOPIFY_API_KEY, SHOPIFY_API_SECRET, SHOPIFY_SCOPES,
    /// SHOPIFY_API_VERSION
    pub fn load() -> Self {
        // 1) Start with defaults + config.toml only if it exists
        let base: Config = Default::default();
        let mut fig = Figment::from(Serialized::defaults(base));
        if std::path::Path::new("config.toml").exists() {
            fig = fig.merge(Toml::file("config.toml"));
        }
        let mut cfg: Config = fig.extract().unwrap_or_default();

        // 2) Overlay environment variables explicitly
        if let Ok(v) = std::env::var("DATABASE_URL") {
            cfg.database_url = v;
        }
        if let Ok(v) = std::env::var("DATABASE_MAX_CONNECTIONS") {
            cfg.database_max_connections = v.parse().unwrap_or(cfg.database_max_connections);
        }
        if let Ok(v) = std::env::var("PORT") {
            cfg.server_port = v.parse().unwrap_or(cfg.server_port);
        }
        if let Ok(v) = std::env::var("APP_URL") {
            cfg.app_url = v;
        }
        if let Ok(v) = std::env::var("ADMIN_API_TOKEN") {
            cfg.admin_api_token = v;
        }
        if let Ok(v) = std::env::var("SESSION_TTL") {
            cfg.session_ttl = parse_duration_env(&v, cfg.session_ttl);
        }
        if let Ok(v) = std::env::var("STRIPE_SECRET_KEY") {
            cfg.stripe.secret_key = v;
        }
        if let Ok(v) = std::env::var("STRIPE_PUBLIC_KEY") {
            cfg.stripe.public_key = v;
        }
        if let Ok(v) = std::env::var("STRIPE_VERSION") {
            cfg.stripe.stripe_version = v;
        }
        if let Ok(v) = std::env::var("STRIPE_TIMEOUT_MS") {
            cfg.stripe.timeout_ms = v.parse().unwrap_or(cfg.stripe.timeout_ms);
        }
        if let Ok(v) = std::env::var("STRIPE_WEBHOOK_SECRET") {
            cfg.stripe.webhook_secret = v;
        }
        if let Ok(v) = std::env::var("STRIPE_WEBHOOK_TOLERANCE_SECONDS") {
            cfg.stripe.webhook_tolerance_seconds =
                v.parse().unwrap_or(cfg.stripe.webhook_tolerance_seconds);
        }
        if let Ok(v) = std::env::var("SHOPIFY_API_KEY") {
            cfg.shopify.api_key = v;
        }
        if let Ok(v) = std::env::var("SHOPIFY_API_SECRET") {
            cfg.shopify.api_secret = v;
        }
        if let Ok(v) = std::env::var("SHOPIFY_SCOPES") {
            cfg.shopify.scopes = v;
        }
        if let Ok(v) = std::env::var("SHOPIFY_API_VERSION") {
            cfg.shopify.api_version = v;
        }

        cfg
    }

    pub fn from_env() -> Self {
        Self::load()
    }
}

fn parse_duration_env(value: &str, current: Duration) -> Duration {
    humantime::parse_duration(value).unwrap_or(current)
}

fn default_database_max_connections() -> u32 {
    20
}

fn default_stripe_timeout_ms() -> u64 {
    30_000
}

fn default_webhook_tolerance_seconds() -> i64 {
    300 // 5 minutes
}

fn default_shopify_scopes() -> String {
    "read_checkouts,write_orders".to_string()
}

fn default_shopify_api_version() -> String {
    "2024-01".to_string()
}

fn default_shopify_timeout_ms() -> u64 {
    30_000
}

fn default_session_ttl() -> Duration {
    Duration::from_secs(30 * 60)
}
