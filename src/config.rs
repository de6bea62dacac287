use config::{Config, ConfigError, Environment, File};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use validator::{Validate, ValidationError};

/// Default values for configuration
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 8080;
const CONFIG_DIR: &str = "config";
const DEFAULT_DATABASE_URL: &str = "sqlite::memory:";
const DEFAULT_PAYMENT_API_BASE: &str = "https://api.stripe.com";
const DEFAULT_WEBHOOK_TOLERANCE_SECS: i64 = 300;
const DEFAULT_CART_SWEEP_INTERVAL_SECS: u64 = 3600;

/// Per-site commerce settings.
///
/// `tax_rate` and `shipping_cost` are deliberately `Option`: a configured zero
/// is valid business data and must stay distinguishable from "not configured".
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct SiteSettings {
    /// Display name of the site
    pub name: String,

    /// ISO 4217 currency code
    #[serde(default = "default_currency")]
    pub currency: String,

    /// Tax rate as a decimal fraction (e.g. 0.08 for 8%)
    #[serde(default)]
    pub tax_rate: Option<Decimal>,

    /// Flat shipping cost per order
    #[serde(default)]
    pub shipping_cost: Option<Decimal>,
}

impl Default for SiteSettings {
    fn default() -> Self {
        Self {
            name: "Default storefront".to_string(),
            currency: default_currency(),
            tax_rate: None,
            shipping_cost: None,
        }
    }
}

/// Application configuration structure with validation
#[derive(Clone, Debug, Deserialize, Validate)]
pub struct AppConfig {
    /// Database connection URL
    #[serde(default = "default_database_url")]
    pub database_url: String,

    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Application environment
    #[serde(default = "default_environment")]
    pub environment: String,

    /// Logging level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log in JSON format (structured logging)
    #[serde(default)]
    pub log_json: bool,

    /// Whether to run database migrations on startup
    #[serde(default)]
    pub auto_migrate: bool,

    /// DB pool: max connections
    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,

    /// DB pool: min connections
    #[serde(default = "default_db_min_connections")]
    pub db_min_connections: u32,

    /// CORS: comma-separated list of allowed origins (production)
    #[serde(default)]
    pub cors_allowed_origins: Option<String>,

    /// Payment provider API base URL
    #[serde(default = "default_payment_api_base")]
    pub payment_api_base: String,

    /// Payment provider secret key; payment-intent creation fails without one
    #[serde(default)]
    pub payment_secret_key: Option<String>,

    /// Webhook secret for verifying payment gateway callbacks.
    /// Required: unverified webhook payloads are never processed.
    #[validate(length(min = 16, message = "payment_webhook_secret must be at least 16 characters"))]
    pub payment_webhook_secret: String,

    /// Webhook timestamp tolerance (seconds)
    #[serde(default = "default_webhook_tolerance_secs")]
    pub payment_webhook_tolerance_secs: i64,

    /// Order-confirmation webhook URL (outbound, fired on paid transition)
    #[serde(default)]
    pub order_confirmation_url: Option<String>,

    /// Shared secret for signing outbound order-confirmation payloads
    #[serde(default)]
    pub order_confirmation_secret: Option<String>,

    /// Interval between expired-cart sweeps, in seconds
    #[serde(default = "default_cart_sweep_interval_secs")]
    pub cart_sweep_interval_secs: u64,

    /// Settings for the default site (used when no host matches)
    #[serde(default)]
    #[validate(custom = "validate_site_settings")]
    pub default_site: SiteSettings,

    /// Per-host site settings
    #[serde(default)]
    pub sites: HashMap<String, SiteSettings>,
}

fn default_currency() -> String {
    "USD".to_string()
}
fn default_database_url() -> String {
    DEFAULT_DATABASE_URL.to_string()
}
fn default_host() -> String {
    DEFAULT_HOST.to_string()
}
fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_environment() -> String {
    DEFAULT_ENV.to_string()
}
fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}
fn default_db_max_connections() -> u32 {
    10
}
fn default_db_min_connections() -> u32 {
    1
}
fn default_payment_api_base() -> String {
    DEFAULT_PAYMENT_API_BASE.to_string()
}
fn default_webhook_tolerance_secs() -> i64 {
    DEFAULT_WEBHOOK_TOLERANCE_SECS
}
fn default_cart_sweep_interval_secs() -> u64 {
    DEFAULT_CART_SWEEP_INTERVAL_SECS
}

fn validate_site_settings(site: &SiteSettings) -> Result<(), ValidationError> {
    if let Some(rate) = site.tax_rate {
        if rate < Decimal::ZERO || rate > Decimal::ONE {
            let mut err = ValidationError::new("tax_rate");
            err.message = Some("tax_rate must be between 0.0 and 1.0".into());
            return Err(err);
        }
    }
    if let Some(cost) = site.shipping_cost {
        if cost < Decimal::ZERO {
            let mut err = ValidationError::new("shipping_cost");
            err.message = Some("shipping_cost must not be negative".into());
            return Err(err);
        }
    }
    Ok(())
}

impl AppConfig {
    pub fn is_development(&self) -> bool {
        self.environment == "development" || self.environment == "test"
    }
}

/// Loads configuration from `config/{default,<env>}.toml` plus `APP__`-prefixed
/// environment variables, then validates the result.
pub fn load_config() -> Result<AppConfig, ConfigError> {
    let environment = std::env::var("APP_ENV").unwrap_or_else(|_| DEFAULT_ENV.to_string());

    let cfg = Config::builder()
        .add_source(File::with_name(&format!("{}/default", CONFIG_DIR)).required(false))
        .add_source(File::with_name(&format!("{}/{}", CONFIG_DIR, environment)).required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    let app_config: AppConfig = cfg.try_deserialize()?;

    app_config
        .validate()
        .map_err(|e| ConfigError::Message(format!("invalid configuration: {}", e)))?;

    Ok(app_config)
}

/// Initializes the global tracing subscriber.
pub fn init_tracing(log_level: &str, json: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.to_string()));

    if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn zero_tax_rate_is_valid_and_distinct_from_unset() {
        let zero = SiteSettings {
            tax_rate: Some(Decimal::ZERO),
            ..Default::default()
        };
        let unset = SiteSettings::default();

        assert!(validate_site_settings(&zero).is_ok());
        assert!(zero.tax_rate.is_some());
        assert!(unset.tax_rate.is_none());
    }

    #[test]
    fn out_of_range_tax_rate_rejected() {
        let site = SiteSettings {
            tax_rate: Some(dec!(1.5)),
            ..Default::default()
        };
        assert!(validate_site_settings(&site).is_err());

        let site = SiteSettings {
            tax_rate: Some(dec!(-0.01)),
            ..Default::default()
        };
        assert!(validate_site_settings(&site).is_err());
    }

    #[test]
    fn negative_shipping_rejected() {
        let site = SiteSettings {
            shipping_cost: Some(dec!(-3.00)),
            ..Default::default()
        };
        assert!(validate_site_settings(&site).is_err());
    }
}
