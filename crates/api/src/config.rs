//! Application configuration

use std::env;
use std::str::FromStr;

use serpdeck_billing::{PriceIds, StripeConfig, DEFAULT_WEBHOOK_TOLERANCE_SECS};

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    // Server
    pub bind_address: String,
    pub app_base_url: String,
    pub allowed_origins: Vec<String>,

    // Database (ledger and reconciliation queue; in-memory when unset)
    pub database_url: Option<String>,

    // Hosted account backend
    pub supabase_url: String,
    pub supabase_service_role_key: String,
    pub accounts_table: String,

    // Stripe
    pub stripe_secret_key: String,
    pub stripe_webhook_secret: String,
    pub price_ids: PriceIds,
    pub webhook_tolerance_secs: i64,

    // Reconciliation sweep
    pub reconcile_interval_secs: u64,
    pub reconcile_batch_size: i64,
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    match env::var(name) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(ConfigError::Missing(name)),
    }
}

fn parsed_or<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value: raw }),
        Err(_) => Ok(default),
    }
}

fn positive_or(name: &'static str, default: i64) -> Result<i64, ConfigError> {
    let value = parsed_or(name, default)?;
    if value <= 0 {
        return Err(ConfigError::Invalid {
            name,
            value: value.to_string(),
        });
    }
    Ok(value)
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let app_base_url =
            env::var("APP_BASE_URL").unwrap_or_else(|_| "http://localhost:3000".to_string());

        Ok(Self {
            // Server
            bind_address: env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:3000".to_string()),
            allowed_origins: env::var("ALLOWED_ORIGINS")
                .unwrap_or_else(|_| app_base_url.clone())
                .split(',')
                .map(|origin| origin.trim().to_string())
                .filter(|origin| !origin.is_empty())
                .collect(),
            app_base_url,

            // Database
            database_url: env::var("DATABASE_URL").ok().filter(|url| !url.is_empty()),

            // Hosted account backend
            supabase_url: required("SUPABASE_URL")?,
            supabase_service_role_key: required("SUPABASE_SERVICE_ROLE_KEY")?,
            accounts_table: env::var("ACCOUNTS_TABLE").unwrap_or_else(|_| "profiles".to_string()),

            // Stripe
            stripe_secret_key: required("STRIPE_SECRET_KEY")?,
            stripe_webhook_secret: required("STRIPE_WEBHOOK_SECRET")?,
            price_ids: PriceIds::from_env(),
            webhook_tolerance_secs: positive_or(
                "WEBHOOK_TOLERANCE_SECS",
                DEFAULT_WEBHOOK_TOLERANCE_SECS,
            )?,

            // Reconciliation sweep
            reconcile_interval_secs: parsed_or("RECONCILE_INTERVAL_SECS", 60)?,
            reconcile_batch_size: positive_or("RECONCILE_BATCH_SIZE", 25)?,
        })
    }

    /// Stripe settings for the billing crate
    pub fn stripe_config(&self) -> StripeConfig {
        StripeConfig {
            secret_key: self.stripe_secret_key.clone(),
            webhook_secret: self.stripe_webhook_secret.clone(),
            price_ids: self.price_ids.clone(),
            app_base_url: self.app_base_url.clone(),
            webhook_tolerance_secs: self.webhook_tolerance_secs,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),
    #[error("Invalid value for {name}: {value}")]
    Invalid { name: &'static str, value: String },
}
