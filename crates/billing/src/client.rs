//! Stripe client configuration

use stripe::Client;

/// Default tolerance for the timestamp embedded in webhook signatures
pub const DEFAULT_WEBHOOK_TOLERANCE_SECS: i64 = 300;

/// Configuration for Stripe billing
#[derive(Debug, Clone)]
pub struct StripeConfig {
    /// Stripe secret API key
    pub secret_key: String,
    /// Stripe webhook signing secret
    pub webhook_secret: String,
    /// Price IDs for each paid plan
    pub price_ids: PriceIds,
    /// Base URL for success/cancel redirects
    pub app_base_url: String,
    /// Accepted age of a webhook signature timestamp, in seconds
    pub webhook_tolerance_secs: i64,
}

/// Stripe price IDs for the paid plans
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriceIds {
    pub basic: String,
    pub pro: String,
    pub agency: String,
}

impl Default for PriceIds {
    fn default() -> Self {
        Self {
            basic: "price_basic".to_string(),
            pro: "price_pro".to_string(),
            agency: "price_agency".to_string(),
        }
    }
}

impl PriceIds {
    /// Read price ids from the environment, keeping the defaults for unset variables
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            basic: std::env::var("STRIPE_PRICE_BASIC").unwrap_or(defaults.basic),
            pro: std::env::var("STRIPE_PRICE_PRO").unwrap_or(defaults.pro),
            agency: std::env::var("STRIPE_PRICE_AGENCY").unwrap_or(defaults.agency),
        }
    }
}

/// Stripe billing client
#[derive(Clone)]
pub struct StripeClient {
    client: Client,
    config: StripeConfig,
}

impl StripeClient {
    /// Create a new Stripe client from config
    pub fn new(config: StripeConfig) -> Self {
        let client = Client::new(&config.secret_key);
        Self { client, config }
    }

    /// Get the inner Stripe client
    pub fn inner(&self) -> &Client {
        &self.client
    }

    /// Get the config
    pub fn config(&self) -> &StripeConfig {
        &self.config
    }
}
