//! Billing error types

use thiserror::Error;

/// Billing-specific errors
#[derive(Debug, Error)]
pub enum BillingError {
    #[error("Stripe API error: {0}")]
    StripeApi(String),

    #[error("Webhook signature verification failed")]
    WebhookSignatureInvalid,

    #[error("Webhook signature header is malformed: {0}")]
    WebhookHeaderMalformed(String),

    #[error("Webhook timestamp outside tolerance ({age_secs}s old)")]
    WebhookTimestampExpired { age_secs: i64 },

    #[error("Webhook payload is invalid: {0}")]
    WebhookPayloadInvalid(String),

    #[error("Checkout session {0} has no customer email")]
    MissingCustomerEmail(String),

    #[error("Unknown price id: {0}")]
    UnknownPrice(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Account not found: {0}")]
    AccountNotFound(String),

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl BillingError {
    /// Whether a retry of the same operation could succeed
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            BillingError::Backend(_) | BillingError::Database(_) | BillingError::StripeApi(_)
        )
    }

    /// Whether the error came from authenticating the webhook itself
    pub fn is_authentication(&self) -> bool {
        matches!(
            self,
            BillingError::WebhookSignatureInvalid
                | BillingError::WebhookHeaderMalformed(_)
                | BillingError::WebhookTimestampExpired { .. }
        )
    }
}

impl From<stripe::StripeError> for BillingError {
    fn from(err: stripe::StripeError) -> Self {
        BillingError::StripeApi(err.to_string())
    }
}

impl From<sqlx::Error> for BillingError {
    fn from(err: sqlx::Error) -> Self {
        BillingError::Database(err.to_string())
    }
}

impl From<reqwest::Error> for BillingError {
    fn from(err: reqwest::Error) -> Self {
        BillingError::Backend(err.to_string())
    }
}

impl From<serde_json::Error> for BillingError {
    fn from(err: serde_json::Error) -> Self {
        BillingError::WebhookPayloadInvalid(err.to_string())
    }
}

pub type BillingResult<T> = Result<T, BillingError>;
