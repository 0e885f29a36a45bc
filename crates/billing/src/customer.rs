//! Stripe customer management

use std::sync::Arc;

use crate::error::{BillingError, BillingResult};
use crate::provider::BillingProvider;
use crate::store::AccountStore;

/// Service for managing billing customers
pub struct CustomerService {
    provider: Arc<dyn BillingProvider>,
    store: Arc<dyn AccountStore>,
}

impl CustomerService {
    pub fn new(provider: Arc<dyn BillingProvider>, store: Arc<dyn AccountStore>) -> Self {
        Self { provider, store }
    }

    /// Return the account's stored customer id, creating and storing one if absent
    pub async fn get_or_create(&self, user_id: &str, email: &str) -> BillingResult<String> {
        let account = self
            .store
            .find_by_id(user_id)
            .await?
            .ok_or_else(|| BillingError::AccountNotFound(user_id.to_string()))?;

        if let Some(customer_id) = account.stripe_customer_id.filter(|id| !id.is_empty()) {
            tracing::debug!(
                user_id = %user_id,
                customer_id = %customer_id,
                "Reusing existing Stripe customer"
            );
            return Ok(customer_id);
        }

        let customer_id = self.provider.create_customer(email, user_id).await?;
        self.store.set_customer_id(user_id, &customer_id).await?;

        tracing::info!(
            user_id = %user_id,
            customer_id = %customer_id,
            "Stored new Stripe customer on account"
        );

        Ok(customer_id)
    }
}
