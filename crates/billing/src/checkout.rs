//! Stripe Checkout session creation

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::customer::CustomerService;
use crate::error::{BillingError, BillingResult};
use crate::plans::PlanCatalog;
use crate::provider::BillingProvider;

/// Body of a checkout request
#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutRequest {
    pub price_id: String,
    pub user_id: String,
    pub email: String,
}

/// Hosted checkout page to redirect the user to
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct CheckoutResponse {
    pub url: String,
}

pub struct CheckoutService {
    provider: Arc<dyn BillingProvider>,
    customers: CustomerService,
    catalog: Arc<PlanCatalog>,
}

impl CheckoutService {
    pub fn new(
        provider: Arc<dyn BillingProvider>,
        customers: CustomerService,
        catalog: Arc<PlanCatalog>,
    ) -> Self {
        Self {
            provider,
            customers,
            catalog,
        }
    }

    /// Create a subscription checkout session for a paid plan.
    /// The price is validated before any provider call.
    pub async fn create_checkout(&self, request: &CheckoutRequest) -> BillingResult<CheckoutResponse> {
        if request.user_id.trim().is_empty() {
            return Err(BillingError::InvalidRequest("user_id is required".to_string()));
        }
        if request.email.trim().is_empty() {
            return Err(BillingError::InvalidRequest("email is required".to_string()));
        }
        if !self.catalog.is_known(&request.price_id) {
            tracing::warn!(
                user_id = %request.user_id,
                price_id = %request.price_id,
                "Checkout requested for unknown price"
            );
            return Err(BillingError::UnknownPrice(request.price_id.clone()));
        }

        let customer_id = self
            .customers
            .get_or_create(&request.user_id, &request.email)
            .await?;

        let url = self
            .provider
            .create_checkout_session(&customer_id, &request.price_id, &request.user_id)
            .await?;

        tracing::info!(
            user_id = %request.user_id,
            customer_id = %customer_id,
            plan = %self.catalog.resolve(&request.price_id).plan,
            "Checkout session ready"
        );

        Ok(CheckoutResponse { url })
    }
}
