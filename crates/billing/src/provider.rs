//! Billing provider calls
//!
//! The handful of Stripe API calls the service makes, behind a trait so the
//! webhook handler and checkout flow can run against a recording fake.

use std::collections::HashMap;

use async_trait::async_trait;
use stripe::{
    CheckoutSession, CheckoutSessionId, CheckoutSessionMode, CreateCheckoutSession,
    CreateCheckoutSessionLineItems, CreateCustomer, Customer, CustomerId,
};

use crate::client::StripeClient;
use crate::error::{BillingError, BillingResult};

#[async_trait]
pub trait BillingProvider: Send + Sync {
    /// Price id of the first line item of a checkout session, if it has one
    async fn first_line_item_price(&self, session_id: &str) -> BillingResult<Option<String>>;

    /// Create a billing customer and return its id
    async fn create_customer(&self, email: &str, user_id: &str) -> BillingResult<String>;

    /// Create a subscription checkout session and return its hosted URL
    async fn create_checkout_session(
        &self,
        customer_id: &str,
        price_id: &str,
        user_id: &str,
    ) -> BillingResult<String>;
}

#[async_trait]
impl BillingProvider for StripeClient {
    async fn first_line_item_price(&self, session_id: &str) -> BillingResult<Option<String>> {
        let id = session_id
            .parse::<CheckoutSessionId>()
            .map_err(|e| BillingError::WebhookPayloadInvalid(format!("Invalid session ID: {}", e)))?;

        // Line items are not part of the event payload; they must be expanded
        let session = CheckoutSession::retrieve(self.inner(), &id, &["line_items"]).await?;

        let price_id = session
            .line_items
            .and_then(|items| items.data.into_iter().next())
            .and_then(|item| item.price)
            .map(|price| price.id.to_string());

        tracing::debug!(
            session_id = %session_id,
            price_id = ?price_id,
            "Fetched checkout session line items"
        );

        Ok(price_id)
    }

    async fn create_customer(&self, email: &str, user_id: &str) -> BillingResult<String> {
        let mut metadata = HashMap::new();
        metadata.insert("user_id".to_string(), user_id.to_string());
        metadata.insert("platform".to_string(), "serpdeck".to_string());

        let params = CreateCustomer {
            email: Some(email),
            metadata: Some(metadata),
            ..Default::default()
        };

        let customer = Customer::create(self.inner(), params).await?;

        tracing::info!(
            user_id = %user_id,
            customer_id = %customer.id,
            "Created Stripe customer"
        );

        Ok(customer.id.to_string())
    }

    async fn create_checkout_session(
        &self,
        customer_id: &str,
        price_id: &str,
        user_id: &str,
    ) -> BillingResult<String> {
        let customer_id = customer_id
            .parse::<CustomerId>()
            .map_err(|e| BillingError::StripeApi(format!("Invalid customer ID: {}", e)))?;

        let base_url = &self.config().app_base_url;
        let success_url = format!(
            "{}/billing/success?session_id={{CHECKOUT_SESSION_ID}}",
            base_url
        );
        let cancel_url = format!("{}/billing/cancel", base_url);

        let mut metadata = HashMap::new();
        metadata.insert("user_id".to_string(), user_id.to_string());

        let params = CreateCheckoutSession {
            customer: Some(customer_id),
            mode: Some(CheckoutSessionMode::Subscription),
            line_items: Some(vec![CreateCheckoutSessionLineItems {
                price: Some(price_id.to_string()),
                quantity: Some(1),
                ..Default::default()
            }]),
            success_url: Some(&success_url),
            cancel_url: Some(&cancel_url),
            client_reference_id: Some(user_id),
            metadata: Some(metadata),
            ..Default::default()
        };

        let session = CheckoutSession::create(self.inner(), params).await?;

        tracing::info!(
            user_id = %user_id,
            session_id = %session.id,
            price_id = %price_id,
            "Created checkout session"
        );

        session
            .url
            .ok_or_else(|| BillingError::StripeApi("Checkout session has no URL".to_string()))
    }
}
