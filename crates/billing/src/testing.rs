//! Test doubles for the billing provider and account store.
//!
//! Compiled for this crate's tests and, with the `testing` feature, for
//! downstream crates that drive the webhook handler end to end.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use serpdeck_shared::Account;
use tokio::sync::Mutex;

use crate::error::{BillingError, BillingResult};
use crate::provider::BillingProvider;
use crate::store::{AccountKey, AccountStore, AccountUpdate};

// ============================================================================
// RecordingProvider
// ============================================================================

/// A call received by [`RecordingProvider`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderCall {
    FirstLineItemPrice {
        session_id: String,
    },
    CreateCustomer {
        email: String,
        user_id: String,
    },
    CreateCheckoutSession {
        customer_id: String,
        price_id: String,
        user_id: String,
    },
}

/// Billing provider that answers from fixtures and records every call
#[derive(Default)]
pub struct RecordingProvider {
    session_prices: HashMap<String, String>,
    calls: Mutex<Vec<ProviderCall>>,
    fail: bool,
    next_id: AtomicUsize,
}

impl RecordingProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Provider whose every call fails with a Stripe API error
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    /// Make `session_id`'s first line item carry `price_id`
    pub fn with_session_price(mut self, session_id: &str, price_id: &str) -> Self {
        self.session_prices
            .insert(session_id.to_string(), price_id.to_string());
        self
    }

    pub async fn calls(&self) -> Vec<ProviderCall> {
        self.calls.lock().await.clone()
    }

    pub async fn call_count(&self) -> usize {
        self.calls.lock().await.len()
    }

    async fn record(&self, call: ProviderCall) -> BillingResult<()> {
        self.calls.lock().await.push(call);
        if self.fail {
            return Err(BillingError::StripeApi("provider unavailable".to_string()));
        }
        Ok(())
    }

    fn next_id(&self) -> usize {
        self.next_id.fetch_add(1, Ordering::SeqCst) + 1
    }
}

#[async_trait]
impl BillingProvider for RecordingProvider {
    async fn first_line_item_price(&self, session_id: &str) -> BillingResult<Option<String>> {
        self.record(ProviderCall::FirstLineItemPrice {
            session_id: session_id.to_string(),
        })
        .await?;
        Ok(self.session_prices.get(session_id).cloned())
    }

    async fn create_customer(&self, email: &str, user_id: &str) -> BillingResult<String> {
        self.record(ProviderCall::CreateCustomer {
            email: email.to_string(),
            user_id: user_id.to_string(),
        })
        .await?;
        Ok(format!("cus_test_{}", self.next_id()))
    }

    async fn create_checkout_session(
        &self,
        customer_id: &str,
        price_id: &str,
        user_id: &str,
    ) -> BillingResult<String> {
        self.record(ProviderCall::CreateCheckoutSession {
            customer_id: customer_id.to_string(),
            price_id: price_id.to_string(),
            user_id: user_id.to_string(),
        })
        .await?;
        Ok(format!(
            "https://checkout.stripe.com/c/pay/cs_test_{}",
            self.next_id()
        ))
    }
}

// ============================================================================
// FailingAccountStore
// ============================================================================

/// Account store whose writes always fail
pub struct FailingAccountStore {
    transient: bool,
    calls: AtomicUsize,
}

impl FailingAccountStore {
    /// Fails like an unreachable backend
    pub fn transient() -> Self {
        Self {
            transient: true,
            calls: AtomicUsize::new(0),
        }
    }

    /// Fails with an error no retry can fix
    pub fn permanent() -> Self {
        Self {
            transient: false,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn error(&self) -> BillingError {
        if self.transient {
            BillingError::Backend("503 Service Unavailable: backend down".to_string())
        } else {
            BillingError::Internal("account write rejected".to_string())
        }
    }
}

#[async_trait]
impl AccountStore for FailingAccountStore {
    async fn apply_update(&self, _key: &AccountKey, _update: &AccountUpdate) -> BillingResult<u64> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(self.error())
    }

    async fn find_by_id(&self, _user_id: &str) -> BillingResult<Option<Account>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(self.error())
    }

    async fn set_customer_id(&self, _user_id: &str, _customer_id: &str) -> BillingResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(self.error())
    }
}
