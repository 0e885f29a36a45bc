#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! SerpDeck Billing Module
//!
//! Keeps account plans and credit balances in step with Stripe.
//!
//! ## Features
//!
//! - **Webhooks**: Verify signed Stripe events and apply the resulting plan change
//! - **Plan Catalog**: Map price ids to plans and credit allotments
//! - **Idempotency**: Processed-event ledger so redeliveries apply once
//! - **Reconciliation**: Queue failed account writes and re-apply them from the worker
//! - **Checkout**: Create subscription checkout sessions for paid plans

pub mod checkout;
pub mod client;
pub mod customer;
pub mod error;
pub mod events;
pub mod ledger;
pub mod plans;
pub mod provider;
pub mod reconciliation;
pub mod signature;
pub mod store;
pub mod webhooks;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

use std::sync::Arc;

// Checkout
pub use checkout::{CheckoutRequest, CheckoutResponse, CheckoutService};

// Client
pub use client::{PriceIds, StripeClient, StripeConfig, DEFAULT_WEBHOOK_TOLERANCE_SECS};

// Customer
pub use customer::CustomerService;

// Error
pub use error::{BillingError, BillingResult};

// Events
pub use events::{BillingEvent, CheckoutCompleted, SubscriptionChange, WebhookEvent};

// Ledger
pub use ledger::{Claim, EventLedger, InMemoryEventLedger, PgEventLedger};

// Plans
pub use plans::{PlanCatalog, AGENCY_CREDITS, BASIC_CREDITS, PRO_CREDITS};

// Provider
pub use provider::BillingProvider;

// Reconciliation
pub use reconciliation::{
    InMemoryReconciliationQueue, PendingReconciliation, PgReconciliationQueue,
    ReconciliationQueue, ReconciliationSweeper, SweepSummary,
};

// Signature
pub use signature::SIGNATURE_HEADER;

// Store
pub use store::{AccountKey, AccountStore, AccountUpdate, InMemoryAccountStore, RestAccountStore};

// Webhooks
pub use webhooks::{WebhookHandler, WebhookOutcome};

/// The storage and provider seams the billing services run against
#[derive(Clone)]
pub struct BillingBackends {
    pub provider: Arc<dyn BillingProvider>,
    pub store: Arc<dyn AccountStore>,
    pub ledger: Arc<dyn EventLedger>,
    pub queue: Arc<dyn ReconciliationQueue>,
}

impl BillingBackends {
    /// Backends with the ledger and reconciliation queue kept in memory
    pub fn in_memory(provider: Arc<dyn BillingProvider>, store: Arc<dyn AccountStore>) -> Self {
        Self {
            provider,
            store,
            ledger: Arc::new(InMemoryEventLedger::new()),
            queue: Arc::new(InMemoryReconciliationQueue::new()),
        }
    }
}

/// Main billing service that combines all billing functionality
pub struct BillingService {
    pub catalog: Arc<PlanCatalog>,
    pub checkout: CheckoutService,
    pub webhooks: WebhookHandler,
    backends: BillingBackends,
}

impl BillingService {
    /// Create a billing service over explicit backends
    pub fn new(
        backends: BillingBackends,
        catalog: PlanCatalog,
        webhook_secret: &str,
        webhook_tolerance_secs: i64,
    ) -> Self {
        let catalog = Arc::new(catalog);
        let customers = CustomerService::new(backends.provider.clone(), backends.store.clone());

        Self {
            checkout: CheckoutService::new(backends.provider.clone(), customers, catalog.clone()),
            webhooks: WebhookHandler::new(
                backends.provider.clone(),
                backends.store.clone(),
                backends.ledger.clone(),
                backends.queue.clone(),
                catalog.clone(),
                webhook_secret,
            )
            .with_tolerance(webhook_tolerance_secs),
            catalog,
            backends,
        }
    }

    /// Create a billing service talking to Stripe with the given config
    pub fn from_stripe(
        stripe: StripeClient,
        store: Arc<dyn AccountStore>,
        ledger: Arc<dyn EventLedger>,
        queue: Arc<dyn ReconciliationQueue>,
    ) -> Self {
        let config = stripe.config().clone();
        let backends = BillingBackends {
            provider: Arc::new(stripe),
            store,
            ledger,
            queue,
        };

        Self::new(
            backends,
            PlanCatalog::from_price_ids(&config.price_ids),
            &config.webhook_secret,
            config.webhook_tolerance_secs,
        )
    }

    pub fn backends(&self) -> &BillingBackends {
        &self.backends
    }

    /// Sweeper re-applying this service's queued account updates
    pub fn sweeper(&self) -> ReconciliationSweeper {
        ReconciliationSweeper::new(self.backends.store.clone(), self.backends.queue.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingProvider;
    use serpdeck_shared::{Account, Plan};
    use time::OffsetDateTime;

    #[tokio::test]
    async fn test_service_wires_shared_catalog_and_store() {
        let store = Arc::new(InMemoryAccountStore::with_accounts([Account::new(
            "user_1",
            "a@example.com",
        )]));
        let provider = Arc::new(RecordingProvider::new().with_session_price("cs_1", "price_1Basic"));
        let catalog = PlanCatalog::from_price_ids(&PriceIds {
            basic: "price_1Basic".to_string(),
            ..PriceIds::default()
        });
        let service = BillingService::new(
            BillingBackends::in_memory(provider, store.clone()),
            catalog,
            "whsec_test",
            DEFAULT_WEBHOOK_TOLERANCE_SECS,
        );

        let payload = serde_json::to_vec(&serde_json::json!({
            "id": "evt_1",
            "type": "checkout.session.completed",
            "data": { "object": {
                "id": "cs_1",
                "customer_email": "a@example.com"
            }}
        }))
        .unwrap();
        let header = signature::sign(
            &payload,
            "whsec_test",
            OffsetDateTime::now_utc().unix_timestamp(),
        )
        .unwrap();

        service.webhooks.process(&payload, &header).await.unwrap();

        assert_eq!(store.get("user_1").await.unwrap().plan, Plan::Basic);
        assert!(service.catalog.is_known("price_1Basic"));
        assert_eq!(service.sweeper().run_once().await.unwrap(), SweepSummary::default());
    }
}
