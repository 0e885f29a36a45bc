//! Application state

use std::sync::Arc;

use serpdeck_billing::{
    AccountStore, BillingService, EventLedger, InMemoryEventLedger, InMemoryReconciliationQueue,
    PgEventLedger, PgReconciliationQueue, ReconciliationQueue, RestAccountStore, StripeClient,
};
use serpdeck_shared::{create_pool, run_migrations};

use crate::config::Config;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub billing: Arc<BillingService>,
}

impl AppState {
    pub fn new(billing: BillingService) -> Self {
        Self {
            billing: Arc::new(billing),
        }
    }

    /// Wire the billing service from configuration. With `DATABASE_URL` set the
    /// event ledger and reconciliation queue live in Postgres; otherwise in memory.
    pub async fn from_config(config: &Config) -> anyhow::Result<Self> {
        Ok(Self::new(build_billing_service(config).await?))
    }
}

/// Build the billing service shared by the API server and the worker
pub async fn build_billing_service(config: &Config) -> anyhow::Result<BillingService> {
    let store: Arc<dyn AccountStore> = Arc::new(
        RestAccountStore::new(
            reqwest::Client::new(),
            &config.supabase_url,
            &config.supabase_service_role_key,
        )
        .with_table(&config.accounts_table),
    );

    let (ledger, queue): (Arc<dyn EventLedger>, Arc<dyn ReconciliationQueue>) =
        match &config.database_url {
            Some(url) => {
                tracing::info!("Connecting to database...");
                let pool = create_pool(url).await?;
                run_migrations(&pool).await?;
                tracing::info!("Database ready, using persistent event ledger");
                (
                    Arc::new(PgEventLedger::new(pool.clone())),
                    Arc::new(PgReconciliationQueue::new(pool)),
                )
            }
            None => {
                tracing::warn!(
                    "DATABASE_URL not set, event ledger and reconciliation queue are in-memory"
                );
                (
                    Arc::new(InMemoryEventLedger::new()),
                    Arc::new(InMemoryReconciliationQueue::new()),
                )
            }
        };

    let stripe = StripeClient::new(config.stripe_config());
    Ok(BillingService::from_stripe(stripe, store, ledger, queue))
}
