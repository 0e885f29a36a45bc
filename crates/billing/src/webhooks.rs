//! Stripe webhook handling
//!
//! Turns a verified billing event into one absolute account update:
//! plan, credits and subscription status are always written together.

use std::sync::Arc;

use serpdeck_shared::SubscriptionStatus;

use crate::client::DEFAULT_WEBHOOK_TOLERANCE_SECS;
use crate::error::BillingResult;
use crate::events::{BillingEvent, CheckoutCompleted, SubscriptionChange, WebhookEvent};
use crate::ledger::{Claim, EventLedger};
use crate::plans::PlanCatalog;
use crate::provider::BillingProvider;
use crate::reconciliation::{PendingReconciliation, ReconciliationQueue};
use crate::signature;
use crate::store::{AccountKey, AccountStore, AccountUpdate};

/// What handling an event did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookOutcome {
    /// The update was written; `rows` is 0 when no account matched
    Applied { rows: u64 },
    /// The event id was already claimed by an earlier delivery
    Duplicate,
    /// Event type that does not affect accounts
    Ignored,
}

/// Webhook handler for Stripe events
pub struct WebhookHandler {
    provider: Arc<dyn BillingProvider>,
    store: Arc<dyn AccountStore>,
    ledger: Arc<dyn EventLedger>,
    queue: Arc<dyn ReconciliationQueue>,
    catalog: Arc<PlanCatalog>,
    webhook_secret: String,
    tolerance_secs: i64,
}

impl WebhookHandler {
    pub fn new(
        provider: Arc<dyn BillingProvider>,
        store: Arc<dyn AccountStore>,
        ledger: Arc<dyn EventLedger>,
        queue: Arc<dyn ReconciliationQueue>,
        catalog: Arc<PlanCatalog>,
        webhook_secret: &str,
    ) -> Self {
        Self {
            provider,
            store,
            ledger,
            queue,
            catalog,
            webhook_secret: webhook_secret.to_string(),
            tolerance_secs: DEFAULT_WEBHOOK_TOLERANCE_SECS,
        }
    }

    pub fn with_tolerance(mut self, tolerance_secs: i64) -> Self {
        self.tolerance_secs = tolerance_secs;
        self
    }

    /// Verify the signature over the raw body, then parse the event
    pub fn verify_event(&self, payload: &[u8], signature: &str) -> BillingResult<WebhookEvent> {
        signature::verify(payload, signature, &self.webhook_secret, self.tolerance_secs)?;
        let event = WebhookEvent::parse(payload)?;

        tracing::debug!(
            event_id = %event.id,
            event_type = %event.event_type,
            "Webhook signature verified"
        );

        Ok(event)
    }

    /// Verify and handle a webhook delivery
    pub async fn process(&self, payload: &[u8], signature: &str) -> BillingResult<WebhookOutcome> {
        let event = self.verify_event(payload, signature)?;
        self.handle_event(&event).await
    }

    /// Handle a verified event.
    ///
    /// The event id is claimed in the ledger first, so a redelivery is
    /// acknowledged without provider calls or writes. A failed apply releases
    /// the claim and returns the error, letting the provider redeliver.
    pub async fn handle_event(&self, event: &WebhookEvent) -> BillingResult<WebhookOutcome> {
        if event.payload == BillingEvent::Ignored {
            tracing::debug!(
                event_id = %event.id,
                event_type = %event.event_type,
                "Ignoring webhook event type"
            );
            return Ok(WebhookOutcome::Ignored);
        }

        match self.ledger.claim(&event.id, &event.event_type).await? {
            Claim::Acquired => {}
            claim => {
                tracing::info!(
                    event_id = %event.id,
                    event_type = %event.event_type,
                    claim = ?claim,
                    "Duplicate webhook event, skipping"
                );
                return Ok(WebhookOutcome::Duplicate);
            }
        }

        tracing::info!(
            event_id = %event.id,
            event_type = %event.event_type,
            "Processing Stripe webhook event"
        );

        match self.apply(event).await {
            Ok(rows) => {
                if let Err(e) = self.ledger.complete(&event.id).await {
                    // The write is absolute, so a later redelivery re-applying it is harmless
                    tracing::warn!(
                        event_id = %event.id,
                        error = %e,
                        "Failed to mark webhook event processed"
                    );
                }
                Ok(WebhookOutcome::Applied { rows })
            }
            Err(e) => {
                tracing::error!(
                    event_id = %event.id,
                    event_type = %event.event_type,
                    error = %e,
                    "Failed to process webhook event"
                );
                if let Err(release_err) = self.ledger.release(&event.id).await {
                    tracing::error!(
                        event_id = %event.id,
                        error = %release_err,
                        "Failed to release webhook event claim"
                    );
                }
                Err(e)
            }
        }
    }

    async fn apply(&self, event: &WebhookEvent) -> BillingResult<u64> {
        match &event.payload {
            BillingEvent::CheckoutCompleted(session) => {
                self.handle_checkout_completed(event, session).await
            }
            BillingEvent::SubscriptionUpdated(change) => {
                self.handle_subscription_updated(event, change).await
            }
            BillingEvent::SubscriptionDeleted(change) => {
                self.handle_subscription_deleted(event, change).await
            }
            BillingEvent::Ignored => Ok(0),
        }
    }

    async fn handle_checkout_completed(
        &self,
        event: &WebhookEvent,
        session: &CheckoutCompleted,
    ) -> BillingResult<u64> {
        let key = session.lookup_key()?;
        let price_id = self
            .provider
            .first_line_item_price(&session.session_id)
            .await?
            .unwrap_or_default();
        let entitlement = self.catalog.resolve(&price_id);

        tracing::info!(
            event_id = %event.id,
            session_id = %session.session_id,
            price_id = %price_id,
            plan = %entitlement.plan,
            "Checkout completed"
        );

        let update =
            AccountUpdate::activate(entitlement).with_customer_id(session.customer_id.clone());
        self.write(event, key, update).await
    }

    async fn handle_subscription_updated(
        &self,
        event: &WebhookEvent,
        change: &SubscriptionChange,
    ) -> BillingResult<u64> {
        let status = SubscriptionStatus::from_provider_status(&change.status);
        let entitlement = self
            .catalog
            .resolve(change.price_id.as_deref().unwrap_or_default());

        tracing::info!(
            event_id = %event.id,
            subscription_id = %change.subscription_id,
            customer_id = %change.customer_id,
            provider_status = %change.status,
            plan = %entitlement.plan,
            "Subscription updated"
        );

        self.write(event, change.lookup_key(), AccountUpdate::new(status, entitlement))
            .await
    }

    async fn handle_subscription_deleted(
        &self,
        event: &WebhookEvent,
        change: &SubscriptionChange,
    ) -> BillingResult<u64> {
        tracing::info!(
            event_id = %event.id,
            subscription_id = %change.subscription_id,
            customer_id = %change.customer_id,
            "Subscription deleted, downgrading to free"
        );

        self.write(event, change.lookup_key(), AccountUpdate::downgrade())
            .await
    }

    /// Write the update. On failure the resolved update is queued for the
    /// reconciliation sweep before the error is returned.
    async fn write(
        &self,
        event: &WebhookEvent,
        key: AccountKey,
        update: AccountUpdate,
    ) -> BillingResult<u64> {
        match self.store.apply_update(&key, &update).await {
            Ok(0) => {
                tracing::warn!(
                    event_id = %event.id,
                    event_type = %event.event_type,
                    key = %key,
                    "No account matched billing event"
                );
                Ok(0)
            }
            Ok(rows) => {
                for key in superseding_keys(&key, &update) {
                    match self.queue.supersede(&key).await {
                        Ok(0) => {}
                        Ok(retired) => tracing::info!(
                            key = %key,
                            retired = retired,
                            "Retired pending updates superseded by this event"
                        ),
                        Err(e) => tracing::warn!(
                            key = %key,
                            error = %e,
                            "Failed to retire superseded pending updates"
                        ),
                    }
                }
                Ok(rows)
            }
            Err(e) => {
                let pending =
                    PendingReconciliation::new(&event.id, &event.event_type, key, update);
                match self.queue.enqueue(&pending).await {
                    Ok(false) => tracing::warn!(
                        event_id = %event.id,
                        key = %pending.key,
                        error = %e,
                        "Account update failed again, already queued for reconciliation"
                    ),
                    Ok(true) => tracing::warn!(
                        event_id = %event.id,
                        marker_id = %pending.id,
                        key = %pending.key,
                        error = %e,
                        "Account update failed, queued for reconciliation"
                    ),
                    Err(queue_err) => tracing::error!(
                        event_id = %event.id,
                        key = %pending.key,
                        error = %e,
                        queue_error = %queue_err,
                        "Account update failed and could not be queued for reconciliation"
                    ),
                }
                Err(e)
            }
        }
    }
}

/// Every key the account written through `key` can be addressed by. A
/// checkout write also stores the customer id, so markers queued under
/// either key are stale once it succeeds.
fn superseding_keys(key: &AccountKey, update: &AccountUpdate) -> Vec<AccountKey> {
    let mut keys = vec![key.clone()];
    if let Some(customer_id) = &update.stripe_customer_id {
        let by_customer = AccountKey::CustomerId(customer_id.clone());
        if by_customer != *key {
            keys.push(by_customer);
        }
    }
    keys
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BillingError;
    use crate::ledger::InMemoryEventLedger;
    use crate::reconciliation::{InMemoryReconciliationQueue, ReconciliationSweeper};
    use crate::store::InMemoryAccountStore;
    use crate::testing::{FailingAccountStore, ProviderCall, RecordingProvider};
    use serde_json::json;
    use serpdeck_shared::{Account, Plan, FREE_CREDITS};
    use time::OffsetDateTime;

    const SECRET: &str = "whsec_test_secret";

    struct Harness {
        handler: WebhookHandler,
        provider: Arc<RecordingProvider>,
        store: Arc<InMemoryAccountStore>,
        ledger: Arc<InMemoryEventLedger>,
        queue: Arc<InMemoryReconciliationQueue>,
    }

    fn harness(provider: RecordingProvider, accounts: Vec<Account>) -> Harness {
        let provider = Arc::new(provider);
        let store = Arc::new(InMemoryAccountStore::with_accounts(accounts));
        let ledger = Arc::new(InMemoryEventLedger::new());
        let queue = Arc::new(InMemoryReconciliationQueue::new());
        let handler = WebhookHandler::new(
            provider.clone(),
            store.clone(),
            ledger.clone(),
            queue.clone(),
            Arc::new(PlanCatalog::default()),
            SECRET,
        );
        Harness {
            handler,
            provider,
            store,
            ledger,
            queue,
        }
    }

    fn checkout_body(event_id: &str, session_id: &str, email: &str) -> Vec<u8> {
        serde_json::to_vec(&json!({
            "id": event_id,
            "type": "checkout.session.completed",
            "created": 1714557600,
            "data": { "object": {
                "id": session_id,
                "customer": "cus_a",
                "customer_details": { "email": email }
            }}
        }))
        .unwrap()
    }

    fn subscription_body(event_id: &str, event_type: &str, status: &str, price: &str) -> Vec<u8> {
        serde_json::to_vec(&json!({
            "id": event_id,
            "type": event_type,
            "data": { "object": {
                "id": "sub_1",
                "customer": "cus_a",
                "status": status,
                "items": { "data": [ { "price": { "id": price } } ] }
            }}
        }))
        .unwrap()
    }

    fn signed(payload: &[u8]) -> String {
        signature::sign(payload, SECRET, OffsetDateTime::now_utc().unix_timestamp()).unwrap()
    }

    fn paid_account(plan: Plan, credits: i64) -> Account {
        let mut account = Account::new("user_1", "a@example.com");
        account.stripe_customer_id = Some("cus_a".to_string());
        account.plan = plan;
        account.credits = credits;
        account.subscription_status = SubscriptionStatus::Active;
        account
    }

    #[tokio::test]
    async fn test_checkout_upgrades_free_account_to_pro() {
        let h = harness(
            RecordingProvider::new().with_session_price("cs_1", "price_pro"),
            vec![Account::new("user_1", "a@example.com")],
        );
        let payload = checkout_body("evt_1", "cs_1", "a@example.com");

        let outcome = h.handler.process(&payload, &signed(&payload)).await.unwrap();

        assert_eq!(outcome, WebhookOutcome::Applied { rows: 1 });
        let account = h.store.get("user_1").await.unwrap();
        assert_eq!(account.plan, Plan::Pro);
        assert_eq!(account.credits, 4000);
        assert_eq!(account.subscription_status, SubscriptionStatus::Active);
        assert_eq!(account.stripe_customer_id.as_deref(), Some("cus_a"));
        assert!(h.ledger.is_processed("evt_1").await);
    }

    #[tokio::test]
    async fn test_checkout_with_unknown_price_activates_free_plan() {
        let h = harness(
            RecordingProvider::new().with_session_price("cs_1", "price_legacy"),
            vec![Account::new("user_1", "a@example.com")],
        );
        let payload = checkout_body("evt_1", "cs_1", "a@example.com");

        h.handler.process(&payload, &signed(&payload)).await.unwrap();

        let account = h.store.get("user_1").await.unwrap();
        assert_eq!(account.plan, Plan::Free);
        assert_eq!(account.credits, FREE_CREDITS);
        assert_eq!(account.subscription_status, SubscriptionStatus::Active);
    }

    #[tokio::test]
    async fn test_replayed_checkout_applies_once() {
        let h = harness(
            RecordingProvider::new().with_session_price("cs_1", "price_pro"),
            vec![Account::new("user_1", "a@example.com")],
        );
        let payload = checkout_body("evt_1", "cs_1", "a@example.com");
        let header = signed(&payload);

        let first = h.handler.process(&payload, &header).await.unwrap();
        let after_first = h.store.get("user_1").await.unwrap();
        let second = h.handler.process(&payload, &header).await.unwrap();

        assert_eq!(first, WebhookOutcome::Applied { rows: 1 });
        assert_eq!(second, WebhookOutcome::Duplicate);
        assert_eq!(h.store.get("user_1").await.unwrap(), after_first);
        assert_eq!(h.store.update_calls(), 1);
        assert_eq!(h.provider.call_count().await, 1);
    }

    #[tokio::test]
    async fn test_subscription_deleted_resets_to_free() {
        for (plan, credits) in [
            (Plan::Basic, 2000),
            (Plan::Pro, 4000),
            (Plan::Agency, 10_000),
        ] {
            let h = harness(RecordingProvider::new(), vec![paid_account(plan, credits)]);
            let payload = subscription_body(
                "evt_del",
                "customer.subscription.deleted",
                "canceled",
                "price_pro",
            );

            h.handler.process(&payload, &signed(&payload)).await.unwrap();

            let account = h.store.get("user_1").await.unwrap();
            assert_eq!(account.plan, Plan::Free);
            assert_eq!(account.credits, FREE_CREDITS);
            assert_eq!(account.subscription_status, SubscriptionStatus::Inactive);
            assert_eq!(h.provider.call_count().await, 0);
        }
    }

    #[tokio::test]
    async fn test_subscription_updated_sets_plan_and_status() {
        let h = harness(RecordingProvider::new(), vec![paid_account(Plan::Basic, 2000)]);

        let payload = subscription_body(
            "evt_up",
            "customer.subscription.updated",
            "active",
            "price_agency",
        );
        h.handler.process(&payload, &signed(&payload)).await.unwrap();
        let account = h.store.get("user_1").await.unwrap();
        assert_eq!(account.plan, Plan::Agency);
        assert_eq!(account.credits, 10_000);
        assert_eq!(account.subscription_status, SubscriptionStatus::Active);

        let payload = subscription_body(
            "evt_past_due",
            "customer.subscription.updated",
            "past_due",
            "price_agency",
        );
        h.handler.process(&payload, &signed(&payload)).await.unwrap();
        let account = h.store.get("user_1").await.unwrap();
        assert_eq!(account.plan, Plan::Agency);
        assert_eq!(account.subscription_status, SubscriptionStatus::Inactive);
    }

    #[tokio::test]
    async fn test_tampered_body_modifies_nothing() {
        let h = harness(
            RecordingProvider::new().with_session_price("cs_1", "price_agency"),
            vec![Account::new("user_1", "a@example.com")],
        );
        let original = checkout_body("evt_1", "cs_1", "someone@example.com");
        let header = signed(&original);
        let tampered = checkout_body("evt_1", "cs_1", "a@example.com");

        let err = h.handler.process(&tampered, &header).await.unwrap_err();

        assert!(err.is_authentication());
        assert_eq!(h.store.update_calls(), 0);
        assert_eq!(h.provider.call_count().await, 0);
        assert_eq!(h.store.get("user_1").await.unwrap().plan, Plan::Free);
    }

    #[tokio::test]
    async fn test_ignored_event_types_skip_ledger_and_store() {
        let h = harness(RecordingProvider::new(), vec![]);
        let payload = serde_json::to_vec(&json!({
            "id": "evt_inv",
            "type": "invoice.paid",
            "data": { "object": { "id": "in_1" } }
        }))
        .unwrap();

        let outcome = h.handler.process(&payload, &signed(&payload)).await.unwrap();

        assert_eq!(outcome, WebhookOutcome::Ignored);
        assert!(!h.ledger.is_processed("evt_inv").await);
        assert_eq!(h.store.update_calls(), 0);
    }

    #[tokio::test]
    async fn test_unmatched_account_is_acknowledged() {
        let h = harness(
            RecordingProvider::new().with_session_price("cs_1", "price_pro"),
            vec![],
        );
        let payload = checkout_body("evt_1", "cs_1", "nobody@example.com");

        let outcome = h.handler.process(&payload, &signed(&payload)).await.unwrap();

        assert_eq!(outcome, WebhookOutcome::Applied { rows: 0 });
        assert!(h.queue.open().await.is_empty());
    }

    #[tokio::test]
    async fn test_checkout_without_email_fails_and_releases_claim() {
        let h = harness(RecordingProvider::new(), vec![]);
        let payload = serde_json::to_vec(&json!({
            "id": "evt_noemail",
            "type": "checkout.session.completed",
            "data": { "object": { "id": "cs_1" } }
        }))
        .unwrap();

        let err = h.handler.process(&payload, &signed(&payload)).await.unwrap_err();

        assert!(matches!(err, BillingError::MissingCustomerEmail(_)));
        assert_eq!(h.provider.call_count().await, 0);
        assert_eq!(
            h.ledger.claim("evt_noemail", "checkout.session.completed").await.unwrap(),
            Claim::Acquired
        );
    }

    #[tokio::test]
    async fn test_provider_failure_releases_claim_for_redelivery() {
        let h = harness(
            RecordingProvider::failing(),
            vec![Account::new("user_1", "a@example.com")],
        );
        let payload = checkout_body("evt_1", "cs_1", "a@example.com");

        assert!(h.handler.process(&payload, &signed(&payload)).await.is_err());
        assert!(h.queue.open().await.is_empty());
        assert!(!h.ledger.is_processed("evt_1").await);
        assert_eq!(h.store.update_calls(), 0);
    }

    #[tokio::test]
    async fn test_failed_update_is_queued_and_swept() {
        let provider = Arc::new(RecordingProvider::new().with_session_price("cs_1", "price_pro"));
        let ledger = Arc::new(InMemoryEventLedger::new());
        let queue = Arc::new(InMemoryReconciliationQueue::new());
        let handler = WebhookHandler::new(
            provider.clone(),
            Arc::new(FailingAccountStore::transient()),
            ledger.clone(),
            queue.clone(),
            Arc::new(PlanCatalog::default()),
            SECRET,
        );
        let payload = checkout_body("evt_1", "cs_1", "a@example.com");

        let err = handler.process(&payload, &signed(&payload)).await.unwrap_err();
        assert!(matches!(err, BillingError::Backend(_)));
        assert!(!ledger.is_processed("evt_1").await);

        let open = queue.open().await;
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].event_id, "evt_1");
        assert_eq!(open[0].key, AccountKey::Email("a@example.com".to_string()));
        assert_eq!(open[0].update.entitlement.plan, Plan::Pro);
        assert_eq!(open[0].update.stripe_customer_id.as_deref(), Some("cus_a"));

        // Backend recovers: the sweep applies the queued update
        let store = Arc::new(InMemoryAccountStore::with_accounts([Account::new(
            "user_1",
            "a@example.com",
        )]));
        let summary = ReconciliationSweeper::new(store.clone(), queue.clone())
            .run_once()
            .await
            .unwrap();
        assert_eq!(summary.applied, 1);
        let account = store.get("user_1").await.unwrap();
        assert_eq!(account.plan, Plan::Pro);
        assert_eq!(account.credits, 4000);
        assert_eq!(provider.calls().await, vec![ProviderCall::FirstLineItemPrice {
            session_id: "cs_1".to_string()
        }]);
    }

    #[tokio::test]
    async fn test_successful_write_supersedes_stale_marker() {
        let h = harness(RecordingProvider::new(), vec![paid_account(Plan::Pro, 4000)]);
        h.queue
            .enqueue(&PendingReconciliation::new(
                "evt_old",
                "customer.subscription.updated",
                AccountKey::CustomerId("cus_a".to_string()),
                AccountUpdate::activate(serpdeck_shared::Entitlement::new(Plan::Pro, 4000)),
            ))
            .await
            .unwrap();

        let payload = subscription_body(
            "evt_del",
            "customer.subscription.deleted",
            "canceled",
            "price_pro",
        );
        h.handler.process(&payload, &signed(&payload)).await.unwrap();

        assert!(h.queue.open().await.is_empty());
        assert_eq!(h.store.get("user_1").await.unwrap().plan, Plan::Free);
    }

    #[tokio::test]
    async fn test_failed_redeliveries_queue_one_marker() {
        let queue = Arc::new(InMemoryReconciliationQueue::new());
        let handler = WebhookHandler::new(
            Arc::new(RecordingProvider::new().with_session_price("cs_1", "price_pro")),
            Arc::new(FailingAccountStore::transient()),
            Arc::new(InMemoryEventLedger::new()),
            queue.clone(),
            Arc::new(PlanCatalog::default()),
            SECRET,
        );
        let payload = checkout_body("evt_1", "cs_1", "a@example.com");

        for _ in 0..3 {
            assert!(handler.process(&payload, &signed(&payload)).await.is_err());
        }

        assert_eq!(queue.open().await.len(), 1);
    }

    #[tokio::test]
    async fn test_deletion_after_failed_checkout_is_not_undone_by_sweep() {
        let provider = Arc::new(RecordingProvider::new().with_session_price("cs_1", "price_pro"));
        let ledger = Arc::new(InMemoryEventLedger::new());
        let queue = Arc::new(InMemoryReconciliationQueue::new());
        let catalog = Arc::new(PlanCatalog::default());

        // Backend down: the checkout is queued under the email key
        let outage = WebhookHandler::new(
            provider.clone(),
            Arc::new(FailingAccountStore::transient()),
            ledger.clone(),
            queue.clone(),
            catalog.clone(),
            SECRET,
        );
        let checkout = checkout_body("evt_checkout", "cs_1", "a@example.com");
        assert!(outage.process(&checkout, &signed(&checkout)).await.is_err());
        assert_eq!(queue.open().await.len(), 1);

        // Backend back: the subscription is deleted, addressed by customer id
        let store = Arc::new(InMemoryAccountStore::with_accounts([paid_account(
            Plan::Pro,
            4000,
        )]));
        let recovered = WebhookHandler::new(
            provider,
            store.clone(),
            ledger,
            queue.clone(),
            catalog,
            SECRET,
        );
        let deleted = subscription_body(
            "evt_del",
            "customer.subscription.deleted",
            "canceled",
            "price_pro",
        );
        recovered.process(&deleted, &signed(&deleted)).await.unwrap();
        assert!(queue.open().await.is_empty());

        let summary = ReconciliationSweeper::new(store.clone(), queue.clone())
            .run_once()
            .await
            .unwrap();

        assert_eq!(summary.fetched, 0);
        let account = store.get("user_1").await.unwrap();
        assert_eq!(account.plan, Plan::Free);
        assert_eq!(account.credits, FREE_CREDITS);
        assert_eq!(account.subscription_status, SubscriptionStatus::Inactive);
    }

    #[test]
    fn test_checkout_write_supersedes_by_email_and_customer_id() {
        let key = AccountKey::Email("a@example.com".to_string());
        let update = AccountUpdate::activate(serpdeck_shared::Entitlement::new(Plan::Pro, 4000))
            .with_customer_id(Some("cus_a".to_string()));
        assert_eq!(
            superseding_keys(&key, &update),
            vec![key.clone(), AccountKey::CustomerId("cus_a".to_string())]
        );

        let by_customer = AccountKey::CustomerId("cus_a".to_string());
        assert_eq!(
            superseding_keys(&by_customer, &update),
            vec![by_customer.clone()]
        );
        assert_eq!(
            superseding_keys(&key, &AccountUpdate::downgrade()),
            vec![key.clone()]
        );
    }
}
