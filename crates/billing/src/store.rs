//! Account store
//!
//! Accounts live in the hosted backend and are reached through its REST
//! endpoint. Rows are created at signup; this crate only updates them.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::json;
use serpdeck_shared::{Account, Entitlement, SubscriptionStatus};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tokio::sync::RwLock;

use crate::error::{BillingError, BillingResult};

/// How an event locates its account. Checkout events carry an email; subscription
/// events only carry the billing-customer id stored on the account.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AccountKey {
    Email(String),
    CustomerId(String),
}

impl AccountKey {
    /// Column used in the equality filter
    pub fn column(&self) -> &'static str {
        match self {
            AccountKey::Email(_) => "email",
            AccountKey::CustomerId(_) => "stripe_customer_id",
        }
    }

    pub fn value(&self) -> &str {
        match self {
            AccountKey::Email(value) | AccountKey::CustomerId(value) => value,
        }
    }

    /// Inverse of [`AccountKey::column`]
    pub fn from_column(column: &str, value: impl Into<String>) -> BillingResult<Self> {
        match column {
            "email" => Ok(AccountKey::Email(value.into())),
            "stripe_customer_id" => Ok(AccountKey::CustomerId(value.into())),
            other => Err(BillingError::Internal(format!(
                "unknown account lookup column: {other}"
            ))),
        }
    }

    fn matches(&self, account: &Account) -> bool {
        match self {
            AccountKey::Email(email) => account.email == *email,
            AccountKey::CustomerId(id) => account.stripe_customer_id.as_deref() == Some(id),
        }
    }
}

impl fmt::Display for AccountKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.column(), self.value())
    }
}

/// The single write a billing event produces. Status, plan and credits are
/// always written together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountUpdate {
    pub subscription_status: SubscriptionStatus,
    pub entitlement: Entitlement,
    /// Set on checkout so later subscription events can find the account
    pub stripe_customer_id: Option<String>,
}

impl AccountUpdate {
    pub fn new(subscription_status: SubscriptionStatus, entitlement: Entitlement) -> Self {
        Self {
            subscription_status,
            entitlement,
            stripe_customer_id: None,
        }
    }

    /// Paid plan after a completed checkout
    pub fn activate(entitlement: Entitlement) -> Self {
        Self::new(SubscriptionStatus::Active, entitlement)
    }

    /// Reset applied when a subscription ends, whatever the previous plan
    pub fn downgrade() -> Self {
        Self::new(SubscriptionStatus::Inactive, Entitlement::free())
    }

    pub fn with_customer_id(mut self, customer_id: Option<String>) -> Self {
        self.stripe_customer_id = customer_id;
        self
    }

    fn apply_to(&self, account: &mut Account, now: OffsetDateTime) {
        account.subscription_status = self.subscription_status;
        account.plan = self.entitlement.plan;
        account.credits = self.entitlement.credits;
        if let Some(customer_id) = &self.stripe_customer_id {
            account.stripe_customer_id = Some(customer_id.clone());
        }
        account.updated_at = Some(now);
    }

    fn to_patch_body(&self, now: OffsetDateTime) -> BillingResult<serde_json::Value> {
        let updated_at = now
            .format(&Rfc3339)
            .map_err(|e| BillingError::Internal(format!("timestamp format: {e}")))?;
        let mut body = json!({
            "subscription_status": self.subscription_status.as_str(),
            "plan": self.entitlement.plan.as_str(),
            "credits": self.entitlement.credits,
            "updated_at": updated_at,
        });
        if let Some(customer_id) = &self.stripe_customer_id {
            body["stripe_customer_id"] = json!(customer_id);
        }
        Ok(body)
    }
}

#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Apply `update` to every account matching `key`; returns the number of rows changed
    async fn apply_update(&self, key: &AccountKey, update: &AccountUpdate) -> BillingResult<u64>;

    async fn find_by_id(&self, user_id: &str) -> BillingResult<Option<Account>>;

    async fn set_customer_id(&self, user_id: &str, customer_id: &str) -> BillingResult<()>;
}

// =============================================================================
// Hosted backend (PostgREST)
// =============================================================================

/// Default table holding account rows
pub const DEFAULT_ACCOUNTS_TABLE: &str = "profiles";

/// Account store backed by the hosted backend's REST endpoint
#[derive(Clone)]
pub struct RestAccountStore {
    http: Client,
    base_url: String,
    service_key: String,
    table: String,
}

impl RestAccountStore {
    pub fn new(http: Client, base_url: &str, service_key: &str) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            service_key: service_key.to_string(),
            table: DEFAULT_ACCOUNTS_TABLE.to_string(),
        }
    }

    pub fn with_table(mut self, table: &str) -> Self {
        self.table = table.to_string();
        self
    }

    fn table_url(&self) -> String {
        format!("{}/rest/v1/{}", self.base_url, self.table)
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request
            .header("apikey", &self.service_key)
            .bearer_auth(&self.service_key)
    }

    async fn error_from(response: reqwest::Response) -> BillingError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        BillingError::Backend(format!("{status}: {body}"))
    }

    async fn patch(&self, column: &str, value: &str, body: serde_json::Value) -> BillingResult<u64> {
        let response = self
            .authorized(self.http.patch(self.table_url()))
            .query(&[(column, format!("eq.{value}"))])
            .header("Prefer", "return=representation")
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::error_from(response).await);
        }

        let rows: Vec<serde_json::Value> = response.json().await?;
        Ok(rows.len() as u64)
    }
}

#[async_trait]
impl AccountStore for RestAccountStore {
    async fn apply_update(&self, key: &AccountKey, update: &AccountUpdate) -> BillingResult<u64> {
        let body = update.to_patch_body(OffsetDateTime::now_utc())?;
        let rows = self.patch(key.column(), key.value(), body).await?;

        tracing::debug!(
            key = %key,
            plan = %update.entitlement.plan,
            credits = update.entitlement.credits,
            status = %update.subscription_status,
            rows = rows,
            "Applied account update"
        );

        Ok(rows)
    }

    async fn find_by_id(&self, user_id: &str) -> BillingResult<Option<Account>> {
        let response = self
            .authorized(self.http.get(self.table_url()))
            .query(&[("id", format!("eq.{user_id}")), ("select", "*".to_string())])
            .send()
            .await?;

        match response.status() {
            status if status.is_success() => {
                let mut rows: Vec<Account> = response.json().await?;
                Ok(if rows.is_empty() {
                    None
                } else {
                    Some(rows.swap_remove(0))
                })
            }
            StatusCode::NOT_FOUND => Ok(None),
            _ => Err(Self::error_from(response).await),
        }
    }

    async fn set_customer_id(&self, user_id: &str, customer_id: &str) -> BillingResult<()> {
        let rows = self
            .patch(
                "id",
                user_id,
                json!({ "stripe_customer_id": customer_id }),
            )
            .await?;

        if rows == 0 {
            return Err(BillingError::AccountNotFound(user_id.to_string()));
        }
        Ok(())
    }
}

// =============================================================================
// In-memory
// =============================================================================

/// Account store kept in process memory, for local development and tests
#[derive(Default)]
pub struct InMemoryAccountStore {
    accounts: RwLock<HashMap<String, Account>>,
    update_calls: AtomicUsize,
}

impl InMemoryAccountStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_accounts(accounts: impl IntoIterator<Item = Account>) -> Self {
        let map = accounts
            .into_iter()
            .map(|account| (account.id.clone(), account))
            .collect();
        Self {
            accounts: RwLock::new(map),
            update_calls: AtomicUsize::new(0),
        }
    }

    pub async fn insert(&self, account: Account) {
        self.accounts
            .write()
            .await
            .insert(account.id.clone(), account);
    }

    pub async fn get(&self, user_id: &str) -> Option<Account> {
        self.accounts.read().await.get(user_id).cloned()
    }

    /// Number of `apply_update` calls received, matched or not
    pub fn update_calls(&self) -> usize {
        self.update_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AccountStore for InMemoryAccountStore {
    async fn apply_update(&self, key: &AccountKey, update: &AccountUpdate) -> BillingResult<u64> {
        self.update_calls.fetch_add(1, Ordering::SeqCst);
        let now = OffsetDateTime::now_utc();
        let mut accounts = self.accounts.write().await;
        let mut rows = 0;
        for account in accounts.values_mut().filter(|account| key.matches(account)) {
            update.apply_to(account, now);
            rows += 1;
        }
        Ok(rows)
    }

    async fn find_by_id(&self, user_id: &str) -> BillingResult<Option<Account>> {
        Ok(self.get(user_id).await)
    }

    async fn set_customer_id(&self, user_id: &str, customer_id: &str) -> BillingResult<()> {
        let mut accounts = self.accounts.write().await;
        let account = accounts
            .get_mut(user_id)
            .ok_or_else(|| BillingError::AccountNotFound(user_id.to_string()))?;
        account.stripe_customer_id = Some(customer_id.to_string());
        account.updated_at = Some(OffsetDateTime::now_utc());
        Ok(())
    }
}
