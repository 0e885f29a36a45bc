//! Billing events
//!
//! Typed view of the Stripe webhook envelope. Only the three event types that
//! change an account are decoded; everything else becomes [`BillingEvent::Ignored`].
//! Parsing is done on our own minimal structs so that Stripe API version
//! drift in unrelated fields never rejects an event.

use serde::Deserialize;
use serde_json::Value;

use crate::error::{BillingError, BillingResult};
use crate::store::AccountKey;

pub const CHECKOUT_SESSION_COMPLETED: &str = "checkout.session.completed";
pub const CUSTOMER_SUBSCRIPTION_UPDATED: &str = "customer.subscription.updated";
pub const CUSTOMER_SUBSCRIPTION_DELETED: &str = "customer.subscription.deleted";

/// A verified webhook event
#[derive(Debug, Clone, PartialEq)]
pub struct WebhookEvent {
    /// Provider event id (`evt_...`), used as the idempotency key
    pub id: String,
    pub event_type: String,
    /// Unix seconds when the provider created the event
    pub created: i64,
    pub payload: BillingEvent,
}

#[derive(Debug, Clone, PartialEq)]
pub enum BillingEvent {
    CheckoutCompleted(CheckoutCompleted),
    SubscriptionUpdated(SubscriptionChange),
    SubscriptionDeleted(SubscriptionChange),
    Ignored,
}

/// Fields of a completed checkout session that reconciliation needs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutCompleted {
    pub session_id: String,
    pub email: Option<String>,
    pub customer_id: Option<String>,
}

/// Fields of a subscription object that reconciliation needs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionChange {
    pub subscription_id: String,
    pub customer_id: String,
    pub status: String,
    /// Price of the first subscription item
    pub price_id: Option<String>,
}

impl CheckoutCompleted {
    /// Checkout events are matched to accounts by email
    pub fn lookup_key(&self) -> BillingResult<AccountKey> {
        self.email
            .as_deref()
            .filter(|email| !email.is_empty())
            .map(|email| AccountKey::Email(email.to_string()))
            .ok_or_else(|| BillingError::MissingCustomerEmail(self.session_id.clone()))
    }
}

impl SubscriptionChange {
    /// Subscription events are matched to accounts by the stored customer id
    pub fn lookup_key(&self) -> AccountKey {
        AccountKey::CustomerId(self.customer_id.clone())
    }
}

// =============================================================================
// Wire format
// =============================================================================

#[derive(Deserialize)]
struct RawEvent {
    id: String,
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default)]
    created: i64,
    data: RawEventData,
}

#[derive(Deserialize)]
struct RawEventData {
    object: Value,
}

/// Stripe sends related objects either as an id or, when expanded, inline
#[derive(Deserialize)]
#[serde(untagged)]
enum IdOrObject {
    Id(String),
    Object { id: String },
}

impl IdOrObject {
    fn into_id(self) -> String {
        match self {
            IdOrObject::Id(id) | IdOrObject::Object { id } => id,
        }
    }
}

#[derive(Deserialize)]
struct RawCheckoutSession {
    id: String,
    #[serde(default)]
    customer: Option<IdOrObject>,
    #[serde(default)]
    customer_email: Option<String>,
    #[serde(default)]
    customer_details: Option<RawCustomerDetails>,
}

#[derive(Deserialize)]
struct RawCustomerDetails {
    #[serde(default)]
    email: Option<String>,
}

#[derive(Deserialize)]
struct RawSubscription {
    id: String,
    customer: IdOrObject,
    status: String,
    #[serde(default)]
    items: Option<RawList<RawSubscriptionItem>>,
}

#[derive(Deserialize)]
struct RawList<T> {
    #[serde(default = "Vec::new")]
    data: Vec<T>,
}

#[derive(Deserialize)]
struct RawSubscriptionItem {
    #[serde(default)]
    price: Option<RawPrice>,
}

#[derive(Deserialize)]
struct RawPrice {
    id: String,
}

impl WebhookEvent {
    /// Parse a webhook body. Call only after the signature has been verified.
    pub fn parse(payload: &[u8]) -> BillingResult<Self> {
        let raw: RawEvent = serde_json::from_slice(payload)?;

        let event = match raw.event_type.as_str() {
            CHECKOUT_SESSION_COMPLETED => {
                let session: RawCheckoutSession = serde_json::from_value(raw.data.object)?;
                let email = session
                    .customer_details
                    .and_then(|details| details.email)
                    .or(session.customer_email);
                BillingEvent::CheckoutCompleted(CheckoutCompleted {
                    session_id: session.id,
                    email,
                    customer_id: session.customer.map(IdOrObject::into_id),
                })
            }
            CUSTOMER_SUBSCRIPTION_UPDATED | CUSTOMER_SUBSCRIPTION_DELETED => {
                let subscription: RawSubscription = serde_json::from_value(raw.data.object)?;
                let price_id = subscription
                    .items
                    .and_then(|items| items.data.into_iter().next())
                    .and_then(|item| item.price)
                    .map(|price| price.id);
                let change = SubscriptionChange {
                    subscription_id: subscription.id,
                    customer_id: subscription.customer.into_id(),
                    status: subscription.status,
                    price_id,
                };
                if raw.event_type == CUSTOMER_SUBSCRIPTION_UPDATED {
                    BillingEvent::SubscriptionUpdated(change)
                } else {
                    BillingEvent::SubscriptionDeleted(change)
                }
            }
            _ => BillingEvent::Ignored,
        };

        Ok(Self {
            id: raw.id,
            event_type: raw.event_type,
            created: raw.created,
            payload: event,
        })
    }
}
