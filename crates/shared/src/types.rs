//! Common types used across SerpDeck

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use time::OffsetDateTime;

use crate::error::SharedError;

// =============================================================================
// Plans
// =============================================================================

/// Credits granted to every account without a paid plan
pub const FREE_CREDITS: i64 = 1000;

/// Subscription plan names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Plan {
    Free,
    Basic,
    Pro,
    Agency,
}

impl Plan {
    pub fn as_str(&self) -> &'static str {
        match self {
            Plan::Free => "free",
            Plan::Basic => "basic",
            Plan::Pro => "pro",
            Plan::Agency => "agency",
        }
    }
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Plan {
    type Err = SharedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "free" => Ok(Plan::Free),
            "basic" => Ok(Plan::Basic),
            "pro" => Ok(Plan::Pro),
            "agency" => Ok(Plan::Agency),
            other => Err(SharedError::UnknownPlan(other.to_string())),
        }
    }
}

// =============================================================================
// Subscription status
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionStatus {
    Active,
    Inactive,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::Inactive => "inactive",
        }
    }

    /// Collapse a billing-provider subscription status into ours.
    /// Only `active` counts; trialing, past_due, unpaid etc. are inactive.
    pub fn from_provider_status(status: &str) -> Self {
        if status == "active" {
            SubscriptionStatus::Active
        } else {
            SubscriptionStatus::Inactive
        }
    }
}

impl fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubscriptionStatus {
    type Err = SharedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(SubscriptionStatus::Active),
            "inactive" => Ok(SubscriptionStatus::Inactive),
            other => Err(SharedError::UnknownStatus(other.to_string())),
        }
    }
}

// =============================================================================
// Entitlement
// =============================================================================

/// Plan name plus the credit allotment that comes with it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entitlement {
    pub plan: Plan,
    pub credits: i64,
}

impl Entitlement {
    pub const fn new(plan: Plan, credits: i64) -> Self {
        Self { plan, credits }
    }

    pub const fn free() -> Self {
        Self::new(Plan::Free, FREE_CREDITS)
    }
}

impl Default for Entitlement {
    fn default() -> Self {
        Self::free()
    }
}

// =============================================================================
// Account
// =============================================================================

/// A user account row as stored by the hosted backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub stripe_customer_id: Option<String>,
    pub subscription_status: SubscriptionStatus,
    pub plan: Plan,
    pub credits: i64,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub updated_at: Option<OffsetDateTime>,
}

impl Account {
    /// A freshly signed-up account: free plan, default credits, no customer yet
    pub fn new(id: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            email: email.into(),
            stripe_customer_id: None,
            subscription_status: SubscriptionStatus::Inactive,
            plan: Plan::Free,
            credits: FREE_CREDITS,
            updated_at: None,
        }
    }

    pub fn entitlement(&self) -> Entitlement {
        Entitlement::new(self.plan, self.credits)
    }
}
