//! Plan catalog
//!
//! The single mapping from a Stripe price id to the entitlement it grants.
//! Built once from configuration and shared by the webhook handler and the
//! checkout service.

use std::collections::HashMap;

use serpdeck_shared::{Entitlement, Plan};

use crate::client::PriceIds;

/// Monthly credit allotment for each paid plan
pub const BASIC_CREDITS: i64 = 2000;
pub const PRO_CREDITS: i64 = 4000;
pub const AGENCY_CREDITS: i64 = 10_000;

#[derive(Debug, Clone)]
pub struct PlanCatalog {
    by_price: HashMap<String, Entitlement>,
}

impl PlanCatalog {
    pub fn new(entries: impl IntoIterator<Item = (String, Entitlement)>) -> Self {
        Self {
            by_price: entries.into_iter().collect(),
        }
    }

    /// Catalog for the configured price ids of the three paid plans
    pub fn from_price_ids(price_ids: &PriceIds) -> Self {
        Self::new([
            (
                price_ids.basic.clone(),
                Entitlement::new(Plan::Basic, BASIC_CREDITS),
            ),
            (
                price_ids.pro.clone(),
                Entitlement::new(Plan::Pro, PRO_CREDITS),
            ),
            (
                price_ids.agency.clone(),
                Entitlement::new(Plan::Agency, AGENCY_CREDITS),
            ),
        ])
    }

    /// Resolve a price id to an entitlement. Never fails: empty or unknown
    /// ids fall back to the free plan.
    pub fn resolve(&self, price_id: &str) -> Entitlement {
        match self.by_price.get(price_id) {
            Some(entitlement) => *entitlement,
            None => {
                if !price_id.is_empty() {
                    tracing::warn!(price_id = %price_id, "Unknown price id, resolving to free plan");
                }
                Entitlement::free()
            }
        }
    }

    /// Whether the price id belongs to a paid plan
    pub fn is_known(&self, price_id: &str) -> bool {
        self.by_price.contains_key(price_id)
    }
}

impl Default for PlanCatalog {
    fn default() -> Self {
        Self::from_price_ids(&PriceIds::default())
    }
}
