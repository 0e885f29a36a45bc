#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! SerpDeck API Library
//!
//! This crate contains the API server components for SerpDeck: the Stripe
//! webhook endpoint, checkout session creation and health checks.

pub mod config;
pub mod error;
pub mod routes;
pub mod state;
pub mod telemetry;

pub use config::{Config, ConfigError};
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use state::{build_billing_service, AppState};
