//! API routes

pub mod billing;
pub mod health;

use axum::{
    routing::{get, post},
    Router,
};

use crate::state::AppState;

/// Create all API routes
pub fn create_router(state: AppState) -> Router {
    // Health check routes (at root level for infrastructure monitoring)
    let health_routes = Router::new().route("/health", get(health::health));

    // Stripe webhook (public, uses signature verification)
    let billing_routes = Router::new()
        .route(
            "/billing/webhook",
            post(billing::webhook).fallback(billing::method_not_allowed),
        )
        .route("/billing/checkout", post(billing::create_checkout));

    Router::new()
        .merge(health_routes)
        .nest("/api", billing_routes)
        .with_state(state)
}
