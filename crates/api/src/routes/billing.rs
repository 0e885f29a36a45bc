//! Billing routes

use axum::{
    body::Bytes,
    extract::{rejection::JsonRejection, State},
    http::HeaderMap,
    Json,
};
use serde_json::{json, Value};
use serpdeck_billing::{CheckoutRequest, CheckoutResponse, WebhookOutcome, SIGNATURE_HEADER};

use crate::{
    error::{ApiError, ApiResult},
    state::AppState,
};

/// Handle Stripe webhook events.
///
/// The body is taken as raw bytes: the signature covers the exact bytes sent.
pub async fn webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<Value>> {
    tracing::info!(body_len = body.len(), "Stripe webhook received");

    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| {
            tracing::warn!("Stripe webhook missing signature header");
            ApiError::MissingSignature
        })?;

    let outcome = state
        .billing
        .webhooks
        .process(&body, signature)
        .await
        .map_err(|e| {
            if e.is_authentication() {
                tracing::warn!(error = %e, "Stripe webhook signature verification failed");
            } else {
                tracing::error!(error = %e, "Webhook handling error");
            }
            ApiError::Webhook(e)
        })?;

    match outcome {
        WebhookOutcome::Applied { rows } => {
            tracing::info!(rows = rows, "Stripe webhook processed successfully")
        }
        WebhookOutcome::Duplicate => tracing::info!("Stripe webhook already processed"),
        WebhookOutcome::Ignored => tracing::debug!("Stripe webhook ignored"),
    }

    Ok(Json(json!({ "received": true })))
}

/// Any method other than POST on the webhook path
pub async fn method_not_allowed() -> ApiError {
    ApiError::MethodNotAllowed
}

/// Create a subscription checkout session
pub async fn create_checkout(
    State(state): State<AppState>,
    payload: Result<Json<CheckoutRequest>, JsonRejection>,
) -> ApiResult<Json<CheckoutResponse>> {
    let Json(request) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;

    let response = state.billing.checkout.create_checkout(&request).await?;

    Ok(Json(response))
}
