//! API error types and handling
//!
//! Every error leaves the server as `{"error": "<message>"}`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use serpdeck_billing::BillingError;

/// Application error type
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("missing_signature")]
    MissingSignature,
    #[error("method_not_allowed")]
    MethodNotAllowed,

    /// Any failure while verifying or applying a webhook. The provider only
    /// distinguishes 2xx from everything else, so all of these are 400.
    #[error("{0}")]
    Webhook(BillingError),

    #[error(transparent)]
    Billing(#[from] BillingError),

    #[error("Invalid request: {0}")]
    BadRequest(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::MissingSignature | ApiError::Webhook(_) | ApiError::BadRequest(_) => {
                StatusCode::BAD_REQUEST
            }
            ApiError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            ApiError::Billing(err) => match err {
                BillingError::UnknownPrice(_) | BillingError::InvalidRequest(_) => {
                    StatusCode::BAD_REQUEST
                }
                BillingError::AccountNotFound(_) => StatusCode::NOT_FOUND,
                BillingError::StripeApi(_) | BillingError::Backend(_) => StatusCode::BAD_GATEWAY,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        }

        let message = match &self {
            // Do not leak internals on 500s
            ApiError::Billing(_) if status == StatusCode::INTERNAL_SERVER_ERROR => {
                "Internal server error".to_string()
            }
            _ => self.to_string(),
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

/// Result type alias for API handlers
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(ApiError::MissingSignature.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            ApiError::MethodNotAllowed.status(),
            StatusCode::METHOD_NOT_ALLOWED
        );
        assert_eq!(
            ApiError::Webhook(BillingError::Backend("down".to_string())).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::from(BillingError::UnknownPrice("price_x".to_string())).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::from(BillingError::StripeApi("timeout".to_string())).status(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            ApiError::from(BillingError::Database("pool".to_string())).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_messages() {
        assert_eq!(ApiError::MissingSignature.to_string(), "missing_signature");
        assert_eq!(
            ApiError::Webhook(BillingError::WebhookSignatureInvalid).to_string(),
            "Webhook signature verification failed"
        );
    }
}
