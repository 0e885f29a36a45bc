#![allow(clippy::unwrap_used)]

//! Router-level tests for the billing endpoints

use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use serpdeck_api::{create_router, AppState};
use serpdeck_billing::{
    signature, testing::RecordingProvider, BillingBackends, BillingService, InMemoryAccountStore,
    PlanCatalog, DEFAULT_WEBHOOK_TOLERANCE_SECS, SIGNATURE_HEADER,
};
use serpdeck_shared::{Account, Plan, SubscriptionStatus};
use time::OffsetDateTime;
use tower::ServiceExt;

const SECRET: &str = "whsec_routes_test";
const WEBHOOK_PATH: &str = "/api/billing/webhook";

struct TestApp {
    router: Router,
    provider: Arc<RecordingProvider>,
    store: Arc<InMemoryAccountStore>,
}

fn test_app(provider: RecordingProvider) -> TestApp {
    let provider = Arc::new(provider);
    let store = Arc::new(InMemoryAccountStore::with_accounts([Account::new(
        "user_1",
        "a@example.com",
    )]));
    let billing = BillingService::new(
        BillingBackends::in_memory(provider.clone(), store.clone()),
        PlanCatalog::default(),
        SECRET,
        DEFAULT_WEBHOOK_TOLERANCE_SECS,
    );

    TestApp {
        router: create_router(AppState::new(billing)),
        provider,
        store,
    }
}

fn checkout_event() -> Vec<u8> {
    serde_json::to_vec(&json!({
        "id": "evt_checkout_1",
        "type": "checkout.session.completed",
        "created": 1714557600,
        "data": { "object": {
            "id": "cs_test_1",
            "customer": "cus_1",
            "customer_email": "a@example.com",
            "customer_details": { "email": "a@example.com" }
        }}
    }))
    .unwrap()
}

fn signed(payload: &[u8]) -> String {
    signature::sign(payload, SECRET, OffsetDateTime::now_utc().unix_timestamp()).unwrap()
}

fn webhook_request(payload: Vec<u8>, signature: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(WEBHOOK_PATH)
        .header("content-type", "application/json");
    if let Some(signature) = signature {
        builder = builder.header(SIGNATURE_HEADER, signature);
    }
    builder.body(Body::from(payload)).unwrap()
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

#[tokio::test]
async fn test_signed_checkout_upgrades_account() {
    let app = test_app(RecordingProvider::new().with_session_price("cs_test_1", "price_pro"));
    let payload = checkout_event();
    let header = signed(&payload);

    let (status, body) = send(&app.router, webhook_request(payload, Some(&header))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "received": true }));
    let account = app.store.get("user_1").await.unwrap();
    assert_eq!(account.plan, Plan::Pro);
    assert_eq!(account.credits, 4000);
    assert_eq!(account.subscription_status, SubscriptionStatus::Active);
}

#[tokio::test]
async fn test_redelivery_is_acknowledged_without_side_effects() {
    let app = test_app(RecordingProvider::new().with_session_price("cs_test_1", "price_pro"));
    let payload = checkout_event();
    let header = signed(&payload);

    let (first, _) = send(&app.router, webhook_request(payload.clone(), Some(&header))).await;
    let (second, body) = send(&app.router, webhook_request(payload, Some(&header))).await;

    assert_eq!(first, StatusCode::OK);
    assert_eq!(second, StatusCode::OK);
    assert_eq!(body, json!({ "received": true }));
    assert_eq!(app.store.update_calls(), 1);
    assert_eq!(app.provider.call_count().await, 1);
}

#[tokio::test]
async fn test_missing_signature_is_rejected_without_calls() {
    let app = test_app(RecordingProvider::new().with_session_price("cs_test_1", "price_pro"));

    let (status, body) = send(&app.router, webhook_request(checkout_event(), None)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({ "error": "missing_signature" }));
    assert_eq!(app.provider.call_count().await, 0);
    assert_eq!(app.store.update_calls(), 0);
}

#[tokio::test]
async fn test_invalid_signature_is_rejected() {
    let app = test_app(RecordingProvider::new().with_session_price("cs_test_1", "price_pro"));
    let payload = checkout_event();
    let header = signature::sign(
        &payload,
        "whsec_someone_else",
        OffsetDateTime::now_utc().unix_timestamp(),
    )
    .unwrap();

    let (status, body) = send(&app.router, webhook_request(payload, Some(&header))).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("signature"));
    assert_eq!(app.store.update_calls(), 0);
    assert_eq!(app.store.get("user_1").await.unwrap().plan, Plan::Free);
}

#[tokio::test]
async fn test_downstream_failure_is_client_error() {
    let app = test_app(RecordingProvider::failing());
    let payload = checkout_event();
    let header = signed(&payload);

    let (status, body) = send(&app.router, webhook_request(payload, Some(&header))).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn test_wrong_method_on_webhook() {
    let app = test_app(RecordingProvider::new());

    let (status, body) = send(
        &app.router,
        Request::builder()
            .method("GET")
            .uri(WEBHOOK_PATH)
            .body(Body::empty())
            .unwrap(),
    )
    .await;

    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(body, json!({ "error": "method_not_allowed" }));
}

#[tokio::test]
async fn test_checkout_returns_url() {
    let app = test_app(RecordingProvider::new());
    let request = Request::builder()
        .method("POST")
        .uri("/api/billing/checkout")
        .header("content-type", "application/json")
        .body(Body::from(
            json!({
                "price_id": "price_agency",
                "user_id": "user_1",
                "email": "a@example.com"
            })
            .to_string(),
        ))
        .unwrap();

    let (status, body) = send(&app.router, request).await;

    assert_eq!(status, StatusCode::OK);
    assert!(body["url"]
        .as_str()
        .unwrap()
        .starts_with("https://checkout.stripe.com/"));
    assert!(app
        .store
        .get("user_1")
        .await
        .unwrap()
        .stripe_customer_id
        .is_some());
}

#[tokio::test]
async fn test_checkout_rejects_unknown_price() {
    let app = test_app(RecordingProvider::new());
    let request = Request::builder()
        .method("POST")
        .uri("/api/billing/checkout")
        .header("content-type", "application/json")
        .body(Body::from(
            json!({
                "price_id": "price_enterprise",
                "user_id": "user_1",
                "email": "a@example.com"
            })
            .to_string(),
        ))
        .unwrap();

    let (status, body) = send(&app.router, request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({ "error": "Unknown price id: price_enterprise" }));
    assert_eq!(app.provider.call_count().await, 0);
}

#[tokio::test]
async fn test_checkout_rejects_malformed_body() {
    let app = test_app(RecordingProvider::new());
    let request = Request::builder()
        .method("POST")
        .uri("/api/billing/checkout")
        .header("content-type", "application/json")
        .body(Body::from(r#"{"price_id": "price_pro"}"#))
        .unwrap();

    let (status, body) = send(&app.router, request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn test_health() {
    let app = test_app(RecordingProvider::new());

    let (status, body) = send(
        &app.router,
        Request::builder().uri("/health").body(Body::empty()).unwrap(),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}
