//! Integration tests for health checks and request IDs.

#![allow(clippy::unwrap_used)]

use axum::body::Body;
use axum::http::{Request, StatusCode};

use waybill_integration_tests::{TestContext, TestOptions};

#[tokio::test]
async fn test_health_needs_no_token() {
    let ctx = TestContext::new();
    let response = ctx.get("/health", None).await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body, "ok");
}

#[tokio::test]
async fn test_readiness_pings_stores() {
    let ctx = TestContext::new();
    assert_eq!(ctx.get("/health/ready", None).await.status, StatusCode::OK);

    let degraded = TestContext::with_options(TestOptions {
        events_down: true,
        ..TestOptions::default()
    });
    assert_eq!(
        degraded.get("/health/ready", None).await.status,
        StatusCode::SERVICE_UNAVAILABLE
    );
}

#[tokio::test]
async fn test_request_id_is_generated() {
    let ctx = TestContext::new();
    let first = ctx.get("/health", None).await;
    let second = ctx.get("/health", None).await;

    let first = first.headers.get("x-request-id").unwrap();
    let second = second.headers.get("x-request-id").unwrap();
    assert!(!first.is_empty());
    assert_ne!(first, second);
}

#[tokio::test]
async fn test_request_id_is_echoed_on_errors() {
    let ctx = TestContext::new();
    let request = Request::builder()
        .uri("/shipments")
        .header("x-request-id", "trace-abc-123")
        .body(Body::empty())
        .unwrap();

    let response = ctx.send(request).await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(response.headers["x-request-id"], "trace-abc-123");
}

#[tokio::test]
async fn test_unknown_route_is_not_found() {
    let ctx = TestContext::new();
    assert_eq!(
        ctx.get("/parcels", None).await.status,
        StatusCode::NOT_FOUND
    );
}
