//! Integration tests for authentication and the email whitelist.

#![allow(clippy::unwrap_used)]

use axum::body::Body;
use axum::http::{Method, Request, StatusCode, header};
use serde_json::json;

use waybill_integration_tests::{
    DOMAIN_TOKEN, OPS_TOKEN, OUTAGE_TOKEN, STRANGER_TOKEN, TestContext, TestOptions,
};

const SHIPMENT_ID: &str = "7f1c2a8e-5b44-4c1e-9d8a-0d6f3c2b1a00";

/// Every route that needs a whitelisted caller by default.
fn guarded_routes() -> Vec<(Method, String, Option<serde_json::Value>)> {
    let one = format!("/shipments/{SHIPMENT_ID}");
    let events = format!("/shipments/{SHIPMENT_ID}/events");
    vec![
        (Method::GET, "/shipments".to_string(), None),
        (
            Method::POST,
            "/shipments".to_string(),
            Some(json!({ "origin": "Hamburg", "destination": "Rotterdam" })),
        ),
        (Method::GET, one.clone(), None),
        (
            Method::PUT,
            one.clone(),
            Some(json!({ "status": "delivered" })),
        ),
        (Method::DELETE, one, None),
        (Method::GET, events.clone(), None),
        (Method::POST, events, Some(json!({ "message": "hello" }))),
        (Method::GET, "/events".to_string(), None),
        (Method::GET, "/geo/geocode?address=Berlin".to_string(), None),
        (
            Method::GET,
            "/geo/distance?origin=Berlin&destination=Paris".to_string(),
            None,
        ),
    ]
}

// =============================================================================
// Missing or invalid credentials
// =============================================================================

#[tokio::test]
async fn test_every_route_requires_a_token() {
    let ctx = TestContext::new();

    for (method, uri, body) in guarded_routes() {
        let response = ctx.request(method.clone(), &uri, None, body).await;
        assert_eq!(
            response.status,
            StatusCode::UNAUTHORIZED,
            "{method} {uri}"
        );
        assert_eq!(response.body["error"], "unauthorized", "{method} {uri}");
    }
}

#[tokio::test]
async fn test_invalid_token_is_unauthorized() {
    let ctx = TestContext::new();
    let response = ctx.get("/shipments", Some("forged")).await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_non_bearer_scheme_is_unauthorized() {
    let ctx = TestContext::new();
    let request = Request::builder()
        .uri("/shipments")
        .header(header::AUTHORIZATION, format!("Basic {OPS_TOKEN}"))
        .body(Body::empty())
        .unwrap();

    assert_eq!(ctx.send(request).await.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_unauthenticated_create_has_no_effect() {
    let ctx = TestContext::new();
    let response = ctx
        .post(
            "/shipments",
            None,
            json!({ "origin": "Hamburg", "destination": "Rotterdam" }),
        )
        .await;

    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(ctx.shipments.len().await, 0);
    assert_eq!(ctx.event_count().await, 0);
}

#[tokio::test]
async fn test_auth_is_checked_before_body() {
    let ctx = TestContext::new();
    let response = ctx.post("/shipments", None, json!({})).await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_identity_outage_is_service_unavailable() {
    let ctx = TestContext::new();
    let response = ctx.get("/shipments", Some(OUTAGE_TOKEN)).await;

    assert_eq!(response.status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(response.body["error"], "identity_unavailable");
}

// =============================================================================
// Whitelist
// =============================================================================

#[tokio::test]
async fn test_stranger_is_forbidden_everywhere() {
    let ctx = TestContext::new();

    for (method, uri, body) in guarded_routes() {
        let response = ctx
            .request(method.clone(), &uri, Some(STRANGER_TOKEN), body)
            .await;
        assert_eq!(response.status, StatusCode::FORBIDDEN, "{method} {uri}");
        assert_eq!(response.body["error"], "forbidden", "{method} {uri}");
    }
    assert_eq!(ctx.shipments.len().await, 0);
    assert_eq!(ctx.event_count().await, 0);
}

#[tokio::test]
async fn test_domain_entry_admits_caller() {
    let ctx = TestContext::new();
    let response = ctx
        .post(
            "/shipments",
            Some(DOMAIN_TOKEN),
            json!({ "origin": "Hamburg", "destination": "Rotterdam" }),
        )
        .await;

    assert_eq!(response.status, StatusCode::CREATED);

    let events = ctx.get("/events", Some(DOMAIN_TOKEN)).await;
    assert_eq!(events.body[0]["actor"], "dispatch@waybill.test");
}

// =============================================================================
// Public reads
// =============================================================================

#[tokio::test]
async fn test_public_reads_open_only_read_routes() {
    let ctx = TestContext::with_options(TestOptions {
        public_reads: true,
        geocoding: true,
        ..TestOptions::default()
    });
    let shipment = ctx.create_shipment("Hamburg", "Rotterdam").await;
    let id = shipment["id"].as_str().unwrap();

    for uri in [
        "/shipments".to_string(),
        format!("/shipments/{id}"),
        format!("/shipments/{id}/events"),
        "/events".to_string(),
    ] {
        assert_eq!(ctx.get(&uri, None).await.status, StatusCode::OK, "{uri}");
        assert_eq!(
            ctx.get(&uri, Some(STRANGER_TOKEN)).await.status,
            StatusCode::OK,
            "{uri}"
        );
    }

    let create = ctx
        .post(
            "/shipments",
            None,
            json!({ "origin": "Lyon", "destination": "Milan" }),
        )
        .await;
    assert_eq!(create.status, StatusCode::UNAUTHORIZED);

    let delete = ctx
        .delete(&format!("/shipments/{id}"), Some(STRANGER_TOKEN))
        .await;
    assert_eq!(delete.status, StatusCode::FORBIDDEN);

    let geocode = ctx.get("/geo/geocode?address=Berlin", None).await;
    assert_eq!(geocode.status, StatusCode::UNAUTHORIZED);
}

// =============================================================================
// Who am I
// =============================================================================

#[tokio::test]
async fn test_whoami_reports_whitelist_status() {
    let ctx = TestContext::new();

    let ops = ctx.get("/whoami", Some(OPS_TOKEN)).await;
    assert_eq!(ops.status, StatusCode::OK);
    assert_eq!(
        ops.body,
        json!({ "email": "ops@example.com", "whitelisted": true })
    );

    let stranger = ctx.get("/whoami", Some(STRANGER_TOKEN)).await;
    assert_eq!(stranger.status, StatusCode::OK);
    assert_eq!(stranger.body["whitelisted"], false);

    assert_eq!(
        ctx.get("/whoami", None).await.status,
        StatusCode::UNAUTHORIZED
    );
}
