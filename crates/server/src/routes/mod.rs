//! HTTP route handlers.
//!
//! # Route Structure
//!
//! ```text
//! GET    /health                   - Liveness check
//! GET    /health/ready             - Readiness check (pings both stores)
//!
//! # Shipments (reads public when WAYBILL_PUBLIC_READS=true)
//! POST   /shipments                - Create a shipment
//! GET    /shipments                - List (status, q, limit, offset)
//! GET    /shipments/{id}           - Fetch one
//! PUT    /shipments/{id}           - Partial update
//! DELETE /shipments/{id}           - Delete
//!
//! # Events
//! GET    /shipments/{id}/events    - Event history (from, to), oldest first
//! POST   /shipments/{id}/events    - Append a note
//! GET    /events                   - Recent events across shipments (limit)
//!
//! # Geocoding
//! GET    /geo/geocode              - Resolve an address (address)
//! GET    /geo/distance             - Route estimate (origin, destination)
//!
//! # Account
//! GET    /whoami                   - Verified identity and whitelist status
//! ```

pub mod account;
pub mod events;
pub mod geo;
pub mod health;
pub mod shipments;

use axum::{Router, middleware::from_fn, routing::get};
use tower_http::trace::{DefaultOnResponse, OnResponse, TraceLayer};
use tracing::Span;

use crate::middleware::request_id_middleware;
use crate::state::AppState;

/// Create the shipment routes router.
pub fn shipment_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(shipments::list).post(shipments::create))
        .route(
            "/{id}",
            get(shipments::show)
                .put(shipments::update)
                .delete(shipments::delete),
        )
        .route(
            "/{id}/events",
            get(events::list_for_shipment).post(events::add_note),
        )
}

/// Create the geocoding routes router.
pub fn geo_routes() -> Router<AppState> {
    Router::new()
        .route("/geocode", get(geo::geocode))
        .route("/distance", get(geo::distance))
}

/// Create all API routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health::health))
        .route("/health/ready", get(health::readiness))
        .nest("/shipments", shipment_routes())
        .route("/events", get(events::recent))
        .nest("/geo", geo_routes())
        .route("/whoami", get(account::whoami))
}

/// Build the application router with tracing and request IDs.
///
/// Sentry layers are added by the binary so tests can drive this router
/// without a Sentry client.
pub fn app(state: AppState) -> Router {
    routes()
        .layer(from_fn(request_id_middleware))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &axum::http::Request<_>| {
                    tracing::info_span!(
                        "http_request",
                        method = %request.method(),
                        uri = %request.uri(),
                        request_id = tracing::field::Empty,
                        user = tracing::field::Empty,
                        status = tracing::field::Empty,
                        latency_ms = tracing::field::Empty,
                    )
                })
                .on_response(
                    |response: &axum::http::Response<_>,
                     latency: std::time::Duration,
                     span: &Span| {
                        span.record("status", response.status().as_u16());
                        span.record(
                            "latency_ms",
                            u64::try_from(latency.as_millis()).unwrap_or(u64::MAX),
                        );
                        DefaultOnResponse::default().on_response(response, latency, span);
                    },
                ),
        )
        .with_state(state)
}
