//! Health check endpoints.

use axum::{extract::State, http::StatusCode};

use crate::state::AppState;

/// Liveness health check endpoint.
///
/// Returns "ok" if the server is running. Does not check dependencies.
pub async fn health() -> &'static str {
    "ok"
}

/// Readiness health check endpoint.
///
/// Pings both stores. Returns 503 Service Unavailable if either is not
/// reachable.
pub async fn readiness(State(state): State<AppState>) -> StatusCode {
    let (shipments, events) = tokio::join!(state.shipments().ping(), state.events().ping());

    match (shipments, events) {
        (Ok(()), Ok(())) => StatusCode::OK,
        (shipments, events) => {
            tracing::warn!(
                shipments = ?shipments.err(),
                events = ?events.err(),
                "readiness check failed"
            );
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}
