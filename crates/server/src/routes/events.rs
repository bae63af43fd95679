//! Event log handlers.

use axum::{
    Json,
    extract::{Query, State, rejection::JsonRejection, rejection::QueryRejection},
    http::StatusCode,
};
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use serde::Deserialize;

use waybill_core::event::DEFAULT_RECENT_EVENTS;
use waybill_core::shipment::MAX_PAGE_SIZE;
use waybill_core::{Event, EventKind, NewEvent, NoteInput, ShipmentId, TimeRange, ValidationError};

use crate::error::{AppError, Result};
use crate::middleware::{ReadAccess, RequireWhitelisted, ShipmentPath};
use crate::services::identity::VerifiedIdentity;
use crate::state::AppState;

/// Append an event on behalf of `actor`.
///
/// Shipment handlers call this before every mutation; an error here aborts
/// the request so no unlogged change reaches the shipment store.
pub(crate) async fn record_event(
    state: &AppState,
    shipment_id: ShipmentId,
    kind: EventKind,
    actor: &VerifiedIdentity,
    payload: serde_json::Value,
) -> Result<Event> {
    let event = state
        .events()
        .append(NewEvent {
            shipment_id,
            kind,
            payload,
            actor: Some(actor.email.clone()),
        })
        .await
        .inspect_err(|e| tracing::warn!(error = %e, %kind, "event append failed"))?;

    tracing::debug!(event_id = %event.id, %kind, "event recorded");
    Ok(event)
}

/// Query parameters for a shipment's event history.
#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

/// Events for one shipment, oldest first.
///
/// History stays readable after the shipment itself is deleted.
pub async fn list_for_shipment(
    State(state): State<AppState>,
    _access: ReadAccess,
    ShipmentPath(id): ShipmentPath,
    query: std::result::Result<Query<HistoryQuery>, QueryRejection>,
) -> Result<Json<Vec<Event>>> {
    let Query(query) = query?;
    let range = TimeRange::new(query.from, query.to)?;

    let events: Vec<Event> = state.events().query(id, range).try_collect().await?;
    Ok(Json(events))
}

/// Attach a note to an existing shipment.
pub async fn add_note(
    State(state): State<AppState>,
    RequireWhitelisted(identity): RequireWhitelisted,
    ShipmentPath(id): ShipmentPath,
    payload: std::result::Result<Json<NoteInput>, JsonRejection>,
) -> Result<(StatusCode, Json<Event>)> {
    let Json(input) = payload?;
    let note = input.into_payload()?;

    if state.shipments().get(id).await?.is_none() {
        return Err(AppError::NotFound(format!("shipment {id} not found")));
    }

    let event = record_event(&state, id, EventKind::Note, &identity, note).await?;
    Ok((StatusCode::CREATED, Json(event)))
}

/// Query parameters for the recent-events feed.
#[derive(Debug, Deserialize)]
pub struct RecentQuery {
    pub limit: Option<u32>,
}

/// Most recent events across all shipments, newest first.
pub async fn recent(
    State(state): State<AppState>,
    _access: ReadAccess,
    query: std::result::Result<Query<RecentQuery>, QueryRejection>,
) -> Result<Json<Vec<Event>>> {
    let Query(query) = query?;
    let limit = query.limit.unwrap_or(DEFAULT_RECENT_EVENTS);
    if limit == 0 || limit > MAX_PAGE_SIZE {
        return Err(ValidationError::field(
            "limit",
            format!("must be between 1 and {MAX_PAGE_SIZE}"),
        )
        .into());
    }

    Ok(Json(state.events().recent(limit).await?))
}
