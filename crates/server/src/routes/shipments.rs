//! Shipment CRUD handlers.
//!
//! Every mutation appends an event describing it before touching the
//! shipment store. If the append fails the mutation is not attempted; if the
//! mutation fails afterwards the event stays in the log.

use axum::{
    Json,
    extract::{Query, State, rejection::JsonRejection, rejection::QueryRejection},
    http::StatusCode,
};
use chrono::Utc;
use serde_json::json;
use tracing::instrument;

use waybill_core::{
    Address, EventKind, RouteChange, Shipment, ShipmentFilter, ShipmentId, ShipmentInput,
    ShipmentListQuery, TrackingNumber, ValidationError,
};

use crate::error::{AppError, Result};
use crate::middleware::{ReadAccess, RequireWhitelisted, ShipmentPath};
use crate::routes::events::record_event;
use crate::state::AppState;

/// Reject a tracking number another shipment already uses.
///
/// Runs before the event append so a rejected request leaves no trace in
/// the log.
async fn ensure_tracking_number_free(
    state: &AppState,
    tracking_number: &TrackingNumber,
    except: Option<ShipmentId>,
) -> Result<()> {
    if state
        .shipments()
        .tracking_number_taken(tracking_number, except)
        .await?
    {
        return Err(
            ValidationError::field("tracking_number", "tracking number already exists").into(),
        );
    }
    Ok(())
}

/// Create a shipment.
///
/// Resolves the route first when a geocoder is configured; a geocoding
/// failure aborts the request before anything is written.
#[instrument(skip_all, fields(email = %identity.email))]
pub async fn create(
    State(state): State<AppState>,
    RequireWhitelisted(identity): RequireWhitelisted,
    payload: std::result::Result<Json<ShipmentInput>, JsonRejection>,
) -> Result<(StatusCode, Json<Shipment>)> {
    let Json(input) = payload?;
    let mut new = input.into_new_shipment(Utc::now())?;
    ensure_tracking_number_free(&state, &new.tracking_number, None).await?;

    if let Some(geocoder) = state.geocoder() {
        new.route = Some(geocoder.resolve_route(&new.origin, &new.destination).await?);
    }

    record_event(
        &state,
        new.id,
        EventKind::ShipmentCreated,
        &identity,
        serde_json::to_value(&new).map_err(|e| AppError::Internal(e.to_string()))?,
    )
    .await?;

    let shipment = state.shipments().create(new).await?;
    tracing::info!(
        shipment_id = %shipment.id,
        tracking_number = %shipment.tracking_number,
        "shipment created"
    );

    Ok((StatusCode::CREATED, Json(shipment)))
}

/// Fetch a single shipment.
pub async fn show(
    State(state): State<AppState>,
    _access: ReadAccess,
    ShipmentPath(id): ShipmentPath,
) -> Result<Json<Shipment>> {
    state
        .shipments()
        .get(id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("shipment {id} not found")))
}

/// List shipments, newest first.
pub async fn list(
    State(state): State<AppState>,
    _access: ReadAccess,
    query: std::result::Result<Query<ShipmentListQuery>, QueryRejection>,
) -> Result<Json<Vec<Shipment>>> {
    let Query(query) = query?;
    let filter = ShipmentFilter::try_from(query)?;
    Ok(Json(state.shipments().list(&filter).await?))
}

/// Apply a partial update.
///
/// The body is validated before the shipment is looked up. Moving either
/// endpoint re-resolves the route, or clears it when no geocoder is
/// configured.
#[instrument(skip_all, fields(shipment_id = %id, email = %identity.email))]
pub async fn update(
    State(state): State<AppState>,
    RequireWhitelisted(identity): RequireWhitelisted,
    ShipmentPath(id): ShipmentPath,
    payload: std::result::Result<Json<ShipmentInput>, JsonRejection>,
) -> Result<Json<Shipment>> {
    let Json(input) = payload?;
    let mut changes = input.into_changes()?;

    let existing = state
        .shipments()
        .get(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("shipment {id} not found")))?;

    if let Some(tracking_number) = &changes.tracking_number {
        ensure_tracking_number_free(&state, tracking_number, Some(id)).await?;
    }

    if changes.moves_endpoints() {
        let origin: &Address = changes.origin.as_ref().unwrap_or(&existing.origin);
        let destination: &Address = changes.destination.as_ref().unwrap_or(&existing.destination);
        changes.route = match state.geocoder() {
            Some(geocoder) => RouteChange::Set(geocoder.resolve_route(origin, destination).await?),
            None => RouteChange::Clear,
        };
    }

    record_event(
        &state,
        id,
        EventKind::ShipmentUpdated,
        &identity,
        json!({
            "changes": changes,
            "previous_status": existing.status,
        }),
    )
    .await?;

    let shipment = state.shipments().update(id, &changes).await?;
    tracing::info!(status = %shipment.status, "shipment updated");

    Ok(Json(shipment))
}

/// Delete a shipment. Its events are kept.
#[instrument(skip_all, fields(shipment_id = %id, email = %identity.email))]
pub async fn delete(
    State(state): State<AppState>,
    RequireWhitelisted(identity): RequireWhitelisted,
    ShipmentPath(id): ShipmentPath,
) -> Result<StatusCode> {
    let existing = state
        .shipments()
        .get(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("shipment {id} not found")))?;

    record_event(
        &state,
        id,
        EventKind::ShipmentDeleted,
        &identity,
        json!({
            "tracking_number": existing.tracking_number,
            "status": existing.status,
        }),
    )
    .await?;

    state.shipments().delete(id).await?;
    tracing::info!("shipment deleted");

    Ok(StatusCode::NO_CONTENT)
}
