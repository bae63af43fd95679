//! Geocoding handlers.
//!
//! Thin wrappers over the configured [`Geocoder`](crate::services::geocoding::Geocoder);
//! without a `GOOGLE_MAPS_API_KEY` both answer `geocoding_unavailable`.

use axum::{
    Json,
    extract::{Query, State, rejection::QueryRejection},
};
use serde::Deserialize;

use waybill_core::{Address, RouteEstimate, ValidationError};

use crate::error::Result;
use crate::middleware::RequireWhitelisted;
use crate::services::geocoding::{Geocoder, GeocodingError, Place};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct GeocodeQuery {
    pub address: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DistanceQuery {
    pub origin: Option<String>,
    pub destination: Option<String>,
}

fn address_param(
    errors: &mut ValidationError,
    field: &'static str,
    value: Option<&str>,
) -> Option<Address> {
    let Some(raw) = value else {
        errors.push(field, "is required");
        return None;
    };
    Address::parse(raw)
        .map_err(|e| errors.push(field, e.to_string()))
        .ok()
}

fn geocoder(state: &AppState) -> Result<&dyn Geocoder> {
    state
        .geocoder()
        .ok_or_else(|| GeocodingError::NotConfigured.into())
}

/// Resolve a single address.
pub async fn geocode(
    State(state): State<AppState>,
    _identity: RequireWhitelisted,
    query: std::result::Result<Query<GeocodeQuery>, QueryRejection>,
) -> Result<Json<Place>> {
    let Query(query) = query?;
    let mut errors = ValidationError::default();
    let address = address_param(&mut errors, "address", query.address.as_deref());

    let (Some(address), true) = (address, errors.is_empty()) else {
        return Err(errors.into());
    };

    Ok(Json(geocoder(&state)?.geocode(&address).await?))
}

/// Estimate the road route between two addresses.
pub async fn distance(
    State(state): State<AppState>,
    _identity: RequireWhitelisted,
    query: std::result::Result<Query<DistanceQuery>, QueryRejection>,
) -> Result<Json<RouteEstimate>> {
    let Query(query) = query?;
    let mut errors = ValidationError::default();
    let origin = address_param(&mut errors, "origin", query.origin.as_deref());
    let destination = address_param(&mut errors, "destination", query.destination.as_deref());

    let (Some(origin), Some(destination), true) = (origin, destination, errors.is_empty()) else {
        return Err(errors.into());
    };

    Ok(Json(
        geocoder(&state)?
            .resolve_route(&origin, &destination)
            .await?,
    ))
}
