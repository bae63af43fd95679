//! Shipment records and the validation step that produces them.
//!
//! Request bodies arrive as [`ShipmentInput`], a permissive struct where every
//! field is an optional string. [`ShipmentInput::into_new_shipment`] and
//! [`ShipmentInput::into_changes`] turn it into a typed [`NewShipment`] or
//! [`ShipmentChanges`], or a [`ValidationError`] listing every bad field.
//! Nothing reaches a store without passing through one of them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{Address, ShipmentId, ShipmentStatus, TrackingNumber};
use crate::validation::ValidationError;

/// Default page size for shipment listings.
pub const DEFAULT_PAGE_SIZE: u32 = 50;
/// Largest page size a client may request.
pub const MAX_PAGE_SIZE: u32 = 200;

/// A point on the globe in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

/// Resolved coordinates and road distance between a shipment's endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RouteEstimate {
    pub origin: Coordinates,
    pub destination: Coordinates,
    pub distance_km: f64,
    pub duration_minutes: f64,
}

/// A tracked shipment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Shipment {
    pub id: ShipmentId,
    pub tracking_number: TrackingNumber,
    pub origin: Address,
    pub destination: Address,
    pub status: ShipmentStatus,
    /// Present when the geocoder resolved both endpoints.
    pub route: Option<RouteEstimate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Shipment {
    /// Apply `changes` to this record, refreshing `updated_at`.
    pub fn apply(&mut self, changes: &ShipmentChanges, now: DateTime<Utc>) {
        if let Some(tracking_number) = &changes.tracking_number {
            self.tracking_number = tracking_number.clone();
        }
        if let Some(origin) = &changes.origin {
            self.origin = origin.clone();
        }
        if let Some(destination) = &changes.destination {
            self.destination = destination.clone();
        }
        if let Some(status) = changes.status {
            self.status = status;
        }
        match changes.route {
            RouteChange::Keep => {}
            RouteChange::Set(route) => self.route = Some(route),
            RouteChange::Clear => self.route = None,
        }
        self.updated_at = now;
    }
}

/// Validated fields for a shipment about to be created.
///
/// The ID is assigned here rather than by the store so the creation event can
/// reference it before the record exists.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewShipment {
    pub id: ShipmentId,
    pub tracking_number: TrackingNumber,
    pub origin: Address,
    pub destination: Address,
    pub status: ShipmentStatus,
    pub route: Option<RouteEstimate>,
}

/// What an update does to the stored route estimate.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
#[serde(rename_all = "snake_case", tag = "action", content = "route")]
pub enum RouteChange {
    #[default]
    Keep,
    Set(RouteEstimate),
    /// Endpoints moved and no fresh estimate is available.
    Clear,
}

/// Validated partial update. `None` fields are left untouched.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct ShipmentChanges {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tracking_number: Option<TrackingNumber>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin: Option<Address>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination: Option<Address>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<ShipmentStatus>,
    pub route: RouteChange,
}

impl ShipmentChanges {
    /// Whether the update moves either endpoint.
    #[must_use]
    pub const fn moves_endpoints(&self) -> bool {
        self.origin.is_some() || self.destination.is_some()
    }
}

/// Raw shipment payload as sent by clients.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ShipmentInput {
    pub tracking_number: Option<String>,
    pub origin: Option<String>,
    pub destination: Option<String>,
    pub status: Option<String>,
}

impl ShipmentInput {
    /// Validate a create request.
    ///
    /// `origin` and `destination` are required; `status` defaults to
    /// `created`; a tracking number is generated from `now` when absent.
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] naming every missing or malformed field.
    pub fn into_new_shipment(self, now: DateTime<Utc>) -> Result<NewShipment, ValidationError> {
        let mut errors = ValidationError::default();

        let origin = required_address(&mut errors, "origin", self.origin.as_deref());
        let destination = required_address(&mut errors, "destination", self.destination.as_deref());
        let status = parse_status(&mut errors, self.status.as_deref()).unwrap_or_default();
        let tracking_number = parse_tracking(&mut errors, self.tracking_number.as_deref())
            .unwrap_or_else(|| TrackingNumber::generate(now));

        match (origin, destination) {
            (Some(origin), Some(destination)) if errors.is_empty() => Ok(NewShipment {
                id: ShipmentId::generate(),
                tracking_number,
                origin,
                destination,
                status,
                route: None,
            }),
            _ => Err(errors),
        }
    }

    /// Validate an update request.
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] if any present field is malformed or if
    /// no field is present at all.
    pub fn into_changes(self) -> Result<ShipmentChanges, ValidationError> {
        let mut errors = ValidationError::default();

        let origin = self
            .origin
            .as_deref()
            .and_then(|s| optional_address(&mut errors, "origin", s));
        let destination = self
            .destination
            .as_deref()
            .and_then(|s| optional_address(&mut errors, "destination", s));
        let status = parse_status(&mut errors, self.status.as_deref());
        let tracking_number = parse_tracking(&mut errors, self.tracking_number.as_deref());

        let changes = ShipmentChanges {
            tracking_number,
            origin,
            destination,
            status,
            route: RouteChange::Keep,
        };

        if errors.is_empty()
            && changes.tracking_number.is_none()
            && !changes.moves_endpoints()
            && changes.status.is_none()
        {
            errors.push("body", "no updatable fields supplied");
        }

        errors.into_result(changes)
    }
}

fn required_address(
    errors: &mut ValidationError,
    field: &'static str,
    value: Option<&str>,
) -> Option<Address> {
    match value {
        Some(s) => optional_address(errors, field, s),
        None => {
            errors.push(field, "is required");
            None
        }
    }
}

fn optional_address(errors: &mut ValidationError, field: &'static str, value: &str) -> Option<Address> {
    Address::parse(value)
        .map_err(|e| errors.push(field, e.to_string()))
        .ok()
}

fn parse_status(errors: &mut ValidationError, value: Option<&str>) -> Option<ShipmentStatus> {
    value.and_then(|s| {
        s.parse::<ShipmentStatus>()
            .map_err(|e| errors.push("status", e.to_string()))
            .ok()
    })
}

fn parse_tracking(errors: &mut ValidationError, value: Option<&str>) -> Option<TrackingNumber> {
    value.and_then(|s| {
        TrackingNumber::parse(s)
            .map_err(|e| errors.push("tracking_number", e.to_string()))
            .ok()
    })
}

/// Raw list query parameters.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ShipmentListQuery {
    pub status: Option<String>,
    pub q: Option<String>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

/// Validated listing filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShipmentFilter {
    pub status: Option<ShipmentStatus>,
    /// Case-insensitive substring matched against origin, destination and
    /// tracking number.
    pub search: Option<String>,
    pub limit: u32,
    pub offset: u32,
}

impl Default for ShipmentFilter {
    fn default() -> Self {
        Self {
            status: None,
            search: None,
            limit: DEFAULT_PAGE_SIZE,
            offset: 0,
        }
    }
}

impl ShipmentFilter {
    /// Whether `shipment` passes the status and search filters.
    #[must_use]
    pub fn matches(&self, shipment: &Shipment) -> bool {
        if self.status.is_some_and(|status| status != shipment.status) {
            return false;
        }
        self.search.as_deref().is_none_or(|needle| {
            let needle = needle.to_lowercase();
            [
                shipment.origin.as_str(),
                shipment.destination.as_str(),
                shipment.tracking_number.as_str(),
            ]
            .iter()
            .any(|field| field.to_lowercase().contains(&needle))
        })
    }
}

impl TryFrom<ShipmentListQuery> for ShipmentFilter {
    type Error = ValidationError;

    fn try_from(query: ShipmentListQuery) -> Result<Self, Self::Error> {
        let mut errors = ValidationError::default();

        let status = parse_status(&mut errors, query.status.as_deref());
        let search = query
            .q
            .map(|q| q.trim().to_owned())
            .filter(|q| !q.is_empty());
        let limit = query.limit.unwrap_or(DEFAULT_PAGE_SIZE);
        if limit == 0 || limit > MAX_PAGE_SIZE {
            errors.push("limit", format!("must be between 1 and {MAX_PAGE_SIZE}"));
        }

        errors.into_result(Self {
            status,
            search,
            limit,
            offset: query.offset.unwrap_or(0),
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn input(origin: Option<&str>, destination: Option<&str>, status: Option<&str>) -> ShipmentInput {
        ShipmentInput {
            tracking_number: None,
            origin: origin.map(String::from),
            destination: destination.map(String::from),
            status: status.map(String::from),
        }
    }

    #[test]
    fn test_new_shipment_defaults() {
        let new = input(Some("London"), Some("Paris"), None)
            .into_new_shipment(Utc::now())
            .unwrap();
        assert_eq!(new.status, ShipmentStatus::Created);
        assert!(new.tracking_number.as_str().starts_with("TRK-"));
        assert_eq!(new.origin.as_str(), "London");
        assert!(new.route.is_none());
    }

    #[test]
    fn test_new_shipment_reports_every_bad_field() {
        let err = input(None, Some(""), Some("lost"))
            .into_new_shipment(Utc::now())
            .unwrap_err();
        let fields: Vec<_> = err.errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(fields, ["origin", "destination", "status"]);
    }

    #[test]
    fn test_new_shipment_keeps_client_tracking_number() {
        let mut raw = input(Some("Oslo"), Some("Bergen"), Some("in-transit"));
        raw.tracking_number = Some("ACME-42".to_owned());
        let new = raw.into_new_shipment(Utc::now()).unwrap();
        assert_eq!(new.tracking_number.as_str(), "ACME-42");
        assert_eq!(new.status, ShipmentStatus::InTransit);
    }

    #[test]
    fn test_changes_require_at_least_one_field() {
        let err = ShipmentInput::default().into_changes().unwrap_err();
        assert_eq!(err.errors[0].field, "body");
    }

    #[test]
    fn test_changes_reject_invalid_status() {
        let err = input(None, None, Some("teleported")).into_changes().unwrap_err();
        assert_eq!(err.errors.len(), 1);
        assert_eq!(err.errors[0].field, "status");
    }

    #[test]
    fn test_apply_changes() {
        let now = Utc::now();
        let new = input(Some("A"), Some("B"), None).into_new_shipment(now).unwrap();
        let mut shipment = Shipment {
            id: new.id,
            tracking_number: new.tracking_number,
            origin: new.origin,
            destination: new.destination,
            status: new.status,
            route: Some(RouteEstimate {
                origin: Coordinates { lat: 1.0, lng: 2.0 },
                destination: Coordinates { lat: 3.0, lng: 4.0 },
                distance_km: 10.0,
                duration_minutes: 12.5,
            }),
            created_at: now,
            updated_at: now,
        };
        let mut changes = input(Some("C"), None, Some("delivered")).into_changes().unwrap();
        changes.route = RouteChange::Clear;

        let later = now + chrono::Duration::seconds(5);
        shipment.apply(&changes, later);

        assert_eq!(shipment.origin.as_str(), "C");
        assert_eq!(shipment.destination.as_str(), "B");
        assert_eq!(shipment.status, ShipmentStatus::Delivered);
        assert!(shipment.route.is_none());
        assert_eq!(shipment.updated_at, later);
        assert_eq!(shipment.created_at, now);
    }

    #[test]
    fn test_filter_from_query() {
        let filter = ShipmentFilter::try_from(ShipmentListQuery {
            status: Some("delivered".to_owned()),
            q: Some("  ".to_owned()),
            limit: None,
            offset: Some(20),
        })
        .unwrap();
        assert_eq!(filter.status, Some(ShipmentStatus::Delivered));
        assert_eq!(filter.search, None);
        assert_eq!(filter.limit, DEFAULT_PAGE_SIZE);
        assert_eq!(filter.offset, 20);
    }

    #[test]
    fn test_filter_rejects_oversized_page() {
        let err = ShipmentFilter::try_from(ShipmentListQuery {
            limit: Some(MAX_PAGE_SIZE + 1),
            ..ShipmentListQuery::default()
        })
        .unwrap_err();
        assert_eq!(err.errors[0].field, "limit");
    }
}
