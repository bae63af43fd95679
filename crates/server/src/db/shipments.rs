//! `PostgreSQL` shipment store.
//!
//! Queries are built at runtime with `sqlx::query_as` so the crate compiles
//! without a live database; rows are decoded into [`ShipmentRow`] and then
//! re-validated into domain types.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::instrument;

use waybill_core::{
    Address, Coordinates, NewShipment, RouteChange, RouteEstimate, Shipment, ShipmentChanges,
    ShipmentFilter, ShipmentId, ShipmentStatus, TrackingNumber,
};

use super::{RepositoryError, ShipmentStore, map_unique_violation};

const COLUMNS: &str = "id, tracking_number, origin, destination, status, \
     origin_lat, origin_lng, destination_lat, destination_lng, distance_km, duration_minutes, \
     created_at, updated_at";

/// Shipment store backed by the `shipments` table.
#[derive(Clone)]
pub struct PgShipmentStore {
    pool: PgPool,
}

impl PgShipmentStore {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct ShipmentRow {
    id: uuid::Uuid,
    tracking_number: String,
    origin: String,
    destination: String,
    status: String,
    origin_lat: Option<f64>,
    origin_lng: Option<f64>,
    destination_lat: Option<f64>,
    destination_lng: Option<f64>,
    distance_km: Option<f64>,
    duration_minutes: Option<f64>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ShipmentRow> for Shipment {
    type Error = RepositoryError;

    fn try_from(r: ShipmentRow) -> Result<Self, Self::Error> {
        let corrupt = |field: &str, e: &dyn std::fmt::Display| {
            RepositoryError::DataCorruption(format!("invalid {field} in database: {e}"))
        };

        let route = match (
            r.origin_lat,
            r.origin_lng,
            r.destination_lat,
            r.destination_lng,
            r.distance_km,
            r.duration_minutes,
        ) {
            (Some(olat), Some(olng), Some(dlat), Some(dlng), Some(km), Some(minutes)) => {
                Some(RouteEstimate {
                    origin: Coordinates {
                        lat: olat,
                        lng: olng,
                    },
                    destination: Coordinates {
                        lat: dlat,
                        lng: dlng,
                    },
                    distance_km: km,
                    duration_minutes: minutes,
                })
            }
            _ => None,
        };

        Ok(Self {
            id: ShipmentId::from_uuid(r.id),
            tracking_number: TrackingNumber::parse(&r.tracking_number)
                .map_err(|e| corrupt("tracking number", &e))?,
            origin: Address::parse(&r.origin).map_err(|e| corrupt("origin", &e))?,
            destination: Address::parse(&r.destination).map_err(|e| corrupt("destination", &e))?,
            status: r
                .status
                .parse::<ShipmentStatus>()
                .map_err(|e| corrupt("status", &e))?,
            route,
            created_at: r.created_at,
            updated_at: r.updated_at,
        })
    }
}

/// Flatten an optional route into the six nullable columns.
fn route_columns(route: Option<&RouteEstimate>) -> [Option<f64>; 6] {
    route.map_or([None; 6], |r| {
        [
            Some(r.origin.lat),
            Some(r.origin.lng),
            Some(r.destination.lat),
            Some(r.destination.lng),
            Some(r.distance_km),
            Some(r.duration_minutes),
        ]
    })
}

#[async_trait]
impl ShipmentStore for PgShipmentStore {
    #[instrument(skip(self, shipment), fields(shipment_id = %shipment.id))]
    async fn create(&self, shipment: NewShipment) -> Result<Shipment, RepositoryError> {
        let [olat, olng, dlat, dlng, km, minutes] = route_columns(shipment.route.as_ref());
        let sql = format!(
            "INSERT INTO shipments (id, tracking_number, origin, destination, status, \
                 origin_lat, origin_lng, destination_lat, destination_lng, distance_km, duration_minutes) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) \
             RETURNING {COLUMNS}"
        );

        let row = sqlx::query_as::<_, ShipmentRow>(&sql)
            .bind(shipment.id)
            .bind(shipment.tracking_number.as_str())
            .bind(shipment.origin.as_str())
            .bind(shipment.destination.as_str())
            .bind(shipment.status.as_str())
            .bind(olat)
            .bind(olng)
            .bind(dlat)
            .bind(dlng)
            .bind(km)
            .bind(minutes)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_unique_violation(e, "tracking number"))?;

        row.try_into()
    }

    #[instrument(skip(self))]
    async fn get(&self, id: ShipmentId) -> Result<Option<Shipment>, RepositoryError> {
        let sql = format!("SELECT {COLUMNS} FROM shipments WHERE id = $1");
        sqlx::query_as::<_, ShipmentRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(Shipment::try_from)
            .transpose()
    }

    #[instrument(skip(self, changes))]
    async fn update(
        &self,
        id: ShipmentId,
        changes: &ShipmentChanges,
    ) -> Result<Shipment, RepositoryError> {
        let (replace_route, route) = match &changes.route {
            RouteChange::Keep => (false, None),
            RouteChange::Set(route) => (true, Some(route)),
            RouteChange::Clear => (true, None),
        };
        let [olat, olng, dlat, dlng, km, minutes] = route_columns(route);

        let sql = format!(
            "UPDATE shipments SET \
                 tracking_number = COALESCE($2, tracking_number), \
                 origin = COALESCE($3, origin), \
                 destination = COALESCE($4, destination), \
                 status = COALESCE($5, status), \
                 origin_lat = CASE WHEN $6 THEN $7 ELSE origin_lat END, \
                 origin_lng = CASE WHEN $6 THEN $8 ELSE origin_lng END, \
                 destination_lat = CASE WHEN $6 THEN $9 ELSE destination_lat END, \
                 destination_lng = CASE WHEN $6 THEN $10 ELSE destination_lng END, \
                 distance_km = CASE WHEN $6 THEN $11 ELSE distance_km END, \
                 duration_minutes = CASE WHEN $6 THEN $12 ELSE duration_minutes END, \
                 updated_at = now() \
             WHERE id = $1 \
             RETURNING {COLUMNS}"
        );

        let row = sqlx::query_as::<_, ShipmentRow>(&sql)
            .bind(id)
            .bind(changes.tracking_number.as_ref().map(TrackingNumber::as_str))
            .bind(changes.origin.as_ref().map(Address::as_str))
            .bind(changes.destination.as_ref().map(Address::as_str))
            .bind(changes.status.map(ShipmentStatus::as_str))
            .bind(replace_route)
            .bind(olat)
            .bind(olng)
            .bind(dlat)
            .bind(dlng)
            .bind(km)
            .bind(minutes)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_unique_violation(e, "tracking number"))?
            .ok_or(RepositoryError::NotFound)?;

        row.try_into()
    }

    #[instrument(skip(self))]
    async fn tracking_number_taken(
        &self,
        tracking_number: &TrackingNumber,
        except: Option<ShipmentId>,
    ) -> Result<bool, RepositoryError> {
        let taken = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM shipments \
             WHERE tracking_number = $1 AND ($2::uuid IS NULL OR id <> $2))",
        )
        .bind(tracking_number.as_str())
        .bind(except)
        .fetch_one(&self.pool)
        .await?;

        Ok(taken)
    }

    #[instrument(skip(self))]
    async fn delete(&self, id: ShipmentId) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM shipments WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn list(&self, filter: &ShipmentFilter) -> Result<Vec<Shipment>, RepositoryError> {
        let search = filter
            .search
            .as_deref()
            .map(|q| format!("%{}%", escape_like(q)));

        let sql = format!(
            "SELECT {COLUMNS} FROM shipments \
             WHERE ($1::text IS NULL OR status = $1) \
               AND ($2::text IS NULL \
                    OR origin ILIKE $2 \
                    OR destination ILIKE $2 \
                    OR tracking_number ILIKE $2) \
             ORDER BY created_at DESC, id \
             LIMIT $3 OFFSET $4"
        );

        let rows = sqlx::query_as::<_, ShipmentRow>(&sql)
            .bind(filter.status.map(ShipmentStatus::as_str))
            .bind(search)
            .bind(i64::from(filter.limit))
            .bind(i64::from(filter.offset))
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(Shipment::try_from).collect()
    }

    async fn ping(&self) -> Result<(), RepositoryError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

/// Escape `ILIKE` wildcards so the search term matches literally.
fn escape_like(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len());
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_like() {
        assert_eq!(escape_like("TRK_2026%"), "TRK\\_2026\\%");
        assert_eq!(escape_like("plain"), "plain");
    }

    #[test]
    fn test_route_columns() {
        assert_eq!(route_columns(None), [None; 6]);
        let route = RouteEstimate {
            origin: Coordinates { lat: 1.0, lng: 2.0 },
            destination: Coordinates { lat: 3.0, lng: 4.0 },
            distance_km: 5.0,
            duration_minutes: 6.0,
        };
        assert_eq!(
            route_columns(Some(&route)),
            [Some(1.0), Some(2.0), Some(3.0), Some(4.0), Some(5.0), Some(6.0)]
        );
    }

    #[test]
    fn test_row_with_unknown_status_is_corrupt() {
        let now = Utc::now();
        let row = ShipmentRow {
            id: uuid::Uuid::new_v4(),
            tracking_number: "TRK-1".to_string(),
            origin: "A".to_string(),
            destination: "B".to_string(),
            status: "misplaced".to_string(),
            origin_lat: None,
            origin_lng: None,
            destination_lat: None,
            destination_lng: None,
            distance_km: None,
            duration_minutes: None,
            created_at: now,
            updated_at: now,
        };
        assert!(matches!(
            Shipment::try_from(row),
            Err(RepositoryError::DataCorruption(_))
        ));
    }
}
