//! `PostgreSQL` event log store.
//!
//! Events live in their own database (`EVENTS_DATABASE_URL`) as JSONB
//! documents. `seq` breaks ties between events sharing a timestamp so
//! per-shipment queries always come back in insertion order.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use sqlx::PgPool;
use sqlx::types::Json;
use tracing::instrument;

use waybill_core::{Email, Event, EventId, EventKind, NewEvent, ShipmentId, TimeRange};

use super::{EventStore, EventStream, RepositoryError};

const APPEND_SQL: &str = "INSERT INTO events (id, shipment_id, kind, payload, actor) \
     VALUES ($1, $2, $3, $4, $5) \
     RETURNING id, shipment_id, kind, payload, actor, occurred_at";

const QUERY_SQL: &str = "SELECT id, shipment_id, kind, payload, actor, occurred_at \
     FROM events \
     WHERE shipment_id = $1 \
       AND ($2::timestamptz IS NULL OR occurred_at >= $2) \
       AND ($3::timestamptz IS NULL OR occurred_at < $3) \
     ORDER BY occurred_at, seq";

const RECENT_SQL: &str = "SELECT id, shipment_id, kind, payload, actor, occurred_at \
     FROM events \
     ORDER BY occurred_at DESC, seq DESC \
     LIMIT $1";

/// Event store backed by the `events` table.
#[derive(Clone)]
pub struct PgEventStore {
    pool: PgPool,
}

impl PgEventStore {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct EventRow {
    id: EventId,
    shipment_id: ShipmentId,
    kind: String,
    payload: Json<serde_json::Value>,
    actor: Option<String>,
    occurred_at: DateTime<Utc>,
}

impl TryFrom<EventRow> for Event {
    type Error = RepositoryError;

    fn try_from(r: EventRow) -> Result<Self, Self::Error> {
        let kind = r.kind.parse::<EventKind>().map_err(|e| {
            RepositoryError::DataCorruption(format!("invalid event kind in database: {e}"))
        })?;
        let actor = r
            .actor
            .as_deref()
            .map(Email::parse)
            .transpose()
            .map_err(|e| {
                RepositoryError::DataCorruption(format!("invalid actor in database: {e}"))
            })?;

        Ok(Self {
            id: r.id,
            shipment_id: r.shipment_id,
            kind,
            payload: r.payload.0,
            actor,
            occurred_at: r.occurred_at,
        })
    }
}

#[async_trait]
impl EventStore for PgEventStore {
    #[instrument(skip(self, event), fields(shipment_id = %event.shipment_id, kind = %event.kind))]
    async fn append(&self, event: NewEvent) -> Result<Event, RepositoryError> {
        let row = sqlx::query_as::<_, EventRow>(APPEND_SQL)
            .bind(EventId::generate())
            .bind(event.shipment_id)
            .bind(event.kind.as_str())
            .bind(Json(&event.payload))
            .bind(event.actor.as_ref().map(Email::as_str))
            .fetch_one(&self.pool)
            .await?;

        row.try_into()
    }

    fn query(&self, shipment_id: ShipmentId, range: TimeRange) -> EventStream<'_> {
        sqlx::query_as::<_, EventRow>(QUERY_SQL)
            .bind(shipment_id)
            .bind(range.from)
            .bind(range.to)
            .fetch(&self.pool)
            .map(|row| row.map_err(RepositoryError::from).and_then(Event::try_from))
            .boxed()
    }

    #[instrument(skip(self))]
    async fn recent(&self, limit: u32) -> Result<Vec<Event>, RepositoryError> {
        let rows = sqlx::query_as::<_, EventRow>(RECENT_SQL)
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(Event::try_from).collect()
    }

    async fn ping(&self) -> Result<(), RepositoryError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}
