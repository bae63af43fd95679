//! Shipment and event persistence.
//!
//! # Stores
//!
//! Two independent stores sit behind object-safe traits so the router never
//! names a backend:
//!
//! - [`ShipmentStore`] - the relational shipment table
//! - [`EventStore`] - the append-only event log
//!
//! Each has a `PostgreSQL` implementation (separate databases and pools) and
//! an in-memory one used for local runs and tests.
//!
//! # Migrations
//!
//! Migrations are stored in `crates/server/migrations/{shipments,events}/`
//! and run via:
//! ```bash
//! cargo run -p waybill-cli -- migrate all
//! ```

pub mod events;
pub mod memory;
pub mod shipments;

use std::time::Duration;

use async_trait::async_trait;
use futures::stream::BoxStream;
use secrecy::ExposeSecret;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;

use waybill_core::{
    Event, NewEvent, NewShipment, Shipment, ShipmentChanges, ShipmentFilter, ShipmentId, TimeRange,
    TrackingNumber,
};

pub use events::PgEventStore;
pub use memory::{MemoryEventStore, MemoryShipmentStore};
pub use shipments::PgShipmentStore;

/// Errors that can occur during repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Data in the database is corrupted or invalid.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// Requested entity was not found.
    #[error("not found")]
    NotFound,

    /// Constraint violation (e.g., duplicate tracking number).
    #[error("constraint violation: {0}")]
    Conflict(String),
}

/// Stream of events yielded by [`EventStore::query`].
pub type EventStream<'a> = BoxStream<'a, Result<Event, RepositoryError>>;

/// Storage for shipment records.
#[async_trait]
pub trait ShipmentStore: Send + Sync {
    /// Insert a new shipment.
    ///
    /// # Errors
    ///
    /// `Conflict` if the ID or tracking number already exists.
    async fn create(&self, shipment: NewShipment) -> Result<Shipment, RepositoryError>;

    /// Fetch a shipment, or `None` if it does not exist.
    async fn get(&self, id: ShipmentId) -> Result<Option<Shipment>, RepositoryError>;

    /// Apply a partial update and return the updated record.
    ///
    /// # Errors
    ///
    /// `NotFound` if no shipment has this ID; `Conflict` if the new tracking
    /// number is taken.
    async fn update(
        &self,
        id: ShipmentId,
        changes: &ShipmentChanges,
    ) -> Result<Shipment, RepositoryError>;

    /// Whether another shipment already uses `tracking_number`.
    ///
    /// `except` excludes the shipment being updated. Callers check this
    /// before appending an event; the unique constraint still backs it up.
    async fn tracking_number_taken(
        &self,
        tracking_number: &TrackingNumber,
        except: Option<ShipmentId>,
    ) -> Result<bool, RepositoryError>;

    /// Delete a shipment.
    ///
    /// # Errors
    ///
    /// `NotFound` if no shipment has this ID.
    async fn delete(&self, id: ShipmentId) -> Result<(), RepositoryError>;

    /// List shipments matching `filter`, newest first.
    async fn list(&self, filter: &ShipmentFilter) -> Result<Vec<Shipment>, RepositoryError>;

    /// Check the store is reachable.
    async fn ping(&self) -> Result<(), RepositoryError>;

    /// Release connections. Called once during shutdown.
    async fn close(&self) {}
}

/// Append-only storage for shipment events.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Append an event; the store assigns its ID and timestamp.
    async fn append(&self, event: NewEvent) -> Result<Event, RepositoryError>;

    /// Events for one shipment inside `range`, oldest first.
    fn query(&self, shipment_id: ShipmentId, range: TimeRange) -> EventStream<'_>;

    /// The `limit` most recent events across all shipments, newest first.
    async fn recent(&self, limit: u32) -> Result<Vec<Event>, RepositoryError>;

    /// Check the store is reachable.
    async fn ping(&self) -> Result<(), RepositoryError>;

    /// Release connections. Called once during shutdown.
    async fn close(&self) {}
}

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Arguments
///
/// * `database_url` - `PostgreSQL` connection string (wrapped in `SecretString`)
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &secrecy::SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}

/// Map a unique-constraint violation to `Conflict`, everything else to `Database`.
pub(crate) fn map_unique_violation(err: sqlx::Error, what: &str) -> RepositoryError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            RepositoryError::Conflict(format!("{what} already exists"))
        }
        _ => RepositoryError::Database(err),
    }
}
