//! In-memory stores for `WAYBILL_STORAGE=memory` and tests.
//!
//! Both keep records in insertion order behind a `tokio::sync::RwLock`.
//! Nothing is persisted.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use waybill_core::{
    Event, EventId, NewEvent, NewShipment, Shipment, ShipmentChanges, ShipmentFilter, ShipmentId,
    TimeRange, TrackingNumber,
};

use super::{EventStore, EventStream, RepositoryError, ShipmentStore};

/// Shipment store held in process memory.
#[derive(Default)]
pub struct MemoryShipmentStore {
    shipments: RwLock<HashMap<ShipmentId, Shipment>>,
}

impl MemoryShipmentStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored shipments.
    pub async fn len(&self) -> usize {
        self.shipments.read().await.len()
    }
}

fn tracking_taken(
    shipments: &HashMap<ShipmentId, Shipment>,
    tracking_number: &TrackingNumber,
    except: Option<ShipmentId>,
) -> bool {
    shipments
        .values()
        .any(|s| &s.tracking_number == tracking_number && Some(s.id) != except)
}

#[async_trait]
impl ShipmentStore for MemoryShipmentStore {
    async fn create(&self, new: NewShipment) -> Result<Shipment, RepositoryError> {
        let mut shipments = self.shipments.write().await;
        if shipments.contains_key(&new.id) {
            return Err(RepositoryError::Conflict(format!("shipment {} already exists", new.id)));
        }
        if tracking_taken(&shipments, &new.tracking_number, None) {
            return Err(RepositoryError::Conflict(
                "tracking number already exists".to_string(),
            ));
        }

        let now = Utc::now();
        let shipment = Shipment {
            id: new.id,
            tracking_number: new.tracking_number,
            origin: new.origin,
            destination: new.destination,
            status: new.status,
            route: new.route,
            created_at: now,
            updated_at: now,
        };
        shipments.insert(shipment.id, shipment.clone());
        Ok(shipment)
    }

    async fn get(&self, id: ShipmentId) -> Result<Option<Shipment>, RepositoryError> {
        Ok(self.shipments.read().await.get(&id).cloned())
    }

    async fn update(
        &self,
        id: ShipmentId,
        changes: &ShipmentChanges,
    ) -> Result<Shipment, RepositoryError> {
        let mut shipments = self.shipments.write().await;
        if let Some(tracking_number) = &changes.tracking_number
            && tracking_taken(&shipments, tracking_number, Some(id))
        {
            return Err(RepositoryError::Conflict(
                "tracking number already exists".to_string(),
            ));
        }

        let shipment = shipments.get_mut(&id).ok_or(RepositoryError::NotFound)?;
        shipment.apply(changes, Utc::now());
        Ok(shipment.clone())
    }

    async fn tracking_number_taken(
        &self,
        tracking_number: &TrackingNumber,
        except: Option<ShipmentId>,
    ) -> Result<bool, RepositoryError> {
        Ok(tracking_taken(
            &*self.shipments.read().await,
            tracking_number,
            except,
        ))
    }

    async fn delete(&self, id: ShipmentId) -> Result<(), RepositoryError> {
        self.shipments
            .write()
            .await
            .remove(&id)
            .map(|_| ())
            .ok_or(RepositoryError::NotFound)
    }

    async fn list(&self, filter: &ShipmentFilter) -> Result<Vec<Shipment>, RepositoryError> {
        let shipments = self.shipments.read().await;
        let mut matching: Vec<&Shipment> = shipments.values().filter(|s| filter.matches(s)).collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));

        Ok(matching
            .into_iter()
            .skip(filter.offset as usize)
            .take(filter.limit as usize)
            .cloned()
            .collect())
    }

    async fn ping(&self) -> Result<(), RepositoryError> {
        Ok(())
    }
}

/// Event log held in process memory.
#[derive(Default)]
pub struct MemoryEventStore {
    events: RwLock<Vec<Event>>,
}

impl MemoryEventStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of appended events.
    pub async fn len(&self) -> usize {
        self.events.read().await.len()
    }
}

#[async_trait]
impl EventStore for MemoryEventStore {
    async fn append(&self, new: NewEvent) -> Result<Event, RepositoryError> {
        let mut events = self.events.write().await;

        // Never let a later append sort before an earlier one
        let now = Utc::now();
        let occurred_at = events.last().map_or(now, |last| last.occurred_at.max(now));

        let event = Event {
            id: EventId::generate(),
            shipment_id: new.shipment_id,
            kind: new.kind,
            payload: new.payload,
            actor: new.actor,
            occurred_at,
        };
        events.push(event.clone());
        Ok(event)
    }

    fn query(&self, shipment_id: ShipmentId, range: TimeRange) -> EventStream<'_> {
        Box::pin(snapshot_stream(self, shipment_id, range))
    }

    async fn recent(&self, limit: u32) -> Result<Vec<Event>, RepositoryError> {
        let events = self.events.read().await;
        Ok(events.iter().rev().take(limit as usize).cloned().collect())
    }

    async fn ping(&self) -> Result<(), RepositoryError> {
        Ok(())
    }
}

/// Snapshot matching events under the read lock, then yield them.
fn snapshot_stream(
    store: &MemoryEventStore,
    shipment_id: ShipmentId,
    range: TimeRange,
) -> impl futures::Stream<Item = Result<Event, RepositoryError>> + Send + '_ {
    use futures::StreamExt;

    futures::stream::once(async move {
        let events = store.events.read().await;
        let matching: Vec<_> = events
            .iter()
            .filter(|e| e.shipment_id == shipment_id && range.contains(e.occurred_at))
            .cloned()
            .map(Ok)
            .collect();
        futures::stream::iter(matching)
    })
    .flatten()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use futures::TryStreamExt;
    use waybill_core::{EventKind, ShipmentInput, ShipmentStatus};

    use super::*;

    fn new_shipment(origin: &str) -> NewShipment {
        ShipmentInput {
            origin: Some(origin.to_string()),
            destination: Some("Rotterdam".to_string()),
            ..ShipmentInput::default()
        }
        .into_new_shipment(Utc::now())
        .unwrap()
    }

    fn note(shipment_id: ShipmentId, n: u32) -> NewEvent {
        NewEvent {
            shipment_id,
            kind: EventKind::Note,
            payload: serde_json::json!({ "n": n }),
            actor: None,
        }
    }

    #[tokio::test]
    async fn test_shipment_crud() {
        let store = MemoryShipmentStore::new();
        let created = store.create(new_shipment("Hamburg")).await.unwrap();
        assert_eq!(store.get(created.id).await.unwrap().unwrap(), created);

        let changes = ShipmentChanges {
            status: Some(ShipmentStatus::Delivered),
            ..ShipmentChanges::default()
        };
        let updated = store.update(created.id, &changes).await.unwrap();
        assert_eq!(updated.status, ShipmentStatus::Delivered);
        assert_eq!(updated.origin, created.origin);

        store.delete(created.id).await.unwrap();
        assert!(store.get(created.id).await.unwrap().is_none());
        assert!(matches!(
            store.delete(created.id).await,
            Err(RepositoryError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_duplicate_tracking_number_conflicts() {
        let store = MemoryShipmentStore::new();
        let first = store.create(new_shipment("Hamburg")).await.unwrap();

        let mut second = new_shipment("Bremen");
        second.tracking_number = first.tracking_number.clone();
        assert!(matches!(
            store.create(second).await,
            Err(RepositoryError::Conflict(_))
        ));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_tracking_number_taken_skips_excepted_shipment() {
        let store = MemoryShipmentStore::new();
        let first = store.create(new_shipment("Hamburg")).await.unwrap();
        let tracking = first.tracking_number.clone();

        assert!(store.tracking_number_taken(&tracking, None).await.unwrap());
        assert!(
            !store
                .tracking_number_taken(&tracking, Some(first.id))
                .await
                .unwrap()
        );
        assert!(
            !store
                .tracking_number_taken(&TrackingNumber::parse("FREE-1").unwrap(), None)
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn test_update_missing_is_not_found() {
        let store = MemoryShipmentStore::new();
        let changes = ShipmentChanges {
            status: Some(ShipmentStatus::Cancelled),
            ..ShipmentChanges::default()
        };
        assert!(matches!(
            store.update(ShipmentId::generate(), &changes).await,
            Err(RepositoryError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_list_pages_and_filters() {
        let store = MemoryShipmentStore::new();
        for origin in ["Antwerp", "Bordeaux", "Calais", "Dover"] {
            store.create(new_shipment(origin)).await.unwrap();
        }

        let all = store.list(&ShipmentFilter::default()).await.unwrap();
        assert_eq!(all.len(), 4);
        assert!(all.windows(2).all(|w| w[0].created_at >= w[1].created_at));

        let page = store
            .list(&ShipmentFilter {
                limit: 2,
                offset: 3,
                ..ShipmentFilter::default()
            })
            .await
            .unwrap();
        assert_eq!(page.len(), 1);

        let searched = store
            .list(&ShipmentFilter {
                search: Some("calais".to_string()),
                ..ShipmentFilter::default()
            })
            .await
            .unwrap();
        assert_eq!(searched.len(), 1);
        assert_eq!(searched[0].origin.as_str(), "Calais");
    }

    #[tokio::test]
    async fn test_events_query_in_order_and_range() {
        let store = MemoryEventStore::new();
        let shipment = ShipmentId::generate();
        let other = ShipmentId::generate();

        let mut appended = Vec::new();
        for n in 0..5 {
            appended.push(store.append(note(shipment, n)).await.unwrap());
            store.append(note(other, n)).await.unwrap();
        }

        let all: Vec<Event> = store
            .query(shipment, TimeRange::default())
            .try_collect()
            .await
            .unwrap();
        assert_eq!(all, appended);

        let to = appended[3].occurred_at;
        let window: Vec<Event> = store
            .query(shipment, TimeRange::new(None, Some(to)).unwrap())
            .try_collect()
            .await
            .unwrap();
        assert!(window.iter().all(|e| e.occurred_at < to));
    }

    #[tokio::test]
    async fn test_recent_is_newest_first() {
        let store = MemoryEventStore::new();
        let shipment = ShipmentId::generate();
        for n in 0..3 {
            store.append(note(shipment, n)).await.unwrap();
        }

        let recent = store.recent(2).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].payload["n"], 2);
        assert_eq!(recent[1].payload["n"], 1);
    }
}
