//! Application state shared across handlers.

use std::sync::Arc;

use waybill_core::Email;

use crate::db::{EventStore, ShipmentStore};
use crate::services::geocoding::Geocoder;
use crate::services::identity::{IdentityProvider, Whitelist};

/// Who may do what once authenticated.
#[derive(Debug, Clone, Default)]
pub struct AccessPolicy {
    pub whitelist: Whitelist,
    /// Let unauthenticated callers use the read-only shipment and event routes.
    pub public_reads: bool,
}

impl AccessPolicy {
    #[must_use]
    pub fn permits(&self, email: &Email) -> bool {
        self.whitelist.contains(email)
    }
}

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc` and provides access to the
/// stores, the external collaborators and the access policy.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    shipments: Arc<dyn ShipmentStore>,
    events: Arc<dyn EventStore>,
    identity: Arc<dyn IdentityProvider>,
    geocoder: Option<Arc<dyn Geocoder>>,
    policy: AccessPolicy,
}

impl AppState {
    /// Create a new application state.
    ///
    /// # Arguments
    ///
    /// * `shipments` - Relational shipment store
    /// * `events` - Event log store
    /// * `identity` - Bearer token verifier
    /// * `geocoder` - Route enrichment; `None` disables it
    /// * `policy` - Whitelist and public-read settings
    #[must_use]
    pub fn new(
        shipments: Arc<dyn ShipmentStore>,
        events: Arc<dyn EventStore>,
        identity: Arc<dyn IdentityProvider>,
        geocoder: Option<Arc<dyn Geocoder>>,
        policy: AccessPolicy,
    ) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                shipments,
                events,
                identity,
                geocoder,
                policy,
            }),
        }
    }

    #[must_use]
    pub fn shipments(&self) -> &dyn ShipmentStore {
        self.inner.shipments.as_ref()
    }

    #[must_use]
    pub fn events(&self) -> &dyn EventStore {
        self.inner.events.as_ref()
    }

    #[must_use]
    pub fn identity(&self) -> &dyn IdentityProvider {
        self.inner.identity.as_ref()
    }

    /// The geocoder, if one is configured.
    #[must_use]
    pub fn geocoder(&self) -> Option<&dyn Geocoder> {
        self.inner.geocoder.as_deref()
    }

    #[must_use]
    pub fn policy(&self) -> &AccessPolicy {
        &self.inner.policy
    }

    /// Close both stores' connection pools.
    pub async fn close(&self) {
        self.inner.shipments.close().await;
        self.inner.events.close().await;
    }
}
