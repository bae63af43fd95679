//! Integration test harness for Waybill.
//!
//! Builds the real router over in-memory stores with fake identity and
//! geocoding collaborators, then drives it with `tower::ServiceExt::oneshot`.
//! No network or database is needed.
//!
//! # Identities
//!
//! | Token              | Identity                 | Whitelisted |
//! |--------------------|--------------------------|-------------|
//! | [`OPS_TOKEN`]      | `ops@example.com`        | yes         |
//! | [`DOMAIN_TOKEN`]   | `dispatch@waybill.test`  | yes (domain)|
//! | [`STRANGER_TOKEN`] | `stranger@elsewhere.org` | no          |
//! | [`OUTAGE_TOKEN`]   | provider unreachable     | -           |
//! | anything else      | invalid token            | -           |

use std::sync::Arc;

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{HeaderMap, Method, Request, StatusCode, header};
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

use waybill_core::{Address, Coordinates, Email, Event, NewEvent, ShipmentId, TimeRange};
use waybill_server::db::{
    EventStore, EventStream, MemoryEventStore, MemoryShipmentStore, RepositoryError,
};
use waybill_server::services::geocoding::Distance;
use waybill_server::services::{
    Geocoder, GeocodingError, IdentityError, IdentityProvider, Place, VerifiedIdentity, Whitelist,
};
use waybill_server::{AccessPolicy, AppState};

pub const OPS_TOKEN: &str = "token-ops";
pub const DOMAIN_TOKEN: &str = "token-dispatch";
pub const STRANGER_TOKEN: &str = "token-stranger";
pub const OUTAGE_TOKEN: &str = "token-outage";

/// Whitelist used by every test context.
pub const WHITELIST: &str = "ops@example.com, @waybill.test";

/// Addresses containing this marker fail to geocode.
pub const UNKNOWN_PLACE: &str = "Atlantis";

// =============================================================================
// Fakes
// =============================================================================

/// Identity provider with a fixed token table.
pub struct StaticIdentityProvider;

#[async_trait]
impl IdentityProvider for StaticIdentityProvider {
    async fn verify(&self, token: &str) -> Result<VerifiedIdentity, IdentityError> {
        let email = match token {
            OPS_TOKEN => "ops@example.com",
            DOMAIN_TOKEN => "dispatch@waybill.test",
            STRANGER_TOKEN => "stranger@elsewhere.org",
            OUTAGE_TOKEN => {
                return Err(IdentityError::Unavailable("connection refused".to_string()));
            }
            _ => return Err(IdentityError::InvalidToken),
        };
        Ok(VerifiedIdentity {
            uid: format!("uid-{token}"),
            email: Email::parse(email).map_err(|_| IdentityError::NoEmail)?,
        })
    }
}

/// Geocoder that derives coordinates from the address length.
pub struct FakeGeocoder;

impl FakeGeocoder {
    pub const DISTANCE_KM: f64 = 12.34;
    pub const DURATION_MINUTES: f64 = 15.5;
}

#[async_trait]
impl Geocoder for FakeGeocoder {
    async fn geocode(&self, address: &Address) -> Result<Place, GeocodingError> {
        if address.as_str().contains(UNKNOWN_PLACE) {
            return Err(GeocodingError::Api {
                status: "ZERO_RESULTS".to_string(),
                message: None,
            });
        }
        #[allow(clippy::cast_precision_loss)]
        let n = address.as_str().len() as f64;
        Ok(Place {
            query: address.as_str().to_string(),
            formatted_address: format!("{}, Testland", address.as_str()),
            coordinates: Coordinates { lat: n, lng: -n },
        })
    }

    async fn distance(
        &self,
        origin: &Address,
        destination: &Address,
    ) -> Result<Distance, GeocodingError> {
        if origin.as_str().contains(UNKNOWN_PLACE) || destination.as_str().contains(UNKNOWN_PLACE) {
            return Err(GeocodingError::NoResult("distance matrix".to_string()));
        }
        Ok(Distance {
            distance_km: Self::DISTANCE_KM,
            duration_minutes: Self::DURATION_MINUTES,
        })
    }
}

/// Event store whose writes always fail; reads delegate to an empty log.
#[derive(Default)]
pub struct UnreachableEventStore {
    inner: MemoryEventStore,
}

#[async_trait]
impl EventStore for UnreachableEventStore {
    async fn append(&self, _event: NewEvent) -> Result<Event, RepositoryError> {
        Err(RepositoryError::Database(sqlx::Error::PoolTimedOut))
    }

    fn query(&self, shipment_id: ShipmentId, range: TimeRange) -> EventStream<'_> {
        self.inner.query(shipment_id, range)
    }

    async fn recent(&self, limit: u32) -> Result<Vec<Event>, RepositoryError> {
        self.inner.recent(limit).await
    }

    async fn ping(&self) -> Result<(), RepositoryError> {
        Err(RepositoryError::Database(sqlx::Error::PoolTimedOut))
    }
}

// =============================================================================
// Test context
// =============================================================================

/// A router plus handles on its stores for asserting side effects.
pub struct TestContext {
    pub shipments: Arc<MemoryShipmentStore>,
    pub events: Arc<MemoryEventStore>,
    router: Router,
}

/// Options for [`TestContext`].
#[derive(Default)]
pub struct TestOptions {
    pub public_reads: bool,
    pub geocoding: bool,
    /// Replace the event store with one that rejects every write.
    pub events_down: bool,
}

/// Response status, headers and JSON body (`Null` when empty, a string when
/// the body is not JSON).
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

impl TestContext {
    /// Default context: auth required for reads, geocoding enabled.
    pub fn new() -> Self {
        Self::with_options(TestOptions {
            geocoding: true,
            ..TestOptions::default()
        })
    }

    pub fn with_options(options: TestOptions) -> Self {
        let shipments = Arc::new(MemoryShipmentStore::new());
        let events = Arc::new(MemoryEventStore::new());

        let event_store: Arc<dyn EventStore> = if options.events_down {
            Arc::new(UnreachableEventStore::default())
        } else {
            events.clone()
        };
        let geocoder: Option<Arc<dyn Geocoder>> = options
            .geocoding
            .then(|| Arc::new(FakeGeocoder) as Arc<dyn Geocoder>);

        let state = AppState::new(
            shipments.clone(),
            event_store,
            Arc::new(StaticIdentityProvider),
            geocoder,
            AccessPolicy {
                whitelist: Whitelist::parse(WHITELIST).expect("valid test whitelist"),
                public_reads: options.public_reads,
            },
        );

        Self {
            shipments,
            events,
            router: waybill_server::app(state),
        }
    }

    /// Send a request and collect the response.
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> TestResponse {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let body = match body {
            Some(json) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };

        self.send(builder.body(body).expect("valid request")).await
    }

    /// Send a prebuilt request and collect the response.
    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("router is infallible");

        let status = response.status();
        let headers = response.headers().clone();
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("readable body")
            .to_bytes();

        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
        };

        TestResponse {
            status,
            headers,
            body,
        }
    }

    pub async fn get(&self, uri: &str, token: Option<&str>) -> TestResponse {
        self.request(Method::GET, uri, token, None).await
    }

    pub async fn post(&self, uri: &str, token: Option<&str>, body: Value) -> TestResponse {
        self.request(Method::POST, uri, token, Some(body)).await
    }

    pub async fn put(&self, uri: &str, token: Option<&str>, body: Value) -> TestResponse {
        self.request(Method::PUT, uri, token, Some(body)).await
    }

    pub async fn delete(&self, uri: &str, token: Option<&str>) -> TestResponse {
        self.request(Method::DELETE, uri, token, None).await
    }

    /// Create a shipment as the ops user and return its JSON.
    pub async fn create_shipment(&self, origin: &str, destination: &str) -> Value {
        let response = self
            .post(
                "/shipments",
                Some(OPS_TOKEN),
                serde_json::json!({ "origin": origin, "destination": destination }),
            )
            .await;
        assert_eq!(response.status, StatusCode::CREATED, "{}", response.body);
        response.body
    }

    /// Number of events in the log.
    pub async fn event_count(&self) -> usize {
        self.events.len().await
    }
}

impl Default for TestContext {
    fn default() -> Self {
        Self::new()
    }
}
