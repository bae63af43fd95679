//! Address geocoding and road distance via the Google Maps web services.
//!
//! Geocode results are cached for an hour (`moka`), keyed by the normalized
//! address. Distance lookups are not cached since they depend on both
//! endpoints and are only made when a shipment's endpoints change.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use moka::future::Cache;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, instrument};
use url::Url;

use waybill_core::{Address, Coordinates, RouteEstimate};

const BASE_URL: &str = "https://maps.googleapis.com/maps/api";

/// Errors that can occur while resolving addresses or routes.
#[derive(Debug, Error)]
pub enum GeocodingError {
    /// No API key is configured.
    #[error("geocoding is not configured")]
    NotConfigured,

    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The API answered with a non-`OK` status.
    #[error("API error: {status}{}", message.as_deref().map(|m| format!(" - {m}")).unwrap_or_default())]
    Api {
        status: String,
        message: Option<String>,
    },

    /// The API answered `OK` but without a usable result.
    #[error("no result for {0}")]
    NoResult(String),

    /// Request URL could not be built.
    #[error("invalid request URL: {0}")]
    Url(#[from] url::ParseError),
}

/// A geocoded address.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Place {
    /// Address as supplied by the caller.
    pub query: String,
    pub formatted_address: String,
    pub coordinates: Coordinates,
}

/// Road distance between two addresses.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Distance {
    pub distance_km: f64,
    pub duration_minutes: f64,
}

/// Resolves addresses to coordinates and measures road distance.
#[async_trait]
pub trait Geocoder: Send + Sync {
    async fn geocode(&self, address: &Address) -> Result<Place, GeocodingError>;

    async fn distance(
        &self,
        origin: &Address,
        destination: &Address,
    ) -> Result<Distance, GeocodingError>;

    /// Geocode both endpoints and measure the road distance between them.
    async fn resolve_route(
        &self,
        origin: &Address,
        destination: &Address,
    ) -> Result<RouteEstimate, GeocodingError> {
        let (from, to, distance) = futures::try_join!(
            self.geocode(origin),
            self.geocode(destination),
            self.distance(origin, destination),
        )?;
        Ok(RouteEstimate {
            origin: from.coordinates,
            destination: to.coordinates,
            distance_km: distance.distance_km,
            duration_minutes: distance.duration_minutes,
        })
    }
}

// =============================================================================
// Google Maps client
// =============================================================================

/// Google Maps Geocoding and Distance Matrix client.
#[derive(Clone)]
pub struct GoogleMapsGeocoder {
    inner: Arc<GoogleMapsInner>,
}

struct GoogleMapsInner {
    client: reqwest::Client,
    base_url: String,
    api_key: SecretString,
    cache: Cache<String, Place>,
}

impl GoogleMapsGeocoder {
    /// Create a new client.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client fails to build.
    pub fn new(api_key: SecretString) -> Result<Self, GeocodingError> {
        Self::with_base_url(api_key, BASE_URL)
    }

    /// Create a client against a different API root (e.g. a local stub).
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client fails to build.
    pub fn with_base_url(api_key: SecretString, base_url: &str) -> Result<Self, GeocodingError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;

        let cache = Cache::builder()
            .max_capacity(10_000)
            .time_to_live(Duration::from_secs(3600)) // 1 hour
            .build();

        Ok(Self {
            inner: Arc::new(GoogleMapsInner {
                client,
                base_url: base_url.trim_end_matches('/').to_string(),
                api_key,
                cache,
            }),
        })
    }

    fn url(&self, service: &str, params: &[(&str, &str)]) -> Result<Url, GeocodingError> {
        let mut url = Url::parse_with_params(
            &format!("{}/{service}/json", self.inner.base_url),
            params,
        )?;
        url.query_pairs_mut()
            .append_pair("key", self.inner.api_key.expose_secret());
        Ok(url)
    }

    async fn fetch<T: serde::de::DeserializeOwned>(&self, url: Url) -> Result<T, GeocodingError> {
        let response = self.inner.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(GeocodingError::Api {
                status: format!("HTTP {}", status.as_u16()),
                message: None,
            });
        }
        Ok(response.json().await?)
    }
}

#[async_trait]
impl Geocoder for GoogleMapsGeocoder {
    #[instrument(skip(self), fields(address = %address))]
    async fn geocode(&self, address: &Address) -> Result<Place, GeocodingError> {
        let key = address.as_str().to_lowercase();
        if let Some(place) = self.inner.cache.get(&key).await {
            debug!("geocode cache hit");
            return Ok(place);
        }

        let url = self.url("geocode", &[("address", address.as_str())])?;
        let body: GeocodeResponse = self.fetch(url).await?;
        let place = place_from_response(address.as_str(), body)?;

        self.inner.cache.insert(key, place.clone()).await;
        Ok(place)
    }

    #[instrument(skip(self), fields(origin = %origin, destination = %destination))]
    async fn distance(
        &self,
        origin: &Address,
        destination: &Address,
    ) -> Result<Distance, GeocodingError> {
        let url = self.url(
            "distancematrix",
            &[
                ("origins", origin.as_str()),
                ("destinations", destination.as_str()),
            ],
        )?;
        let body: DistanceMatrixResponse = self.fetch(url).await?;
        distance_from_response(body)
    }
}

// =============================================================================
// Response types
// =============================================================================

#[derive(Debug, Deserialize)]
struct GeocodeResponse {
    status: String,
    #[serde(default)]
    results: Vec<GeocodeResult>,
    error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeocodeResult {
    formatted_address: String,
    geometry: Geometry,
}

#[derive(Debug, Deserialize)]
struct Geometry {
    location: Coordinates,
}

#[derive(Debug, Deserialize)]
struct DistanceMatrixResponse {
    status: String,
    #[serde(default)]
    rows: Vec<MatrixRow>,
    error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MatrixRow {
    #[serde(default)]
    elements: Vec<MatrixElement>,
}

#[derive(Debug, Deserialize)]
struct MatrixElement {
    status: String,
    distance: Option<MatrixValue>,
    duration: Option<MatrixValue>,
}

#[derive(Debug, Deserialize)]
struct MatrixValue {
    value: f64,
}

fn place_from_response(query: &str, body: GeocodeResponse) -> Result<Place, GeocodingError> {
    if body.status != "OK" {
        return Err(GeocodingError::Api {
            status: body.status,
            message: body.error_message,
        });
    }
    let first = body
        .results
        .into_iter()
        .next()
        .ok_or_else(|| GeocodingError::NoResult(query.to_string()))?;
    Ok(Place {
        query: query.to_string(),
        formatted_address: first.formatted_address,
        coordinates: first.geometry.location,
    })
}

fn distance_from_response(body: DistanceMatrixResponse) -> Result<Distance, GeocodingError> {
    if body.status != "OK" {
        return Err(GeocodingError::Api {
            status: body.status,
            message: body.error_message,
        });
    }
    let element = body
        .rows
        .into_iter()
        .next()
        .and_then(|row| row.elements.into_iter().next())
        .ok_or_else(|| GeocodingError::NoResult("distance matrix".to_string()))?;

    // Element-level status, e.g. ZERO_RESULTS when no road route exists
    if element.status != "OK" {
        return Err(GeocodingError::Api {
            status: element.status,
            message: None,
        });
    }

    match (element.distance, element.duration) {
        (Some(distance), Some(duration)) => Ok(Distance {
            distance_km: round2(distance.value / 1000.0),
            duration_minutes: round2(duration.value / 60.0),
        }),
        _ => Err(GeocodingError::NoResult("distance matrix".to_string())),
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_place_from_ok_response() {
        let body: GeocodeResponse = serde_json::from_str(
            r#"{"status":"OK","results":[
                {"formatted_address":"London, UK","geometry":{"location":{"lat":51.5074,"lng":-0.1278}}},
                {"formatted_address":"London, ON, Canada","geometry":{"location":{"lat":42.98,"lng":-81.24}}}
            ]}"#,
        )
        .unwrap();
        let place = place_from_response("london", body).unwrap();
        assert_eq!(place.formatted_address, "London, UK");
        assert!((place.coordinates.lat - 51.5074).abs() < f64::EPSILON);
        assert_eq!(place.query, "london");
    }

    #[test]
    fn test_place_from_error_status() {
        let body: GeocodeResponse = serde_json::from_str(
            r#"{"status":"REQUEST_DENIED","results":[],"error_message":"The provided API key is invalid."}"#,
        )
        .unwrap();
        let err = place_from_response("x", body).unwrap_err();
        assert!(matches!(err, GeocodingError::Api { ref status, .. } if status == "REQUEST_DENIED"));
        assert!(err.to_string().contains("API key is invalid"));
    }

    #[test]
    fn test_place_from_zero_results() {
        let body: GeocodeResponse =
            serde_json::from_str(r#"{"status":"ZERO_RESULTS","results":[]}"#).unwrap();
        assert!(place_from_response("nowhere", body).is_err());
    }

    #[test]
    fn test_distance_converts_and_rounds() {
        let body: DistanceMatrixResponse = serde_json::from_str(
            r#"{"status":"OK","rows":[{"elements":[{"status":"OK",
                "distance":{"text":"343 km","value":343456},
                "duration":{"text":"4 hours","value":14523}}]}]}"#,
        )
        .unwrap();
        let distance = distance_from_response(body).unwrap();
        assert!((distance.distance_km - 343.46).abs() < 1e-9);
        assert!((distance.duration_minutes - 242.05).abs() < 1e-9);
    }

    #[test]
    fn test_distance_element_without_route() {
        let body: DistanceMatrixResponse = serde_json::from_str(
            r#"{"status":"OK","rows":[{"elements":[{"status":"ZERO_RESULTS"}]}]}"#,
        )
        .unwrap();
        let err = distance_from_response(body).unwrap_err();
        assert!(matches!(err, GeocodingError::Api { ref status, .. } if status == "ZERO_RESULTS"));
    }

    #[test]
    fn test_request_url_carries_key() {
        let geocoder =
            GoogleMapsGeocoder::with_base_url(SecretString::from("k3y"), "http://localhost:9/api/")
                .unwrap();
        let url = geocoder
            .url("geocode", &[("address", "10 Downing St, London")])
            .unwrap();
        assert_eq!(url.path(), "/api/geocode/json");
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert_eq!(
            pairs,
            [
                ("address".to_string(), "10 Downing St, London".to_string()),
                ("key".to_string(), "k3y".to_string()),
            ]
        );
    }
}
