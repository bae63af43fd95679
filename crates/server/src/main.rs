//! Waybill server - shipment tracking HTTP API.
//!
//! This binary serves the JSON API on `WAYBILL_HOST:WAYBILL_PORT`
//! (default `127.0.0.1:8080`).
//!
//! # Architecture
//!
//! - Axum web framework, JSON in and out
//! - `PostgreSQL` for shipments and, in a second database, the event log
//!   (or in-memory stores with `WAYBILL_STORAGE=memory`)
//! - Firebase Identity Toolkit for bearer token verification
//! - Google Maps Geocoding and Distance Matrix APIs for route estimates

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::sync::Arc;

use sentry::integrations::tracing as sentry_tracing;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use waybill_server::config::{LogFormat, ServerConfig, StorageConfig};
use waybill_server::db::{
    self, EventStore, MemoryEventStore, MemoryShipmentStore, PgEventStore, PgShipmentStore,
    ShipmentStore,
};
use waybill_server::services::{Geocoder, GoogleMapsGeocoder, IdentityToolkitProvider};
use waybill_server::{AccessPolicy, AppState};

/// Initialize Sentry error tracking and return guard that must be kept alive.
fn init_sentry(config: &ServerConfig) -> Option<sentry::ClientInitGuard> {
    let dsn = config.sentry.dsn.as_ref()?;

    let guard = sentry::init((
        dsn.as_str(),
        sentry::ClientOptions {
            release: sentry::release_name!(),
            environment: config
                .sentry
                .environment
                .clone()
                .map(std::borrow::Cow::Owned),
            sample_rate: config.sentry.sample_rate,
            traces_sample_rate: config.sentry.traces_sample_rate,
            attach_stacktrace: true,
            ..Default::default()
        },
    ));

    tracing::info!("Sentry initialized");
    Some(guard)
}

/// Filter tracing events to Sentry event types.
fn sentry_event_filter(metadata: &tracing::Metadata<'_>) -> sentry_tracing::EventFilter {
    match *metadata.level() {
        tracing::Level::ERROR | tracing::Level::WARN => sentry_tracing::EventFilter::Event,
        tracing::Level::INFO | tracing::Level::DEBUG => sentry_tracing::EventFilter::Breadcrumb,
        _ => sentry_tracing::EventFilter::Ignore,
    }
}

/// Connect the configured stores.
async fn build_stores(storage: &StorageConfig) -> (Arc<dyn ShipmentStore>, Arc<dyn EventStore>) {
    match storage {
        StorageConfig::Postgres {
            shipments_url,
            events_url,
        } => {
            let shipments_pool = db::create_pool(shipments_url)
                .await
                .expect("Failed to create shipments database pool");
            let events_pool = db::create_pool(events_url)
                .await
                .expect("Failed to create events database pool");
            tracing::info!("Database pools created");

            (
                Arc::new(PgShipmentStore::new(shipments_pool)),
                Arc::new(PgEventStore::new(events_pool)),
            )
        }
        StorageConfig::Memory => {
            tracing::warn!("Using in-memory storage; data will not survive a restart");
            (
                Arc::new(MemoryShipmentStore::new()),
                Arc::new(MemoryEventStore::new()),
            )
        }
    }
}

#[tokio::main]
async fn main() {
    // Load configuration from environment (needed for Sentry init)
    let config = ServerConfig::from_env().expect("Failed to load configuration");

    // Initialize Sentry (must be done before tracing subscriber)
    let _sentry_guard = init_sentry(&config);

    // Defaults to info level for our crate if RUST_LOG is not set
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "waybill_server=info,tower_http=debug".into());

    let is_json = config.log_format == LogFormat::Json;
    let json_layer = is_json.then(|| tracing_subscriber::fmt::layer().json().flatten_event(true));
    let text_layer = (!is_json).then(tracing_subscriber::fmt::layer);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(json_layer)
        .with(text_layer)
        .with(sentry_tracing::layer().event_filter(sentry_event_filter))
        .init();

    // NOTE: Migrations are NOT run automatically on startup.
    // Run them explicitly via: cargo run -p waybill-cli -- migrate all
    let (shipments, events) = build_stores(&config.storage).await;

    let identity = IdentityToolkitProvider::new(&config.identity)
        .expect("Failed to create identity provider client");
    tracing::info!(project = %config.identity.project_id, "Identity provider configured");

    let geocoder: Option<Arc<dyn Geocoder>> = match &config.geocoding_api_key {
        Some(key) => Some(Arc::new(
            GoogleMapsGeocoder::new(key.clone()).expect("Failed to create geocoding client"),
        )),
        None => {
            tracing::warn!("GOOGLE_MAPS_API_KEY not set; route enrichment disabled");
            None
        }
    };

    if config.whitelist.is_empty() {
        tracing::warn!("WAYBILL_WHITELIST is empty; every authenticated request will be forbidden");
    } else {
        tracing::info!(entries = config.whitelist.len(), "Whitelist loaded");
    }

    let state = AppState::new(
        shipments,
        events,
        Arc::new(identity),
        geocoder,
        AccessPolicy {
            whitelist: config.whitelist.clone(),
            public_reads: config.public_reads,
        },
    );

    let app = waybill_server::app(state.clone())
        // Sentry layers (outermost for full request coverage)
        .layer(sentry_tower::NewSentryLayer::new_from_top())
        .layer(sentry_tower::SentryHttpLayer::new().enable_transaction());

    let addr = config.socket_addr();
    tracing::info!("waybill listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    state.close().await;
    tracing::info!("Connection pools closed");
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("Shutdown signal received, starting graceful shutdown");
}
