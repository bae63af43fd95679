//! Database migration commands.
//!
//! # Environment Variables
//!
//! - `WAYBILL_DATABASE_URL` (or `DATABASE_URL`) - shipments database
//! - `EVENTS_DATABASE_URL` - event log database
//!
//! # Migration Files
//!
//! Shipment migrations: `crates/server/migrations/shipments/`
//! Event log migrations: `crates/server/migrations/events/`
//!
//! Both sets are embedded at compile time with `sqlx::migrate!`.

use secrecy::SecretString;

use waybill_server::db::create_pool;

#[derive(Debug, thiserror::Error)]
pub enum MigrationError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(&'static str),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// Read `primary`, falling back to `fallback` when unset or empty.
fn database_url(
    primary: &'static str,
    fallback: Option<&'static str>,
) -> Result<SecretString, MigrationError> {
    // Load .env file if present (ignore errors if not found)
    dotenvy::dotenv().ok();

    std::iter::once(primary)
        .chain(fallback)
        .find_map(|key| std::env::var(key).ok().filter(|v| !v.trim().is_empty()))
        .map(SecretString::from)
        .ok_or(MigrationError::MissingEnvVar(primary))
}

/// Run shipment database migrations.
///
/// # Errors
///
/// Returns an error if the URL is missing, the database is unreachable or a
/// migration fails.
pub async fn shipments() -> Result<(), MigrationError> {
    let url = database_url("WAYBILL_DATABASE_URL", Some("DATABASE_URL"))?;

    tracing::info!("Connecting to shipments database...");
    let pool = create_pool(&url).await?;

    tracing::info!("Running shipments migrations...");
    sqlx::migrate!("../server/migrations/shipments")
        .run(&pool)
        .await?;
    pool.close().await;

    tracing::info!("Shipments migrations complete");
    Ok(())
}

/// Run event log database migrations.
///
/// # Errors
///
/// Returns an error if the URL is missing, the database is unreachable or a
/// migration fails.
pub async fn events() -> Result<(), MigrationError> {
    let url = database_url("EVENTS_DATABASE_URL", None)?;

    tracing::info!("Connecting to events database...");
    let pool = create_pool(&url).await?;

    tracing::info!("Running events migrations...");
    sqlx::migrate!("../server/migrations/events")
        .run(&pool)
        .await?;
    pool.close().await;

    tracing::info!("Events migrations complete");
    Ok(())
}
