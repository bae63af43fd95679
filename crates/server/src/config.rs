//! Server configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `DATABASE_URL` (or `WAYBILL_DATABASE_URL`) - shipments `PostgreSQL` connection string
//! - `EVENTS_DATABASE_URL` - event log store connection string
//! - `IDENTITY_CREDENTIALS_PATH` - identity provider credential bundle (JSON)
//!
//! The two database URLs are not required when `WAYBILL_STORAGE=memory`.
//!
//! ## Optional
//! - `WAYBILL_STORAGE` - `postgres` (default) or `memory`
//! - `WAYBILL_HOST` - Bind address (default: 127.0.0.1)
//! - `WAYBILL_PORT` - Listen port (default: 8080)
//! - `WAYBILL_WHITELIST` - Comma-separated emails or `@domain` entries
//! - `WAYBILL_PUBLIC_READS` - Skip auth on read-only routes (default: false)
//! - `WAYBILL_LOG_FORMAT` - `text` (default) or `json`
//! - `GOOGLE_MAPS_API_KEY` - Enables geocoding and distance enrichment
//! - `IDENTITY_ENDPOINT` - Identity Toolkit base URL (for the auth emulator)
//! - `SENTRY_DSN`, `SENTRY_ENVIRONMENT`, `SENTRY_SAMPLE_RATE`, `SENTRY_TRACES_SAMPLE_RATE`

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};

use secrecy::SecretString;
use serde::Deserialize;
use thiserror::Error;
use url::Url;

use crate::services::identity::{Whitelist, WhitelistError};

const DEFAULT_IDENTITY_ENDPOINT: &str = "https://identitytoolkit.googleapis.com";
const MIN_ENTROPY_BITS_PER_CHAR: f64 = 3.3;

/// Blocklist of common placeholder patterns (case-insensitive)
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-",
    "changeme",
    "replace",
    "placeholder",
    "example",
    "xxx",
    "todo",
    "insert",
    "put-your",
];

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Insecure secret in {0}: {1}")]
    InsecureSecret(String, String),
    #[error("Invalid environment variable WAYBILL_WHITELIST: {0}")]
    Whitelist(#[from] WhitelistError),
    #[error("Invalid credential bundle {0}: {1}")]
    CredentialBundle(PathBuf, #[source] BundleError),
}

/// Problems with the identity credential bundle or endpoint.
#[derive(Debug, Error)]
pub enum BundleError {
    #[error("unreadable: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("{0} is empty")]
    EmptyField(&'static str),
    #[error("bad identity endpoint: {0}")]
    Endpoint(#[from] url::ParseError),
}

/// Where shipments and events are persisted.
#[derive(Debug, Clone)]
pub enum StorageConfig {
    /// Two `PostgreSQL` databases, one per store.
    Postgres {
        shipments_url: SecretString,
        events_url: SecretString,
    },
    /// Process-local maps; data is lost on restart.
    Memory,
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Identity provider settings read from the credential bundle.
///
/// Implements `Debug` manually to redact the API key.
#[derive(Clone)]
pub struct IdentityConfig {
    pub project_id: String,
    pub api_key: SecretString,
    pub endpoint: Url,
}

impl std::fmt::Debug for IdentityConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityConfig")
            .field("project_id", &self.project_id)
            .field("api_key", &"[REDACTED]")
            .field("endpoint", &self.endpoint.as_str())
            .finish()
    }
}

/// On-disk layout of the identity credential bundle.
#[derive(Deserialize)]
struct CredentialBundle {
    project_id: String,
    api_key: String,
}

/// Sentry error tracking settings.
#[derive(Debug, Clone, Default)]
pub struct SentryConfig {
    pub dsn: Option<String>,
    pub environment: Option<String>,
    pub sample_rate: f32,
    pub traces_sample_rate: f32,
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    pub storage: StorageConfig,
    pub identity: IdentityConfig,
    /// Google Maps API key; geocoding is disabled when absent
    pub geocoding_api_key: Option<SecretString>,
    pub whitelist: Whitelist,
    /// Allow unauthenticated access to read-only routes
    pub public_reads: bool,
    pub log_format: LogFormat,
    pub sentry: SentryConfig,
}

impl ServerConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or invalid,
    /// if the credential bundle cannot be read, or if the geocoding key looks
    /// like a placeholder.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// See [`ServerConfig::from_env`].
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let env = Env(&lookup);

        let host = env.parsed::<IpAddr>("WAYBILL_HOST", "127.0.0.1")?;
        let port = env.parsed::<u16>("WAYBILL_PORT", "8080")?;

        let storage = match env.or_default("WAYBILL_STORAGE", "postgres").as_str() {
            "postgres" => StorageConfig::Postgres {
                shipments_url: env.secret_with_fallback("WAYBILL_DATABASE_URL", "DATABASE_URL")?,
                events_url: SecretString::from(env.required("EVENTS_DATABASE_URL")?),
            },
            "memory" => StorageConfig::Memory,
            other => {
                return Err(ConfigError::InvalidEnvVar(
                    "WAYBILL_STORAGE".to_string(),
                    format!("expected `postgres` or `memory`, got `{other}`"),
                ));
            }
        };

        let identity = IdentityConfig::load(
            Path::new(&env.required("IDENTITY_CREDENTIALS_PATH")?),
            &env.or_default("IDENTITY_ENDPOINT", DEFAULT_IDENTITY_ENDPOINT),
        )?;

        let geocoding_api_key = env
            .optional("GOOGLE_MAPS_API_KEY")
            .map(|key| validate_secret_strength(&key, "GOOGLE_MAPS_API_KEY").map(|()| key))
            .transpose()?
            .map(SecretString::from);

        let whitelist = Whitelist::parse(&env.or_default("WAYBILL_WHITELIST", ""))?;

        let public_reads = env.flag("WAYBILL_PUBLIC_READS")?;

        let log_format = match env.or_default("WAYBILL_LOG_FORMAT", "text").as_str() {
            "text" => LogFormat::Text,
            "json" => LogFormat::Json,
            other => {
                return Err(ConfigError::InvalidEnvVar(
                    "WAYBILL_LOG_FORMAT".to_string(),
                    format!("expected `text` or `json`, got `{other}`"),
                ));
            }
        };

        let sentry = SentryConfig {
            dsn: env.optional("SENTRY_DSN"),
            environment: env.optional("SENTRY_ENVIRONMENT"),
            sample_rate: env.parsed::<f32>("SENTRY_SAMPLE_RATE", "1.0")?,
            traces_sample_rate: env.parsed::<f32>("SENTRY_TRACES_SAMPLE_RATE", "0.0")?,
        };

        Ok(Self {
            host,
            port,
            storage,
            identity,
            geocoding_api_key,
            whitelist,
            public_reads,
            log_format,
            sentry,
        })
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

impl IdentityConfig {
    /// Read the credential bundle at `path`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::CredentialBundle` if the file is unreadable or
    /// malformed, or if `endpoint` is not a URL.
    pub fn load(path: &Path, endpoint: &str) -> Result<Self, ConfigError> {
        let bundle_error = |e: BundleError| ConfigError::CredentialBundle(path.to_path_buf(), e);
        let raw = std::fs::read_to_string(path).map_err(|e| bundle_error(e.into()))?;
        Self::from_bundle_json(&raw, endpoint).map_err(bundle_error)
    }

    /// The endpoint path always ends in `/` so relative API paths extend it.
    fn from_bundle_json(raw: &str, endpoint: &str) -> Result<Self, BundleError> {
        let bundle: CredentialBundle = serde_json::from_str(raw)?;
        if bundle.project_id.trim().is_empty() {
            return Err(BundleError::EmptyField("project_id"));
        }
        if bundle.api_key.trim().is_empty() {
            return Err(BundleError::EmptyField("api_key"));
        }
        let mut endpoint = Url::parse(endpoint)?;
        if !endpoint.path().ends_with('/') {
            let path = format!("{}/", endpoint.path());
            endpoint.set_path(&path);
        }
        Ok(Self {
            project_id: bundle.project_id,
            api_key: SecretString::from(bundle.api_key),
            endpoint,
        })
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Environment variable lookup with typed accessors.
struct Env<'a>(&'a dyn Fn(&str) -> Option<String>);

impl Env<'_> {
    fn optional(&self, key: &str) -> Option<String> {
        (self.0)(key).filter(|v| !v.trim().is_empty())
    }

    fn required(&self, key: &str) -> Result<String, ConfigError> {
        self.optional(key)
            .ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))
    }

    fn or_default(&self, key: &str, default: &str) -> String {
        self.optional(key).unwrap_or_else(|| default.to_string())
    }

    fn parsed<T>(&self, key: &str, default: &str) -> Result<T, ConfigError>
    where
        T: std::str::FromStr,
        T::Err: std::fmt::Display,
    {
        self.or_default(key, default)
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
    }

    fn flag(&self, key: &str) -> Result<bool, ConfigError> {
        match self.or_default(key, "false").to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            other => Err(ConfigError::InvalidEnvVar(
                key.to_string(),
                format!("expected a boolean, got `{other}`"),
            )),
        }
    }

    /// Read `primary_key`, falling back to the generic `fallback_key`.
    fn secret_with_fallback(
        &self,
        primary_key: &str,
        fallback_key: &str,
    ) -> Result<SecretString, ConfigError> {
        self.optional(primary_key)
            .or_else(|| self.optional(fallback_key))
            .map(SecretString::from)
            .ok_or_else(|| ConfigError::MissingEnvVar(primary_key.to_string()))
    }
}

/// Calculate Shannon entropy in bits per character.
fn shannon_entropy(s: &str) -> f64 {
    if s.is_empty() {
        return 0.0;
    }

    let mut freq: HashMap<char, usize> = HashMap::new();
    for c in s.chars() {
        *freq.entry(c).or_insert(0) += 1;
    }

    #[allow(clippy::cast_precision_loss)] // String length will never exceed f64 precision
    let len = s.chars().count() as f64;
    freq.values()
        .map(|&count| {
            #[allow(clippy::cast_precision_loss)]
            let p = count as f64 / len;
            -p * p.log2()
        })
        .sum()
}

/// Validate that a secret is not a placeholder and has sufficient entropy.
fn validate_secret_strength(secret: &str, var_name: &str) -> Result<(), ConfigError> {
    let lower = secret.to_lowercase();

    for pattern in PLACEHOLDER_PATTERNS {
        if lower.contains(pattern) {
            return Err(ConfigError::InsecureSecret(
                var_name.to_string(),
                format!("appears to be a placeholder (contains '{pattern}')"),
            ));
        }
    }

    let entropy = shannon_entropy(secret);
    if entropy < MIN_ENTROPY_BITS_PER_CHAR {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "entropy too low ({entropy:.2} bits/char, need >= {MIN_ENTROPY_BITS_PER_CHAR:.1})"
            ),
        ));
    }

    Ok(())
}
