//! Unified error handling with Sentry integration.
//!
//! Provides a unified `AppError` type that captures server-side errors to
//! Sentry before responding to the client. All route handlers return
//! `Result<T, AppError>`; the response body is always
//! `{"error": "<kind>", "message": "<text>"}`, plus `fields` for validation
//! failures.

use axum::{
    Json,
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use waybill_core::{FieldError, ValidationError};

use crate::db::RepositoryError;
use crate::services::geocoding::GeocodingError;
use crate::services::identity::IdentityError;

/// Application-level error type.
#[derive(Debug, Error)]
pub enum AppError {
    /// Request input failed validation.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Missing or invalid credential.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Authenticated but not whitelisted.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// A store could not be reached or rejected the operation.
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    /// The geocoding collaborator failed or is not configured.
    #[error("Geocoding unavailable: {0}")]
    GeocodingUnavailable(#[from] GeocodingError),

    /// The identity provider could not be reached.
    #[error("Identity provider unavailable: {0}")]
    IdentityUnavailable(String),

    /// Internal server error (e.g. corrupt stored data).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Stable machine-readable kind used in the response body.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_error",
            Self::Unauthorized(_) => "unauthorized",
            Self::Forbidden(_) => "forbidden",
            Self::NotFound(_) => "not_found",
            Self::StorageUnavailable(_) => "storage_unavailable",
            Self::GeocodingUnavailable(_) => "geocoding_unavailable",
            Self::IdentityUnavailable(_) => "identity_unavailable",
            Self::Internal(_) => "internal",
        }
    }

    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::StorageUnavailable(_) | Self::IdentityUnavailable(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            Self::GeocodingUnavailable(_) => StatusCode::BAD_GATEWAY,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    const fn is_server_error(&self) -> bool {
        matches!(
            self,
            Self::StorageUnavailable(_)
                | Self::GeocodingUnavailable(_)
                | Self::IdentityUnavailable(_)
                | Self::Internal(_)
        )
    }
}

impl From<RepositoryError> for AppError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::Database(e) => Self::StorageUnavailable(e.to_string()),
            RepositoryError::DataCorruption(msg) => Self::Internal(msg),
            RepositoryError::NotFound => Self::NotFound("shipment not found".to_string()),
            RepositoryError::Conflict(msg) => {
                Self::Validation(ValidationError::field("tracking_number", msg))
            }
        }
    }
}

impl From<IdentityError> for AppError {
    fn from(err: IdentityError) -> Self {
        match err {
            IdentityError::Unavailable(msg) => Self::IdentityUnavailable(msg),
            IdentityError::MissingToken
            | IdentityError::InvalidToken
            | IdentityError::Disabled
            | IdentityError::NoEmail => Self::Unauthorized(err.to_string()),
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        Self::Validation(ValidationError::body(rejection.body_text()))
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        Self::Validation(ValidationError::field("query", rejection.body_text()))
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        Self::Validation(ValidationError::field("path", rejection.body_text()))
    }
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    fields: Option<&'a [FieldError]>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Capture server errors to Sentry
        if self.is_server_error() {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Request error"
            );
        }

        // Don't expose internal error details to clients
        let message = match &self {
            Self::Internal(_) => "Internal server error".to_string(),
            Self::StorageUnavailable(_) => "Storage is temporarily unavailable".to_string(),
            Self::IdentityUnavailable(_) => "Identity provider is unavailable".to_string(),
            Self::GeocodingUnavailable(GeocodingError::NotConfigured) => {
                "Geocoding is not configured".to_string()
            }
            Self::GeocodingUnavailable(_) => "Geocoding service error".to_string(),
            Self::Validation(err) => err.to_string(),
            Self::Unauthorized(msg) | Self::Forbidden(msg) | Self::NotFound(msg) => msg.clone(),
        };

        let body = ErrorBody {
            error: self.kind(),
            message,
            fields: match &self {
                Self::Validation(err) => Some(&err.errors),
                _ => None,
            },
        };

        (self.status(), Json(body)).into_response()
    }
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;

/// Set the Sentry user context for the verified identity.
///
/// Call this after successful authentication to associate errors with users.
pub fn set_sentry_user(uid: &str, email: &str) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(uid.to_string()),
            email: Some(email.to_string()),
            ..Default::default()
        }));
    });
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use http_body_util::BodyExt;

    use super::*;

    #[test]
    fn test_app_error_display() {
        let err = AppError::NotFound("shipment not found".to_string());
        assert_eq!(err.to_string(), "Not found: shipment not found");

        let err = AppError::Validation(ValidationError::field("status", "invalid"));
        assert_eq!(err.to_string(), "Validation error: status: invalid");
    }

    #[test]
    fn test_app_error_status_codes() {
        fn get_status(err: AppError) -> StatusCode {
            let response = err.into_response();
            response.status()
        }

        assert_eq!(
            get_status(AppError::Validation(ValidationError::body("bad"))),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            get_status(AppError::Unauthorized("test".to_string())),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            get_status(AppError::Forbidden("test".to_string())),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            get_status(AppError::NotFound("test".to_string())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            get_status(AppError::StorageUnavailable("test".to_string())),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            get_status(AppError::GeocodingUnavailable(GeocodingError::NotConfigured)),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            get_status(AppError::IdentityUnavailable("test".to_string())),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            get_status(AppError::Internal("test".to_string())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_repository_error_mapping() {
        assert!(matches!(
            AppError::from(RepositoryError::NotFound),
            AppError::NotFound(_)
        ));
        assert!(matches!(
            AppError::from(RepositoryError::Conflict("taken".to_string())),
            AppError::Validation(_)
        ));
        assert!(matches!(
            AppError::from(RepositoryError::DataCorruption("bad".to_string())),
            AppError::Internal(_)
        ));
        assert!(matches!(
            AppError::from(RepositoryError::Database(sqlx::Error::PoolTimedOut)),
            AppError::StorageUnavailable(_)
        ));
    }

    #[test]
    fn test_identity_error_mapping() {
        assert!(matches!(
            AppError::from(IdentityError::InvalidToken),
            AppError::Unauthorized(_)
        ));
        assert!(matches!(
            AppError::from(IdentityError::Unavailable("timeout".to_string())),
            AppError::IdentityUnavailable(_)
        ));
    }

    #[tokio::test]
    async fn test_validation_body_lists_fields() {
        let mut err = ValidationError::field("origin", "is required");
        err.push("status", "unknown status");
        let response = AppError::Validation(err).into_response();

        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"], "validation_error");
        assert_eq!(body["fields"][0]["field"], "origin");
        assert_eq!(body["fields"][1]["field"], "status");
    }

    #[tokio::test]
    async fn test_internal_details_are_hidden() {
        let response =
            AppError::StorageUnavailable("password authentication failed".to_string())
                .into_response();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"], "storage_unavailable");
        assert!(!body["message"].as_str().unwrap().contains("password"));
    }
}
