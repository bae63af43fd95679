//! Authentication extractors.
//!
//! Every protected handler names one of these as its first argument so the
//! credential check runs before any body or query parsing:
//!
//! - [`Authenticated`] - a valid bearer token, whitelisted or not
//! - [`RequireWhitelisted`] - a valid bearer token for a whitelisted email
//! - [`ReadAccess`] - like `RequireWhitelisted`, unless public reads are on
//!
//! # Example
//!
//! ```rust,ignore
//! async fn delete_shipment(
//!     RequireWhitelisted(identity): RequireWhitelisted,
//!     ShipmentPath(id): ShipmentPath,
//! ) -> Result<StatusCode> {
//!     // ...
//! }
//! ```

use axum::{
    extract::{FromRequestParts, Path},
    http::{header::AUTHORIZATION, request::Parts},
};
use tracing::Span;

use waybill_core::{ShipmentId, ValidationError};

use crate::error::{AppError, set_sentry_user};
use crate::services::identity::{IdentityError, VerifiedIdentity};
use crate::state::AppState;

/// Pull the token out of `Authorization: Bearer <token>`.
fn bearer_token(parts: &Parts) -> Result<&str, IdentityError> {
    let value = parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .ok_or(IdentityError::MissingToken)?;

    let (scheme, token) = value.split_once(' ').ok_or(IdentityError::MissingToken)?;
    let token = token.trim();
    if !scheme.eq_ignore_ascii_case("bearer") || token.is_empty() {
        return Err(IdentityError::MissingToken);
    }
    Ok(token)
}

/// Extractor for any caller holding a valid bearer token.
///
/// The verified identity is cached in request extensions so stacking
/// extractors costs one provider round trip.
pub struct Authenticated(pub VerifiedIdentity);

impl FromRequestParts<AppState> for Authenticated {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        if let Some(identity) = parts.extensions.get::<VerifiedIdentity>() {
            return Ok(Self(identity.clone()));
        }

        let token = bearer_token(parts)?;
        let identity = state.identity().verify(token).await.map_err(|err| {
            tracing::debug!(error = %err, "bearer token rejected");
            AppError::from(err)
        })?;

        Span::current().record("user", identity.email.as_str());
        set_sentry_user(&identity.uid, identity.email.as_str());
        parts.extensions.insert(identity.clone());

        Ok(Self(identity))
    }
}

/// Extractor for callers whose verified email is on the whitelist.
pub struct RequireWhitelisted(pub VerifiedIdentity);

impl FromRequestParts<AppState> for RequireWhitelisted {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let Authenticated(identity) = Authenticated::from_request_parts(parts, state).await?;

        if !state.policy().permits(&identity.email) {
            tracing::info!(email = %identity.email, "identity not whitelisted");
            return Err(AppError::Forbidden(format!(
                "{} is not permitted to use this service",
                identity.email
            )));
        }

        Ok(Self(identity))
    }
}

/// Extractor for read-only routes.
///
/// Yields `None` without looking at credentials when public reads are
/// enabled; otherwise behaves like [`RequireWhitelisted`].
pub struct ReadAccess(pub Option<VerifiedIdentity>);

impl FromRequestParts<AppState> for ReadAccess {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        if state.policy().public_reads {
            return Ok(Self(None));
        }
        let RequireWhitelisted(identity) =
            RequireWhitelisted::from_request_parts(parts, state).await?;
        Ok(Self(Some(identity)))
    }
}

/// Extractor for the `{id}` path segment of shipment routes.
pub struct ShipmentPath(pub ShipmentId);

impl<S> FromRequestParts<S> for ShipmentPath
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(raw) = Path::<String>::from_request_parts(parts, state).await?;
        raw.parse::<ShipmentId>()
            .map(Self)
            .map_err(|_| ValidationError::field("id", "must be a UUID").into())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use axum::http::Request;

    use super::*;

    fn parts(authorization: Option<&str>) -> Parts {
        let mut builder = Request::builder().uri("/shipments");
        if let Some(value) = authorization {
            builder = builder.header(AUTHORIZATION, value);
        }
        builder.body(()).unwrap().into_parts().0
    }

    #[test]
    fn test_bearer_token_parsing() {
        assert_eq!(bearer_token(&parts(Some("Bearer abc.def"))).unwrap(), "abc.def");
        assert_eq!(bearer_token(&parts(Some("bearer  abc "))).unwrap(), "abc");
    }

    #[test]
    fn test_bearer_token_rejections() {
        for header in [None, Some("Basic dXNlcjpwYXNz"), Some("Bearer"), Some("Bearer   ")] {
            assert!(matches!(
                bearer_token(&parts(header)),
                Err(IdentityError::MissingToken)
            ));
        }
    }
}
