//! HTTP middleware and request extractors.
//!
//! # Middleware Order (bottom to top in Router)
//!
//! 1. Sentry layer (hub per request, transaction tracing)
//! 2. `TraceLayer` (request span with method, uri, request ID, user)
//! 3. Request ID (reuse or generate `x-request-id`)
//!
//! Authentication is not a layer: handlers opt in through the extractors in
//! [`auth`], which lets the read-only routes honour public-read mode.

pub mod auth;
pub mod request_id;

pub use auth::{Authenticated, ReadAccess, RequireWhitelisted, ShipmentPath};
pub use request_id::{REQUEST_ID_HEADER, RequestId, request_id_middleware};
