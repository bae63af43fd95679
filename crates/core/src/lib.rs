//! Waybill Core - shared shipment and event types.
//!
//! This crate provides the domain model used by every Waybill component:
//! - `server` - the shipment tracking HTTP API
//! - `cli` - migrations and maintenance commands
//!
//! # Architecture
//!
//! The core crate contains only types and validation - no I/O, no database
//! access, no HTTP clients. The optional `postgres` feature adds `sqlx`
//! encode/decode support for the ID types.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for IDs, emails, addresses and statuses
//! - [`shipment`] - Shipment records, updates, list filters
//! - [`event`] - Append-only event log records
//! - [`validation`] - Field-level validation errors

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod event;
pub mod shipment;
pub mod types;
pub mod validation;

pub use event::{Event, NewEvent, NoteInput, TimeRange};
pub use shipment::{
    Coordinates, NewShipment, RouteChange, RouteEstimate, Shipment, ShipmentChanges,
    ShipmentFilter, ShipmentInput, ShipmentListQuery,
};
pub use types::*;
pub use validation::{FieldError, ValidationError};
