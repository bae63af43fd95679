//! Core types for Waybill.
//!
//! Type-safe wrappers for the values that cross the HTTP boundary.

pub mod address;
pub mod email;
pub mod id;
pub mod status;

pub use address::{Address, AddressError, TrackingNumber, TrackingNumberError};
pub use email::{Email, EmailError};
pub use id::{EventId, IdParseError, ShipmentId};
pub use status::{EventKind, ShipmentStatus, UnknownVariant};
