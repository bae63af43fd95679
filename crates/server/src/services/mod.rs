//! External collaborators.
//!
//! # Services
//!
//! - `identity` - Bearer token verification (Firebase Identity Toolkit) and
//!   the email whitelist
//! - `geocoding` - Address geocoding and road distance (Google Maps)
//!
//! Both sit behind `async_trait` traits so tests can substitute fakes.

pub mod geocoding;
pub mod identity;

pub use geocoding::{Geocoder, GeocodingError, GoogleMapsGeocoder, Place};
pub use identity::{
    IdentityError, IdentityProvider, IdentityToolkitProvider, VerifiedIdentity, Whitelist,
    WhitelistError,
};
