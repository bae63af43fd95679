//! Free-text shipment address and tracking number types.

use core::fmt;

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Characters rejected in addresses.
const FORBIDDEN_ADDRESS_CHARS: &[char] = &['<', '>', '{', '}', ';', '`'];

/// Errors that can occur when parsing an [`Address`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum AddressError {
    #[error("address cannot be empty")]
    Empty,
    #[error("address must be at most {max} characters")]
    TooLong { max: usize },
    #[error("address contains forbidden character {0:?}")]
    ForbiddenCharacter(char),
}

/// A shipment origin or destination.
///
/// Addresses are free text (a city, a street address, a depot name) handed
/// to the geocoder as-is. Parsing trims surrounding whitespace.
///
/// ```
/// use waybill_core::Address;
///
/// assert_eq!(Address::parse("  Rotterdam ").unwrap().as_str(), "Rotterdam");
/// assert!(Address::parse("").is_err());
/// assert!(Address::parse("London<script>").is_err());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(try_from = "String", into = "String")]
pub struct Address(String);

impl Address {
    /// Maximum address length in characters.
    pub const MAX_LENGTH: usize = 200;

    /// Parse an `Address` from user input.
    ///
    /// # Errors
    ///
    /// Returns an error if the trimmed input is empty, too long, or contains a
    /// control character or one of `< > { } ; \``.
    pub fn parse(s: &str) -> Result<Self, AddressError> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(AddressError::Empty);
        }
        if trimmed.chars().count() > Self::MAX_LENGTH {
            return Err(AddressError::TooLong {
                max: Self::MAX_LENGTH,
            });
        }
        if let Some(c) = trimmed
            .chars()
            .find(|c| c.is_control() || FORBIDDEN_ADDRESS_CHARS.contains(c))
        {
            return Err(AddressError::ForbiddenCharacter(c));
        }
        Ok(Self(trimmed.to_owned()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Address {
    type Error = AddressError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Address> for String {
    fn from(address: Address) -> Self {
        address.0
    }
}

/// Errors that can occur when parsing a [`TrackingNumber`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum TrackingNumberError {
    #[error("tracking number cannot be empty")]
    Empty,
    #[error("tracking number must be at most {max} characters")]
    TooLong { max: usize },
    #[error("tracking number may only contain letters, digits, '-' and '_'")]
    InvalidCharacter,
}

/// Human-facing shipment reference, unique across shipments.
///
/// Clients may supply their own; otherwise one is generated in the form
/// `TRK-YYYYMMDD-HHMMSS-XXXX` where `XXXX` is random hex so that two
/// shipments created in the same second do not collide.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(try_from = "String", into = "String")]
pub struct TrackingNumber(String);

impl TrackingNumber {
    pub const MAX_LENGTH: usize = 64;

    /// Parse a client-supplied tracking number.
    ///
    /// # Errors
    ///
    /// Returns an error if the input is empty, longer than 64 characters, or
    /// contains anything other than ASCII alphanumerics, `-` and `_`.
    pub fn parse(s: &str) -> Result<Self, TrackingNumberError> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(TrackingNumberError::Empty);
        }
        if trimmed.len() > Self::MAX_LENGTH {
            return Err(TrackingNumberError::TooLong {
                max: Self::MAX_LENGTH,
            });
        }
        if !trimmed
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(TrackingNumberError::InvalidCharacter);
        }
        Ok(Self(trimmed.to_owned()))
    }

    /// Generate a tracking number stamped with `now`.
    #[must_use]
    pub fn generate(now: DateTime<Utc>) -> Self {
        let suffix: u16 = rand::rng().random();
        Self(format!("TRK-{}-{suffix:04X}", now.format("%Y%m%d-%H%M%S")))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TrackingNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for TrackingNumber {
    type Error = TrackingNumberError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<TrackingNumber> for String {
    fn from(tracking: TrackingNumber) -> Self {
        tracking.0
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn test_address_rejects_blank() {
        assert_eq!(Address::parse(" \t "), Err(AddressError::Empty));
    }

    #[test]
    fn test_address_rejects_markup() {
        assert_eq!(
            Address::parse("London<script>"),
            Err(AddressError::ForbiddenCharacter('<'))
        );
        assert_eq!(
            Address::parse("Paris\u{0007}"),
            Err(AddressError::ForbiddenCharacter('\u{0007}'))
        );
    }

    #[test]
    fn test_address_length_counts_chars_not_bytes() {
        let ok = "é".repeat(Address::MAX_LENGTH);
        assert!(Address::parse(&ok).is_ok());
        let too_long = "é".repeat(Address::MAX_LENGTH + 1);
        assert!(matches!(
            Address::parse(&too_long),
            Err(AddressError::TooLong { .. })
        ));
    }

    #[test]
    fn test_address_allows_ordinary_punctuation() {
        let address = Address::parse("12 Rue de l'Église, 75004 Paris (Bldg #2)").unwrap();
        assert_eq!(address.as_str(), "12 Rue de l'Église, 75004 Paris (Bldg #2)");
    }

    #[test]
    fn test_generated_tracking_number_format() {
        let now = Utc.with_ymd_and_hms(2026, 1, 30, 14, 30, 22).unwrap();
        let tracking = TrackingNumber::generate(now);
        assert!(tracking.as_str().starts_with("TRK-20260130-143022-"));
        assert_eq!(tracking.as_str().len(), "TRK-20260130-143022-ABCD".len());
        assert!(TrackingNumber::parse(tracking.as_str()).is_ok());
    }

    #[test]
    fn test_tracking_number_rejects_spaces() {
        assert_eq!(
            TrackingNumber::parse("TRK 1"),
            Err(TrackingNumberError::InvalidCharacter)
        );
    }
}
