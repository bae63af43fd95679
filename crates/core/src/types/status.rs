//! Status enums for shipments and events.

use serde::{Deserialize, Serialize};

/// Error returned when a status string is not one of the known values.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid {kind}: {value:?} (expected one of: {expected})")]
pub struct UnknownVariant {
    /// What was being parsed (e.g. "status").
    pub kind: &'static str,
    /// The rejected input.
    pub value: String,
    /// Comma-separated list of accepted values.
    pub expected: &'static str,
}

/// Lifecycle status of a shipment.
///
/// Serialized in kebab-case (`"in-transit"`), which is also the form stored in
/// the shipments table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ShipmentStatus {
    #[default]
    Created,
    InTransit,
    Delivered,
    Cancelled,
}

impl ShipmentStatus {
    /// All statuses, in lifecycle order.
    pub const ALL: [Self; 4] = [
        Self::Created,
        Self::InTransit,
        Self::Delivered,
        Self::Cancelled,
    ];

    /// The wire and storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::InTransit => "in-transit",
            Self::Delivered => "delivered",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for ShipmentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ShipmentStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| UnknownVariant {
                kind: "status",
                value: s.to_owned(),
                expected: "created, in-transit, delivered, cancelled",
            })
    }
}

/// What an [`crate::Event`] records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    ShipmentCreated,
    ShipmentUpdated,
    ShipmentDeleted,
    /// Free-form annotation posted by a user.
    Note,
}

impl EventKind {
    /// The wire and storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ShipmentCreated => "shipment_created",
            Self::ShipmentUpdated => "shipment_updated",
            Self::ShipmentDeleted => "shipment_deleted",
            Self::Note => "note",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EventKind {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "shipment_created" => Ok(Self::ShipmentCreated),
            "shipment_updated" => Ok(Self::ShipmentUpdated),
            "shipment_deleted" => Ok(Self::ShipmentDeleted),
            "note" => Ok(Self::Note),
            _ => Err(UnknownVariant {
                kind: "event kind",
                value: s.to_owned(),
                expected: "shipment_created, shipment_updated, shipment_deleted, note",
            }),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_status_parse_matches_display() {
        for status in ShipmentStatus::ALL {
            assert_eq!(status.as_str().parse::<ShipmentStatus>().unwrap(), status);
        }
    }

    #[test]
    fn test_status_serde_is_kebab_case() {
        let json = serde_json::to_string(&ShipmentStatus::InTransit).unwrap();
        assert_eq!(json, "\"in-transit\"");
    }

    #[test]
    fn test_status_rejects_unknown_and_wrong_case() {
        assert!("lost".parse::<ShipmentStatus>().is_err());
        assert!("Delivered".parse::<ShipmentStatus>().is_err());
        assert!("in_transit".parse::<ShipmentStatus>().is_err());
    }

    #[test]
    fn test_default_status_is_created() {
        assert_eq!(ShipmentStatus::default(), ShipmentStatus::Created);
    }

    #[test]
    fn test_event_kind_roundtrip() {
        for kind in [
            EventKind::ShipmentCreated,
            EventKind::ShipmentUpdated,
            EventKind::ShipmentDeleted,
            EventKind::Note,
        ] {
            assert_eq!(kind.as_str().parse::<EventKind>().unwrap(), kind);
        }
    }
}
