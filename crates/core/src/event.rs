//! Append-only shipment event log records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{Email, EventId, EventKind, ShipmentId};
use crate::validation::ValidationError;

/// Longest accepted note message, in characters.
pub const MAX_NOTE_LENGTH: usize = 2000;

/// Default number of events returned by the recent-events feed.
pub const DEFAULT_RECENT_EVENTS: u32 = 50;

/// An immutable record of something that happened to a shipment.
///
/// `shipment_id` is a weak reference: the shipment may have been deleted, or
/// (if the shipment write failed after the event was logged) may never have
/// existed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub shipment_id: ShipmentId,
    pub kind: EventKind,
    pub payload: serde_json::Value,
    /// Verified identity that caused the event.
    pub actor: Option<Email>,
    pub occurred_at: DateTime<Utc>,
}

/// An event about to be appended; the store assigns ID and timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct NewEvent {
    pub shipment_id: ShipmentId,
    pub kind: EventKind,
    pub payload: serde_json::Value,
    pub actor: Option<Email>,
}

/// Half-open time window `[from, to)`; missing bounds are unbounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TimeRange {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl TimeRange {
    /// Build a range, rejecting `from` later than `to`.
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] on the `from` field when the bounds are
    /// inverted.
    pub fn new(
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Result<Self, ValidationError> {
        if let (Some(from), Some(to)) = (from, to)
            && from > to
        {
            return Err(ValidationError::field("from", "must not be later than `to`"));
        }
        Ok(Self { from, to })
    }

    #[must_use]
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.from.is_none_or(|from| at >= from) && self.to.is_none_or(|to| at < to)
    }
}

/// Raw body of a note posted against a shipment.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NoteInput {
    pub message: Option<String>,
    /// Arbitrary structured data attached to the note.
    pub data: Option<serde_json::Value>,
}

impl NoteInput {
    /// Validate into the JSON payload stored with a [`EventKind::Note`] event.
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] when the message is missing, blank or
    /// too long, or when `data` is present but not a JSON object.
    pub fn into_payload(self) -> Result<serde_json::Value, ValidationError> {
        let mut errors = ValidationError::default();

        let message = self.message.as_deref().map(str::trim).unwrap_or_default();
        if message.is_empty() {
            errors.push("message", "is required");
        } else if message.chars().count() > MAX_NOTE_LENGTH {
            errors.push(
                "message",
                format!("must be at most {MAX_NOTE_LENGTH} characters"),
            );
        }

        let data = self.data.unwrap_or_else(|| serde_json::json!({}));
        if !data.is_object() {
            errors.push("data", "must be a JSON object");
        }

        errors.into_result(serde_json::json!({
            "message": message,
            "data": data,
        }))
    }
}
