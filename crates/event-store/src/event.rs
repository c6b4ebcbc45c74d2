use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::AggregateId;

/// Unique identifier for an envelope in the event log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(Uuid);

impl EventId {
    /// Creates a new random event ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates an event ID from an existing UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for EventId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl From<EventId> for Uuid {
    fn from(id: EventId) -> Self {
        id.0
    }
}

/// Durable record of one domain event.
///
/// The envelope is write-once: all fields are private and only readable
/// through accessors. Its serialized form is the schema exposed to audit and
/// replay tooling:
///
/// ```json
/// {"id": "...", "aggregateId": "...", "eventType": "CustomerCreated",
///  "payload": "{...}", "occurredAt": "2024-05-01T12:00:00Z"}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventEnvelope {
    id: EventId,
    aggregate_id: AggregateId,
    event_type: String,
    payload: String,
    occurred_at: DateTime<Utc>,
}

impl EventEnvelope {
    /// Creates an envelope with a freshly generated id.
    pub fn new(
        aggregate_id: AggregateId,
        event_type: impl Into<String>,
        payload: impl Into<String>,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self::from_parts(EventId::new(), aggregate_id, event_type, payload, occurred_at)
    }

    /// Reassembles an envelope from stored columns.
    pub fn from_parts(
        id: EventId,
        aggregate_id: AggregateId,
        event_type: impl Into<String>,
        payload: impl Into<String>,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            aggregate_id,
            event_type: event_type.into(),
            payload: payload.into(),
            occurred_at,
        }
    }

    /// Creates a new envelope builder.
    pub fn builder() -> EventEnvelopeBuilder {
        EventEnvelopeBuilder::default()
    }

    pub fn id(&self) -> EventId {
        self.id
    }

    pub fn aggregate_id(&self) -> AggregateId {
        self.aggregate_id
    }

    /// The logical event type tag, used to pick a decoder on replay.
    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    /// The serialized (JSON) event payload.
    pub fn payload(&self) -> &str {
        &self.payload
    }

    pub fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }

    /// Parses the payload back into a JSON value.
    pub fn payload_json(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::from_str(&self.payload)
    }
}

/// Builder for constructing event envelopes.
#[derive(Debug, Default)]
pub struct EventEnvelopeBuilder {
    id: Option<EventId>,
    aggregate_id: Option<AggregateId>,
    event_type: Option<String>,
    payload: Option<String>,
    occurred_at: Option<DateTime<Utc>>,
}

impl EventEnvelopeBuilder {
    /// Sets the envelope ID. If not set, a new ID will be generated.
    pub fn id(mut self, id: EventId) -> Self {
        self.id = Some(id);
        self
    }

    pub fn aggregate_id(mut self, id: AggregateId) -> Self {
        self.aggregate_id = Some(id);
        self
    }

    pub fn event_type(mut self, event_type: impl Into<String>) -> Self {
        self.event_type = Some(event_type.into());
        self
    }

    /// Serializes `payload` to its JSON string form.
    pub fn payload<T: Serialize>(mut self, payload: &T) -> Result<Self, serde_json::Error> {
        self.payload = Some(serde_json::to_string(payload)?);
        Ok(self)
    }

    /// Sets an already serialized payload.
    pub fn payload_raw(mut self, payload: impl Into<String>) -> Self {
        self.payload = Some(payload.into());
        self
    }

    /// Sets the timestamp. If not set, the current time will be used.
    pub fn occurred_at(mut self, occurred_at: DateTime<Utc>) -> Self {
        self.occurred_at = Some(occurred_at);
        self
    }

    /// Builds the envelope, returning `None` if a required field is missing.
    pub fn try_build(self) -> Option<EventEnvelope> {
        Some(EventEnvelope {
            id: self.id.unwrap_or_default(),
            aggregate_id: self.aggregate_id?,
            event_type: self.event_type?,
            payload: self.payload?,
            occurred_at: self.occurred_at.unwrap_or_else(Utc::now),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_id_new_creates_unique_ids() {
        assert_ne!(EventId::new(), EventId::new());
    }

    #[test]
    fn builder_serializes_payload_to_string() {
        let aggregate_id = AggregateId::new();
        let envelope = EventEnvelope::builder()
            .aggregate_id(aggregate_id)
            .event_type("CustomerCreated")
            .payload(&serde_json::json!({"id": "A1"}))
            .unwrap()
            .try_build()
            .unwrap();

        assert_eq!(envelope.aggregate_id(), aggregate_id);
        assert_eq!(envelope.event_type(), "CustomerCreated");
        assert_eq!(envelope.payload(), r#"{"id":"A1"}"#);
        assert_eq!(envelope.payload_json().unwrap()["id"], "A1");
    }

    #[test]
    fn try_build_returns_none_on_missing_fields() {
        assert!(EventEnvelope::builder().try_build().is_none());
        assert!(
            EventEnvelope::builder()
                .aggregate_id(AggregateId::new())
                .event_type("X")
                .try_build()
                .is_none()
        );
    }

    #[test]
    fn serialized_form_uses_the_published_field_names() {
        let envelope = EventEnvelope::new(AggregateId::new(), "CustomerCreated", "{}", Utc::now());
        let json = serde_json::to_value(&envelope).unwrap();

        let mut keys: Vec<_> = json.as_object().unwrap().keys().cloned().collect();
        keys.sort();
        assert_eq!(
            keys,
            vec!["aggregateId", "eventType", "id", "occurredAt", "payload"]
        );
    }
}
