use std::collections::HashMap;
use std::sync::Arc;

use event_store::EventEnvelope;
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::aggregate::DomainEvent;

type Decoder = fn(&str) -> serde_json::Result<Arc<dyn DomainEvent>>;

fn decode_as<E>(payload: &str) -> serde_json::Result<Arc<dyn DomainEvent>>
where
    E: DomainEvent + DeserializeOwned,
{
    let event: E = serde_json::from_str(payload)?;
    Ok(Arc::new(event))
}

/// Errors raised while decoding an envelope.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("No decoder registered for event type '{0}'")]
    UnknownEventType(String),

    #[error("Failed to decode {event_type} payload: {source}")]
    Decode {
        event_type: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Maps event type tags to payload decoders.
///
/// Populated once at startup; replay tooling uses it to turn stored
/// envelopes back into typed domain events.
#[derive(Default, Clone)]
pub struct EventTypeRegistry {
    decoders: HashMap<String, Decoder>,
}

impl EventTypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `E` as the decoder for each of `event_types`.
    ///
    /// Re-registering a tag replaces its decoder.
    pub fn register<E>(&mut self, event_types: &[&str]) -> &mut Self
    where
        E: DomainEvent + DeserializeOwned,
    {
        for event_type in event_types {
            if self
                .decoders
                .insert(event_type.to_string(), decode_as::<E>)
                .is_some()
            {
                tracing::warn!(event_type, "replacing registered decoder");
            }
        }
        self
    }

    pub fn is_registered(&self, event_type: &str) -> bool {
        self.decoders.contains_key(event_type)
    }

    /// Registered tags, sorted.
    pub fn event_types(&self) -> Vec<&str> {
        let mut types: Vec<_> = self.decoders.keys().map(String::as_str).collect();
        types.sort_unstable();
        types
    }

    /// Decodes an envelope's payload into its domain event.
    pub fn decode(&self, envelope: &EventEnvelope) -> Result<Arc<dyn DomainEvent>, RegistryError> {
        let decoder = self
            .decoders
            .get(envelope.event_type())
            .ok_or_else(|| RegistryError::UnknownEventType(envelope.event_type().to_string()))?;

        decoder(envelope.payload()).map_err(|source| RegistryError::Decode {
            event_type: envelope.event_type().to_string(),
            source,
        })
    }
}

impl std::fmt::Debug for EventTypeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventTypeRegistry")
            .field("event_types", &self.event_types())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use common::AggregateId;
    use serde::{Deserialize, Serialize};
    use std::any::Any;

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct Renamed {
        id: AggregateId,
        name: String,
    }

    impl DomainEvent for Renamed {
        fn event_type(&self) -> &'static str {
            "Renamed"
        }
        fn aggregate_id(&self) -> AggregateId {
            self.id
        }
        fn to_payload(&self) -> serde_json::Result<String> {
            serde_json::to_string(self)
        }
        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    fn envelope_for(event: &Renamed) -> EventEnvelope {
        EventEnvelope::new(
            event.id,
            event.event_type(),
            event.to_payload().unwrap(),
            Utc::now(),
        )
    }

    #[test]
    fn decodes_registered_type() {
        let mut registry = EventTypeRegistry::new();
        registry.register::<Renamed>(&["Renamed"]);

        let original = Renamed {
            id: AggregateId::new(),
            name: "Ana".into(),
        };
        let decoded = registry.decode(&envelope_for(&original)).unwrap();

        let renamed = decoded.as_any().downcast_ref::<Renamed>().unwrap();
        assert_eq!(renamed.id, original.id);
        assert_eq!(renamed.name, "Ana");
    }

    #[test]
    fn unknown_type_is_reported() {
        let registry = EventTypeRegistry::new();
        let envelope = EventEnvelope::new(AggregateId::new(), "Mystery", "{}", Utc::now());

        assert!(matches!(
            registry.decode(&envelope),
            Err(RegistryError::UnknownEventType(t)) if t == "Mystery"
        ));
    }

    #[test]
    fn malformed_payload_is_a_decode_error() {
        let mut registry = EventTypeRegistry::new();
        registry.register::<Renamed>(&["Renamed"]);
        let envelope = EventEnvelope::new(AggregateId::new(), "Renamed", "{not json", Utc::now());

        assert!(matches!(
            registry.decode(&envelope),
            Err(RegistryError::Decode { .. })
        ));
    }

    #[test]
    fn lists_registered_types() {
        let mut registry = EventTypeRegistry::new();
        registry.register::<Renamed>(&["Renamed", "LegacyRenamed"]);

        assert!(registry.is_registered("LegacyRenamed"));
        assert_eq!(registry.event_types(), vec!["LegacyRenamed", "Renamed"]);
    }
}
