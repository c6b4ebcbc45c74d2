use std::collections::HashSet;
use std::pin::Pin;

use async_trait::async_trait;
use futures_core::Stream;

use crate::{AggregateId, EventEnvelope, EventQuery, EventStoreError, Result};

/// A stream of envelopes.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<EventEnvelope>> + Send>>;

/// Append-only sink for event envelopes, plus the reads audit and replay need.
///
/// All implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait EventLogStore: Send + Sync {
    /// Durably appends a batch of envelopes.
    ///
    /// The batch is appended atomically and in order. An empty batch is a
    /// successful no-op. An envelope whose id is already present in the log is
    /// skipped, so a batch may be re-appended after an ambiguous failure
    /// without producing duplicates.
    async fn append(&self, envelopes: Vec<EventEnvelope>) -> Result<()>;

    /// Retrieves all envelopes for a specific aggregate, oldest first.
    async fn get_events_for_aggregate(
        &self,
        aggregate_id: AggregateId,
    ) -> Result<Vec<EventEnvelope>>;

    /// Retrieves envelopes matching a query, in insertion order.
    async fn query_events(&self, query: EventQuery) -> Result<Vec<EventEnvelope>>;

    /// Streams every envelope in the log in insertion order.
    async fn stream_all_events(&self) -> Result<EventStream>;

    /// Number of envelopes in the log.
    async fn event_count(&self) -> Result<u64>;
}

/// Extension trait providing convenience methods for event logs.
#[async_trait]
pub trait EventLogStoreExt: EventLogStore {
    /// Appends a single envelope.
    async fn append_one(&self, envelope: EventEnvelope) -> Result<()> {
        self.append(vec![envelope]).await
    }

    /// Checks whether any envelope references `aggregate_id`.
    async fn has_events_for(&self, aggregate_id: AggregateId) -> Result<bool> {
        let query = EventQuery::for_aggregate(aggregate_id).limit(1);
        Ok(!self.query_events(query).await?.is_empty())
    }
}

// Blanket implementation for all EventLogStore implementations
impl<T: EventLogStore + ?Sized> EventLogStoreExt for T {}

/// Validates a batch before appending.
///
/// Envelopes in one batch may belong to different aggregates, but each must
/// carry a type tag and ids must not repeat within the batch.
pub fn validate_envelopes(envelopes: &[EventEnvelope]) -> Result<()> {
    let mut seen = HashSet::with_capacity(envelopes.len());
    for envelope in envelopes {
        if envelope.event_type().trim().is_empty() {
            return Err(EventStoreError::InvalidBatch(format!(
                "envelope {} has an empty event type",
                envelope.id()
            )));
        }
        if !seen.insert(envelope.id()) {
            return Err(EventStoreError::InvalidBatch(format!(
                "envelope {} appears twice in the batch",
                envelope.id()
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn empty_batch_is_valid() {
        assert!(validate_envelopes(&[]).is_ok());
    }

    #[test]
    fn mixed_aggregates_are_valid() {
        let batch = vec![
            EventEnvelope::new(AggregateId::new(), "CustomerCreated", "{}", Utc::now()),
            EventEnvelope::new(AggregateId::new(), "CustomerCreated", "{}", Utc::now()),
        ];
        assert!(validate_envelopes(&batch).is_ok());
    }

    #[test]
    fn rejects_repeated_ids() {
        let envelope = EventEnvelope::new(AggregateId::new(), "CustomerCreated", "{}", Utc::now());
        let result = validate_envelopes(&[envelope.clone(), envelope]);
        assert!(matches!(result, Err(EventStoreError::InvalidBatch(_))));
    }

    #[test]
    fn rejects_blank_event_type() {
        let envelope = EventEnvelope::new(AggregateId::new(), "  ", "{}", Utc::now());
        assert!(matches!(
            validate_envelopes(&[envelope]),
            Err(EventStoreError::InvalidBatch(_))
        ));
    }
}
