use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::{
    AggregateId, EventEnvelope, EventId, EventQuery, EventStoreError, Result,
    store::{EventLogStore, EventStream, validate_envelopes},
};

#[derive(Default)]
struct LogState {
    events: Vec<EventEnvelope>,
    ids: HashSet<EventId>,
    batches: Vec<usize>,
}

/// In-memory event log for tests and the default API backend.
///
/// Provides the same interface and idempotency guarantees as the PostgreSQL
/// implementation. Appends can be made to fail on demand to exercise the
/// post-commit failure paths of the write pipeline.
#[derive(Clone, Default)]
pub struct InMemoryEventLog {
    state: Arc<RwLock<LogState>>,
    fail_appends: Arc<AtomicBool>,
    append_calls: Arc<AtomicUsize>,
}

impl InMemoryEventLog {
    /// Creates a new empty in-memory event log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent `append` fail as unavailable (or succeed again).
    pub fn fail_appends(&self, fail: bool) {
        self.fail_appends.store(fail, Ordering::SeqCst);
    }

    /// Number of times `append` has been invoked, including failed calls.
    pub fn append_calls(&self) -> usize {
        self.append_calls.load(Ordering::SeqCst)
    }

    /// Sizes of the batches accepted so far, in order.
    pub async fn batches(&self) -> Vec<usize> {
        self.state.read().await.batches.clone()
    }

    /// Returns the total number of stored envelopes.
    pub async fn len(&self) -> usize {
        self.state.read().await.events.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Returns a copy of every stored envelope in insertion order.
    pub async fn snapshot(&self) -> Vec<EventEnvelope> {
        self.state.read().await.events.clone()
    }

    /// Clears all envelopes and recorded batches.
    pub async fn clear(&self) {
        let mut state = self.state.write().await;
        state.events.clear();
        state.ids.clear();
        state.batches.clear();
    }
}

#[async_trait]
impl EventLogStore for InMemoryEventLog {
    async fn append(&self, envelopes: Vec<EventEnvelope>) -> Result<()> {
        self.append_calls.fetch_add(1, Ordering::SeqCst);

        if envelopes.is_empty() {
            return Ok(());
        }
        if self.fail_appends.load(Ordering::SeqCst) {
            return Err(EventStoreError::Unavailable(
                "in-memory log configured to fail".to_string(),
            ));
        }
        validate_envelopes(&envelopes)?;

        let mut state = self.state.write().await;
        let mut accepted = 0;
        for envelope in envelopes {
            if state.ids.insert(envelope.id()) {
                state.events.push(envelope);
                accepted += 1;
            } else {
                tracing::debug!(event_id = %envelope.id(), "skipping already appended envelope");
            }
        }
        state.batches.push(accepted);

        Ok(())
    }

    async fn get_events_for_aggregate(
        &self,
        aggregate_id: AggregateId,
    ) -> Result<Vec<EventEnvelope>> {
        let state = self.state.read().await;
        Ok(state
            .events
            .iter()
            .filter(|e| e.aggregate_id() == aggregate_id)
            .cloned()
            .collect())
    }

    async fn query_events(&self, query: EventQuery) -> Result<Vec<EventEnvelope>> {
        let state = self.state.read().await;
        let offset = query.offset.unwrap_or(0);
        let limit = query.limit.unwrap_or(usize::MAX);

        Ok(state
            .events
            .iter()
            .filter(|e| query.matches(e))
            .skip(offset)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn stream_all_events(&self) -> Result<EventStream> {
        use futures_util::stream;

        let events = self.state.read().await.events.clone();
        let stream = stream::iter(events.into_iter().map(Ok));
        Ok(Box::pin(stream))
    }

    async fn event_count(&self) -> Result<u64> {
        Ok(self.state.read().await.events.len() as u64)
    }
}
