use std::sync::Arc;

use common::Clock;
use event_store::EventEnvelope;

use super::store::Tracked;
use crate::aggregate::DomainEvent;

/// Events drained from the tracked aggregates of one save, with their envelopes.
///
/// `events[i]` and `envelopes[i]` describe the same fact. Order is
/// registration order, then raise order within each aggregate.
#[derive(Debug, Default)]
pub struct CapturedBatch {
    events: Vec<Arc<dyn DomainEvent>>,
    envelopes: Vec<EventEnvelope>,
}

impl CapturedBatch {
    pub fn events(&self) -> &[Arc<dyn DomainEvent>] {
        &self.events
    }

    pub fn envelopes(&self) -> &[EventEnvelope] {
        &self.envelopes
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn into_parts(self) -> (Vec<Arc<dyn DomainEvent>>, Vec<EventEnvelope>) {
        (self.events, self.envelopes)
    }
}

/// Drains every tracked aggregate and builds one envelope per event.
///
/// Envelope ids are assigned here, once per save, so a retried attempt or a
/// re-appended batch carries the same ids.
pub(crate) fn capture<Tx>(
    tracked: &mut [Box<dyn Tracked<Tx>>],
    clock: &dyn Clock,
) -> serde_json::Result<CapturedBatch> {
    let mut batch = CapturedBatch::default();

    for entry in tracked.iter_mut() {
        let aggregate_id = entry.aggregate_id();
        for event in entry.take_events() {
            let envelope = EventEnvelope::new(
                aggregate_id,
                event.event_type(),
                event.to_payload()?,
                clock.now(),
            );
            batch.envelopes.push(envelope);
            batch.events.push(event);
        }
    }

    Ok(batch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::{AggregateRoot, EventBuffer};
    use crate::unit_of_work::{AggregateWriter, ChangeTracker, EntityState, StoreError};
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use common::{AggregateId, FixedClock};
    use serde::Serialize;
    use std::any::Any;

    #[derive(Debug, Clone, Serialize)]
    struct Noted {
        id: AggregateId,
        text: String,
    }

    impl DomainEvent for Noted {
        fn event_type(&self) -> &'static str {
            "Noted"
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

    struct Notebook {
        id: AggregateId,
        events: EventBuffer<Noted>,
    }

    impl Notebook {
        fn with_notes(notes: &[&str]) -> Self {
            let mut notebook = Self {
                id: AggregateId::new(),
                events: EventBuffer::new(),
            };
            for note in notes {
                notebook.events.raise(Noted {
                    id: notebook.id,
                    text: note.to_string(),
                });
            }
            notebook
        }
    }

    impl AggregateRoot for Notebook {
        type Event = Noted;

        fn aggregate_type() -> &'static str {
            "Notebook"
        }
        fn id(&self) -> AggregateId {
            self.id
        }
        fn pending_events(&self) -> &[Noted] {
            self.events.as_slice()
        }
        fn take_pending_events(&mut self) -> Vec<Noted> {
            self.events.take()
        }
    }

    struct NullWriter;

    #[async_trait]
    impl AggregateWriter<Notebook, ()> for NullWriter {
        async fn insert(&self, _tx: &mut (), _aggregate: &Notebook) -> Result<u64, StoreError> {
            Ok(1)
        }
        async fn update(&self, _tx: &mut (), _aggregate: &Notebook) -> Result<u64, StoreError> {
            Ok(1)
        }
    }

    #[test]
    fn captures_in_registration_then_raise_order_and_empties_buffers() {
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let tracker: ChangeTracker<()> = ChangeTracker::new();
        let writer = Arc::new(NullWriter);

        let first = Notebook::with_notes(&["a1", "a2"]);
        let second = Notebook::with_notes(&["b1"]);
        let (first_id, second_id) = (first.id, second.id);
        tracker.track(first, writer.clone(), EntityState::Added);
        tracker.track(second, writer, EntityState::Modified);

        let mut tracked = tracker.take();
        let batch = capture(&mut tracked, &FixedClock(at)).unwrap();

        let owners: Vec<_> = batch.envelopes().iter().map(|e| e.aggregate_id()).collect();
        assert_eq!(owners, vec![first_id, first_id, second_id]);

        let texts: Vec<_> = batch
            .events()
            .iter()
            .map(|e| e.as_any().downcast_ref::<Noted>().unwrap().text.clone())
            .collect();
        assert_eq!(texts, vec!["a1", "a2", "b1"]);

        assert!(batch.envelopes().iter().all(|e| e.occurred_at() == at));
        assert!(batch.envelopes().iter().all(|e| e.event_type() == "Noted"));
        assert!(tracked.iter().all(|t| t.pending_event_count() == 0));
    }

    #[test]
    fn second_capture_finds_nothing() {
        let tracker: ChangeTracker<()> = ChangeTracker::new();
        tracker.track(
            Notebook::with_notes(&["once"]),
            Arc::new(NullWriter),
            EntityState::Added,
        );
        let mut tracked = tracker.take();

        assert_eq!(capture(&mut tracked, &FixedClock(Utc::now())).unwrap().len(), 1);
        assert!(capture(&mut tracked, &FixedClock(Utc::now())).unwrap().is_empty());
    }

    #[test]
    fn payload_is_the_serialized_event() {
        let tracker: ChangeTracker<()> = ChangeTracker::new();
        tracker.track(
            Notebook::with_notes(&["hello"]),
            Arc::new(NullWriter),
            EntityState::Added,
        );
        let mut tracked = tracker.take();
        let batch = capture(&mut tracked, &FixedClock(Utc::now())).unwrap();

        let payload = batch.envelopes()[0].payload_json().unwrap();
        assert_eq!(payload["text"], "hello");
    }
}
