//! Core aggregate and domain event traits.

use std::any::Any;
use std::fmt;

use common::AggregateId;

/// Trait for domain events.
///
/// Domain events represent facts that have happened in the domain. They are
/// immutable once raised and should be named in past tense.
///
/// The trait is object safe: the unit of work handles captured events as
/// `Arc<dyn DomainEvent>` and subscribers recover the concrete type through
/// [`DomainEvent::as_any`].
pub trait DomainEvent: fmt::Debug + Send + Sync + 'static {
    /// Returns the logical event type tag.
    ///
    /// This is stored on the envelope and used to pick a decoder on replay.
    fn event_type(&self) -> &'static str;

    /// Identity of the aggregate that raised the event.
    fn aggregate_id(&self) -> AggregateId;

    /// Serializes the event to its JSON payload.
    fn to_payload(&self) -> serde_json::Result<String>;

    fn as_any(&self) -> &dyn Any;
}

/// Ordered buffer of events raised by an aggregate but not yet captured.
///
/// Aggregates keep this as a private field, so only their own state-changing
/// methods can raise into it.
#[derive(Debug, Clone)]
pub struct EventBuffer<E> {
    events: Vec<E>,
}

impl<E> Default for EventBuffer<E> {
    fn default() -> Self {
        Self { events: Vec::new() }
    }
}

impl<E> EventBuffer<E> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an event; insertion order is preserved.
    pub fn raise(&mut self, event: E) {
        self.events.push(event);
    }

    pub fn as_slice(&self) -> &[E] {
        &self.events
    }

    /// Drains the buffer, returning the events in raise order.
    pub fn take(&mut self) -> Vec<E> {
        std::mem::take(&mut self.events)
    }

    /// Empties the buffer. Calling it on an empty buffer does nothing.
    pub fn clear(&mut self) {
        self.events.clear();
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

/// Trait for write-side aggregate roots.
///
/// An aggregate is persisted as relational state; the events it raises are a
/// side channel drained by the unit of work exactly once per save.
pub trait AggregateRoot: Send + Sync + 'static {
    /// The type of events this aggregate raises.
    type Event: DomainEvent + Clone;

    /// Returns the aggregate type name.
    fn aggregate_type() -> &'static str;

    /// Returns the aggregate's unique identifier.
    fn id(&self) -> AggregateId;

    /// Events raised since the last capture, in raise order.
    fn pending_events(&self) -> &[Self::Event];

    /// Drains the pending events.
    fn take_pending_events(&mut self) -> Vec<Self::Event>;

    fn clear_pending_events(&mut self) {
        self.take_pending_events();
    }
}
