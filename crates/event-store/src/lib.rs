//! Append-only event log for committed domain events.
//!
//! Envelopes are written after the owning business transaction commits and
//! are read back for audit and replay.

pub mod error;
pub mod event;
pub mod memory;
pub mod postgres;
pub mod query;
pub mod store;

pub use common::AggregateId;
pub use error::{EventStoreError, Result};
pub use event::{EventEnvelope, EventEnvelopeBuilder, EventId};
pub use memory::InMemoryEventLog;
pub use postgres::PostgresEventLog;
pub use query::EventQuery;
pub use store::{EventLogStore, EventLogStoreExt, EventStream, validate_envelopes};
