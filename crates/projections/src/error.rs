//! Projection error types.

use domain::{PublishError, RegistryError};
use thiserror::Error;

/// Errors that can occur during projection processing.
#[derive(Debug, Error)]
pub enum ProjectionError {
    /// Reading the event log failed.
    #[error("Event log error: {0}")]
    EventLog(#[from] event_store::EventStoreError),

    /// A stored envelope could not be turned back into a domain event.
    #[error("Event decoding error: {0}")]
    Decode(#[from] RegistryError),

    /// One or more read models rejected a replayed event.
    #[error("Event delivery error: {0}")]
    Delivery(#[from] PublishError),

    /// A projection-specific error.
    #[error("Projection error: {0}")]
    Projection(String),
}

/// Result type for projection operations.
pub type Result<T> = std::result::Result<T, ProjectionError>;
