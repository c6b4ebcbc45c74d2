use std::fmt;

use event_store::EventStoreError;
use thiserror::Error;

use crate::eventing::PublishError;
use crate::retry::IsTransient;

/// Errors raised by a transactional store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Connectivity loss, timeout, deadlock or serialization failure.
    #[error("Transient store failure: {0}")]
    Transient(String),

    /// A unique constraint was violated.
    #[error("Unique constraint '{constraint}' violated: {message}")]
    Conflict { constraint: String, message: String },

    #[error("Database error: {0}")]
    Database(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    pub fn transient(message: impl Into<String>) -> Self {
        StoreError::Transient(message.into())
    }

    pub fn conflict(constraint: impl Into<String>, message: impl Into<String>) -> Self {
        StoreError::Conflict {
            constraint: constraint.into(),
            message: message.into(),
        }
    }

    pub fn database(error: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        StoreError::Database(error.into())
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict { .. })
    }
}

impl IsTransient for StoreError {
    fn is_transient(&self) -> bool {
        matches!(self, StoreError::Transient(_))
    }
}

/// Side effects that failed after the transaction committed.
///
/// Publishing and appending are both attempted even when the other fails.
#[derive(Debug, Default)]
pub struct PropagationError {
    pub publish: Option<PublishError>,
    pub append: Option<EventStoreError>,
}

impl PropagationError {
    pub fn is_empty(&self) -> bool {
        self.publish.is_none() && self.append.is_none()
    }
}

impl fmt::Display for PropagationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.publish, &self.append) {
            (Some(publish), Some(append)) => {
                write!(f, "publish failed ({publish}); append failed ({append})")
            }
            (Some(publish), None) => write!(f, "publish failed ({publish})"),
            (None, Some(append)) => write!(f, "append failed ({append})"),
            (None, None) => write!(f, "no propagation failure"),
        }
    }
}

impl std::error::Error for PropagationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match (&self.append, &self.publish) {
            (Some(append), _) => Some(append),
            (None, Some(publish)) => Some(publish),
            (None, None) => None,
        }
    }
}

/// Errors returned by `UnitOfWork::save_changes`.
///
/// Variants before [`SaveError::Propagation`] mean nothing was committed.
/// The last two mean the write is durable but side effects may be missing;
/// check [`SaveError::is_committed`] before retrying a command.
#[derive(Debug, Error)]
pub enum SaveError {
    /// A unique constraint rejected the write; the transaction was rolled back.
    #[error("Conflict: {0}")]
    Conflict(#[source] StoreError),

    /// Transient failures persisted for every allowed attempt.
    #[error("Giving up after {attempts} attempts: {source}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        source: StoreError,
    },

    /// Non-transient store failure before or during commit.
    #[error("Store error: {0}")]
    Store(#[source] StoreError),

    /// A captured event could not be serialized.
    #[error("Failed to serialize domain event: {0}")]
    Capture(#[source] serde_json::Error),

    /// Cancelled before commit; the transaction was rolled back.
    #[error("Save cancelled before commit")]
    Cancelled,

    /// Committed, but publishing or appending failed.
    #[error("Changes committed but propagation failed: {0}")]
    Propagation(#[source] PropagationError),

    /// Cancelled after commit; propagation ran to completion regardless.
    #[error("Save cancelled after commit")]
    CancelledAfterCommit { propagation: Option<PropagationError> },
}

impl SaveError {
    /// Whether the relational write is durable despite the error.
    pub fn is_committed(&self) -> bool {
        matches!(
            self,
            SaveError::Propagation(_) | SaveError::CancelledAfterCommit { .. }
        )
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, SaveError::Conflict(_))
    }
}
