use thiserror::Error;

/// Errors that can occur when interacting with the event log.
#[derive(Debug, Error)]
pub enum EventStoreError {
    /// The log cannot currently accept or serve requests.
    #[error("Event log unavailable: {0}")]
    Unavailable(String),

    /// The batch passed to `append` is malformed.
    #[error("Invalid append batch: {0}")]
    InvalidBatch(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl EventStoreError {
    /// Whether this is the storage-unavailable failure kind.
    pub fn is_unavailable(&self) -> bool {
        match self {
            EventStoreError::Unavailable(_) => true,
            EventStoreError::Database(e) => matches!(
                e,
                sqlx::Error::Io(_)
                    | sqlx::Error::PoolTimedOut
                    | sqlx::Error::PoolClosed
                    | sqlx::Error::WorkerCrashed
            ),
            _ => false,
        }
    }
}

/// Result type for event log operations.
pub type Result<T> = std::result::Result<T, EventStoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_unavailability() {
        assert!(EventStoreError::Unavailable("down".into()).is_unavailable());
        assert!(EventStoreError::Database(sqlx::Error::PoolTimedOut).is_unavailable());
        assert!(!EventStoreError::InvalidBatch("dup".into()).is_unavailable());
        assert!(!EventStoreError::Database(sqlx::Error::RowNotFound).is_unavailable());
    }
}
