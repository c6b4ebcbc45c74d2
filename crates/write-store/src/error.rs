use domain::StoreError;

const UNIQUE_VIOLATION: &str = "23505";
const SERIALIZATION_FAILURE: &str = "40001";
const DEADLOCK_DETECTED: &str = "40P01";

/// Maps a sqlx error onto the unit of work's failure kinds.
///
/// Unique violations become conflicts carrying the constraint name.
/// Serialization failures, deadlocks, connection-class errors (`08xxx`) and
/// pool or I/O failures are transient.
pub fn classify(error: sqlx::Error) -> StoreError {
    if let Some(db) = error.as_database_error() {
        let code = db.code().map(|c| c.into_owned()).unwrap_or_default();
        if code == UNIQUE_VIOLATION {
            return StoreError::conflict(db.constraint().unwrap_or_default(), db.message());
        }
        if code == SERIALIZATION_FAILURE || code == DEADLOCK_DETECTED || code.starts_with("08") {
            return StoreError::transient(db.message());
        }
    }

    match error {
        sqlx::Error::Io(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => StoreError::transient(error.to_string()),
        other => StoreError::database(other),
    }
}
