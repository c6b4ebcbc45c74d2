//! Domain error types.

use common::AggregateId;
use thiserror::Error;

use crate::unit_of_work::{SaveError, StoreError};

/// Errors returned by command handlers.
#[derive(Debug, Error)]
pub enum DomainError {
    /// The command failed validation; every failure is listed.
    #[error("Validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),

    /// A business rule or unique constraint rejected the command.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Aggregate not found.
    #[error("Aggregate not found: {aggregate_type} with id {aggregate_id}")]
    NotFound {
        aggregate_type: &'static str,
        aggregate_id: AggregateId,
    },

    /// Reading the write model failed.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Saving failed before or at commit.
    #[error("Save failed: {0}")]
    Save(#[from] SaveError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_message_lists_every_failure() {
        let error = DomainError::Validation(vec!["first name is required".into(), "email is required".into()]);
        assert_eq!(
            error.to_string(),
            "Validation failed: first name is required; email is required"
        );
    }
}
