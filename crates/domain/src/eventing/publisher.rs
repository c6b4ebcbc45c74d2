use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use common::AggregateId;

use crate::aggregate::DomainEvent;

/// Delivers committed domain events to in-process subscribers.
///
/// Implementations must tolerate concurrent calls. A delivery that succeeded
/// is never undone because another one failed.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publishes one event to every subscriber of its type.
    async fn publish(&self, event: Arc<dyn DomainEvent>) -> Result<(), PublishError>;
}

/// One failed handler invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryFailure {
    pub event_type: String,
    pub aggregate_id: AggregateId,
    pub handler: String,
    pub message: String,
}

impl fmt::Display for DeliveryFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} for {} failed in {}: {}",
            self.event_type, self.aggregate_id, self.handler, self.message
        )
    }
}

/// Failures collected while publishing one or more events.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishError {
    pub failures: Vec<DeliveryFailure>,
}

impl PublishError {
    pub fn new(failures: Vec<DeliveryFailure>) -> Self {
        Self { failures }
    }

    /// Folds another error's failures into this one.
    pub fn merge(&mut self, other: PublishError) {
        self.failures.extend(other.failures);
    }

    pub fn len(&self) -> usize {
        self.failures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }
}

impl fmt::Display for PublishError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} event deliveries failed", self.failures.len())?;
        if let Some(first) = self.failures.first() {
            write!(f, " (first: {first})")?;
        }
        Ok(())
    }
}

impl std::error::Error for PublishError {}

/// Publisher with no subscribers.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopPublisher;

#[async_trait]
impl EventPublisher for NoopPublisher {
    async fn publish(&self, _event: Arc<dyn DomainEvent>) -> Result<(), PublishError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failure(handler: &str) -> DeliveryFailure {
        DeliveryFailure {
            event_type: "CustomerCreated".into(),
            aggregate_id: AggregateId::new(),
            handler: handler.into(),
            message: "boom".into(),
        }
    }

    #[test]
    fn merge_keeps_every_failure() {
        let mut error = PublishError::new(vec![failure("a")]);
        error.merge(PublishError::new(vec![failure("b"), failure("c")]));

        assert_eq!(error.len(), 3);
        let handlers: Vec<_> = error.failures.iter().map(|f| f.handler.as_str()).collect();
        assert_eq!(handlers, vec!["a", "b", "c"]);
    }

    #[test]
    fn display_mentions_count_and_first_failure() {
        let error = PublishError::new(vec![failure("customer_view"), failure("mailer")]);
        let text = error.to_string();
        assert!(text.starts_with("2 event deliveries failed"));
        assert!(text.contains("customer_view"));
    }
}
