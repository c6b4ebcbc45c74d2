use async_trait::async_trait;
use thiserror::Error;

/// Error returned by an event handler.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct HandlerError {
    pub message: String,
}

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<String> for HandlerError {
    fn from(message: String) -> Self {
        Self { message }
    }
}

impl From<&str> for HandlerError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

/// Subscriber for events of type `E`.
#[async_trait]
pub trait EventHandler<E>: Send + Sync {
    /// Handler name, used in delivery failure reports and logs.
    fn name(&self) -> &str;

    async fn handle(&self, event: &E) -> Result<(), HandlerError>;
}
