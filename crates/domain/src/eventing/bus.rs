use std::any::TypeId;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use futures_util::future::join_all;

use super::handler::{EventHandler, HandlerError};
use super::publisher::{DeliveryFailure, EventPublisher, PublishError};
use crate::aggregate::DomainEvent;

#[async_trait]
trait ErasedHandler: Send + Sync {
    fn name(&self) -> &str;
    async fn handle(&self, event: &dyn DomainEvent) -> Result<(), HandlerError>;
}

struct TypedHandler<E, H> {
    handler: Arc<H>,
    _event: PhantomData<fn(E)>,
}

#[async_trait]
impl<E, H> ErasedHandler for TypedHandler<E, H>
where
    E: DomainEvent,
    H: EventHandler<E> + 'static,
{
    fn name(&self) -> &str {
        self.handler.name()
    }

    async fn handle(&self, event: &dyn DomainEvent) -> Result<(), HandlerError> {
        match event.as_any().downcast_ref::<E>() {
            Some(event) => self.handler.handle(event).await,
            None => Ok(()),
        }
    }
}

/// In-process publisher with an explicit handler registry.
///
/// Handlers are registered per concrete event type at startup. Publishing an
/// event runs all of its handlers concurrently and waits for every one of
/// them; failures are collected rather than short-circuiting.
#[derive(Default)]
pub struct InProcessEventBus {
    handlers: RwLock<HashMap<TypeId, Vec<Arc<dyn ErasedHandler>>>>,
}

impl InProcessEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for events of type `E`.
    pub fn subscribe<E, H>(&self, handler: Arc<H>)
    where
        E: DomainEvent,
        H: EventHandler<E> + 'static,
    {
        let name = handler.name().to_string();
        let erased: Arc<dyn ErasedHandler> = Arc::new(TypedHandler::<E, H> {
            handler,
            _event: PhantomData,
        });
        self.handlers
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .entry(TypeId::of::<E>())
            .or_default()
            .push(erased);
        tracing::debug!(handler = %name, event = std::any::type_name::<E>(), "handler subscribed");
    }

    /// Number of handlers registered for `E`.
    pub fn handler_count<E: DomainEvent>(&self) -> usize {
        self.handlers
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(&TypeId::of::<E>())
            .map_or(0, Vec::len)
    }

    fn handlers_for(&self, event: &dyn DomainEvent) -> Vec<Arc<dyn ErasedHandler>> {
        self.handlers
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(&event.as_any().type_id())
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl EventPublisher for InProcessEventBus {
    async fn publish(&self, event: Arc<dyn DomainEvent>) -> Result<(), PublishError> {
        let handlers = self.handlers_for(event.as_ref());
        if handlers.is_empty() {
            tracing::trace!(event_type = event.event_type(), "no subscribers");
            return Ok(());
        }

        let results = join_all(handlers.iter().map(|h| h.handle(event.as_ref()))).await;

        let failures: Vec<_> = handlers
            .iter()
            .zip(results)
            .filter_map(|(handler, result)| {
                result.err().map(|e| DeliveryFailure {
                    event_type: event.event_type().to_string(),
                    aggregate_id: event.aggregate_id(),
                    handler: handler.name().to_string(),
                    message: e.message,
                })
            })
            .collect();

        let delivered = handlers.len() - failures.len();
        metrics::counter!("event_bus_deliveries_total").increment(delivered as u64);

        if failures.is_empty() {
            Ok(())
        } else {
            metrics::counter!("event_bus_delivery_failures_total").increment(failures.len() as u64);
            for failure in &failures {
                tracing::warn!(
                    event_type = %failure.event_type,
                    aggregate_id = %failure.aggregate_id,
                    handler = %failure.handler,
                    error = %failure.message,
                    "event delivery failed"
                );
            }
            Err(PublishError::new(failures))
        }
    }
}
