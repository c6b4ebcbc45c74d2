//! Projection processor for replaying the event log into read models.

use std::sync::Arc;

use domain::{EventPublisher, EventTypeRegistry, InProcessEventBus, RegistryError};
use event_store::{EventEnvelope, EventLogStore};
use futures_util::StreamExt;

use crate::projection::Projection;
use crate::{ProjectionError, Result};

/// Replays stored envelopes through the in-process bus.
///
/// Each envelope is decoded with the [`EventTypeRegistry`] and published to
/// the same bus that receives live events after commit, so replayed and live
/// events go through identical handlers. Envelopes whose type has no decoder
/// are skipped. During a replay, handler failures are logged and counted
/// without stopping it; the log may lack envelopes whose append was lost
/// after commit, so later events can refer to state the views never saw.
pub struct ProjectionProcessor {
    log: Arc<dyn EventLogStore>,
    registry: Arc<EventTypeRegistry>,
    bus: Arc<InProcessEventBus>,
    projections: Vec<Arc<dyn Projection>>,
}

impl ProjectionProcessor {
    /// Creates a new processor over the given log, registry and bus.
    pub fn new(
        log: Arc<dyn EventLogStore>,
        registry: Arc<EventTypeRegistry>,
        bus: Arc<InProcessEventBus>,
    ) -> Self {
        Self {
            log,
            registry,
            bus,
            projections: Vec::new(),
        }
    }

    /// Registers a projection to be reset by [`rebuild_all`](Self::rebuild_all).
    pub fn register(&mut self, projection: Arc<dyn Projection>) {
        self.projections.push(projection);
    }

    /// Returns the number of registered projections.
    pub fn projection_count(&self) -> usize {
        self.projections.len()
    }

    /// Streams the whole event log through the bus in insertion order.
    ///
    /// Returns the number of envelopes delivered to every handler without
    /// error. Reading or decoding failures stop the replay.
    #[tracing::instrument(skip(self))]
    pub async fn replay(&self) -> Result<u64> {
        let mut stream = self.log.stream_all_events().await?;
        let mut delivered: u64 = 0;
        let mut failed: u64 = 0;

        while let Some(result) = stream.next().await {
            let envelope = result?;
            match self.process_envelope(&envelope).await {
                Ok(true) => delivered += 1,
                Ok(false) => {}
                Err(ProjectionError::Delivery(error)) => {
                    failed += 1;
                    metrics::counter!("projections_delivery_failures_total").increment(1);
                    tracing::warn!(
                        envelope_id = %envelope.id(),
                        event_type = %envelope.event_type(),
                        %error,
                        "handler failed during replay, continuing"
                    );
                }
                Err(error) => return Err(error),
            }
        }

        tracing::info!(events_processed = delivered, failed, "replay complete");

        Ok(delivered)
    }

    /// Decodes one envelope and publishes it.
    ///
    /// Returns `false` when the envelope's type has no registered decoder.
    #[tracing::instrument(skip(self, envelope), fields(event_type = %envelope.event_type()))]
    pub async fn process_envelope(&self, envelope: &EventEnvelope) -> Result<bool> {
        let event = match self.registry.decode(envelope) {
            Ok(event) => event,
            Err(RegistryError::UnknownEventType(event_type)) => {
                tracing::debug!(%event_type, envelope_id = %envelope.id(), "no decoder, skipping");
                return Ok(false);
            }
            Err(error) => return Err(error.into()),
        };

        self.bus.publish(event).await?;
        metrics::counter!("projections_events_processed").increment(1);
        Ok(true)
    }

    /// Resets all projections and replays the event log from the start.
    #[tracing::instrument(skip(self))]
    pub async fn rebuild_all(&self) -> Result<u64> {
        for projection in &self.projections {
            tracing::debug!(projection = projection.name(), "resetting projection");
            projection.reset().await?;
        }
        self.replay().await
    }
}
