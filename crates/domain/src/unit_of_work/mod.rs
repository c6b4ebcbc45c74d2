//! The unit of work: one relational transaction per save, with the domain
//! events raised by tracked aggregates propagated only after commit.
//!
//! A save runs four pre-commit steps under the execution strategy
//! ([`RetryPolicy`]): begin, capture, persist, commit. Transient failures
//! before commit are retried with backoff; anything after commit is reported,
//! never retried.
//!
//! Between a successful commit and a successful append there is a window in
//! which the relational write is durable but the event log or the read model
//! lags behind. Callers learn about it through [`SaveError::is_committed`].

mod capture;
mod error;
mod memory;
mod store;

use std::any::TypeId;
use std::sync::Arc;
use std::time::Instant;

use common::{Clock, SystemClock};
use event_store::EventLogStore;
use futures_util::future::join_all;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::aggregate::DomainEvent;
use crate::eventing::{EventPublisher, PublishError};
use crate::retry::{IsTransient, RetryPolicy};

pub use capture::CapturedBatch;
pub use error::{PropagationError, SaveError, StoreError};
pub use memory::{FaultPoint, InMemoryStore, MemoryTransaction, StoreStats, UniqueKey};
pub use store::{AggregateWriter, ChangeTracker, EntityState, Tracked, TransactionalStore};

type TrackedList<Tx> = Vec<Box<dyn Tracked<Tx>>>;

/// How a single attempt ended short of commit.
enum AttemptFailure {
    PreCommit(StoreError),
    Commit(StoreError),
    Capture(serde_json::Error),
    Cancelled,
}

/// Coordinates one logical write against a [`TransactionalStore`].
///
/// Create one per command (see [`UnitOfWorkFactory`]); repositories register
/// aggregates through [`UnitOfWork::tracker`], and [`UnitOfWork::save_changes`]
/// writes them.
pub struct UnitOfWork<S: TransactionalStore> {
    store: S,
    event_log: Arc<dyn EventLogStore>,
    publisher: Arc<dyn EventPublisher>,
    retry: RetryPolicy,
    clock: Arc<dyn Clock>,
    tracker: ChangeTracker<S::Transaction>,
}

impl<S: TransactionalStore> UnitOfWork<S> {
    pub fn new(
        store: S,
        event_log: Arc<dyn EventLogStore>,
        publisher: Arc<dyn EventPublisher>,
    ) -> Self {
        Self {
            store,
            event_log,
            publisher,
            retry: RetryPolicy::default(),
            clock: Arc::new(SystemClock),
            tracker: ChangeTracker::new(),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Handle used by repositories to register aggregates.
    pub fn tracker(&self) -> ChangeTracker<S::Transaction> {
        self.tracker.clone()
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Persists every tracked aggregate and propagates their events.
    pub async fn save_changes(&self) -> Result<(), SaveError> {
        self.save_changes_with_cancellation(&CancellationToken::new())
            .await
    }

    /// Like [`save_changes`](Self::save_changes), observing `cancel`.
    ///
    /// Cancellation before commit rolls back and returns
    /// [`SaveError::Cancelled`]. Once committed, propagation always runs to
    /// completion and a cancellation is reported as
    /// [`SaveError::CancelledAfterCommit`].
    pub async fn save_changes_with_cancellation(
        &self,
        cancel: &CancellationToken,
    ) -> Result<(), SaveError> {
        let mut tracked = self.tracker.take();
        if tracked.is_empty() {
            tracing::debug!("nothing tracked, committing an empty transaction");
        }

        let started = Instant::now();
        let mut captured: Option<CapturedBatch> = None;
        let mut attempt = 0;

        let rows = loop {
            attempt += 1;
            match self
                .run_attempt(attempt, &mut tracked, &mut captured, cancel)
                .await
            {
                Ok(rows) => break rows,
                Err(AttemptFailure::PreCommit(error))
                    if error.is_transient() && self.retry.allows_retry(attempt) =>
                {
                    let delay = self.retry.delay_after(attempt);
                    metrics::counter!("unit_of_work_retries_total").increment(1);
                    tracing::warn!(
                        attempt,
                        max_attempts = self.retry.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "transient failure, retrying"
                    );
                    tokio::select! {
                        _ = cancel.cancelled() => return Err(SaveError::Cancelled),
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                Err(failure) => return Err(Self::save_error_from(failure, attempt)),
            }
        };

        metrics::counter!("unit_of_work_commits_total").increment(1);
        let batch = captured.unwrap_or_default();
        let event_count = batch.len();

        let propagation = self.propagate(batch).await;

        metrics::histogram!("unit_of_work_duration_seconds").record(started.elapsed().as_secs_f64());
        tracing::info!(
            rows_affected = rows,
            events = event_count,
            attempts = attempt,
            "changes confirmed"
        );

        match (propagation, cancel.is_cancelled()) {
            (Ok(()), false) => Ok(()),
            (result, true) => {
                tracing::warn!("save cancelled after commit");
                Err(SaveError::CancelledAfterCommit {
                    propagation: result.err(),
                })
            }
            (Err(error), false) => Err(SaveError::Propagation(error)),
        }
    }

    async fn run_attempt(
        &self,
        attempt: u32,
        tracked: &mut TrackedList<S::Transaction>,
        captured: &mut Option<CapturedBatch>,
        cancel: &CancellationToken,
    ) -> Result<u64, AttemptFailure> {
        let transaction_id = Uuid::new_v4();

        let mut tx = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(AttemptFailure::Cancelled),
            result = self.store.begin() => result.map_err(AttemptFailure::PreCommit)?,
        };
        tracing::debug!(%transaction_id, attempt, "begin transaction");

        if captured.is_none() {
            match capture::capture(tracked, self.clock.as_ref()) {
                Ok(batch) => *captured = Some(batch),
                Err(error) => {
                    self.rollback(tx, transaction_id, &error).await;
                    return Err(AttemptFailure::Capture(error));
                }
            }
        }

        let persisted = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            result = persist_all(tracked, &mut tx) => Some(result),
        };

        let rows = match persisted {
            Some(Ok(rows)) if !cancel.is_cancelled() => rows,
            Some(Ok(_)) | None => {
                self.rollback(tx, transaction_id, &"cancelled").await;
                return Err(AttemptFailure::Cancelled);
            }
            Some(Err(error)) => {
                self.rollback(tx, transaction_id, &error).await;
                return Err(AttemptFailure::PreCommit(error));
            }
        };

        tracing::debug!(%transaction_id, rows_affected = rows, "commit transaction");
        if let Err(error) = self.store.commit(tx).await {
            metrics::counter!("unit_of_work_rollbacks_total").increment(1);
            tracing::error!(%transaction_id, error = %error, "commit failed, transaction rolled back");
            return Err(AttemptFailure::Commit(error));
        }

        Ok(rows)
    }

    async fn rollback(
        &self,
        tx: S::Transaction,
        transaction_id: Uuid,
        reason: &(dyn std::fmt::Display + Sync),
    ) {
        metrics::counter!("unit_of_work_rollbacks_total").increment(1);
        tracing::error!(%transaction_id, error = %reason, "rolling back transaction");
        if let Err(error) = self.store.rollback(tx).await {
            tracing::error!(%transaction_id, error = %error, "rollback failed");
        }
    }

    fn save_error_from(failure: AttemptFailure, attempts: u32) -> SaveError {
        match failure {
            AttemptFailure::PreCommit(error) | AttemptFailure::Commit(error)
                if error.is_conflict() =>
            {
                SaveError::Conflict(error)
            }
            AttemptFailure::PreCommit(error) if error.is_transient() => {
                SaveError::RetriesExhausted {
                    attempts,
                    source: error,
                }
            }
            AttemptFailure::PreCommit(error) | AttemptFailure::Commit(error) => {
                SaveError::Store(error)
            }
            AttemptFailure::Capture(error) => SaveError::Capture(error),
            AttemptFailure::Cancelled => SaveError::Cancelled,
        }
    }

    /// Publishes then appends. Both run even if the other fails.
    async fn propagate(&self, batch: CapturedBatch) -> Result<(), PropagationError> {
        if batch.is_empty() {
            return Ok(());
        }
        let (events, envelopes) = batch.into_parts();

        let error = PropagationError {
            publish: self.publish_all(events).await.err(),
            append: self.event_log.append(envelopes).await.err(),
        };

        if error.is_empty() {
            Ok(())
        } else {
            metrics::counter!("unit_of_work_propagation_failures_total").increment(1);
            tracing::error!(error = %error, "changes committed but propagation failed");
            Err(error)
        }
    }

    /// Fans events out by concrete type: each group is published in order,
    /// groups run concurrently.
    async fn publish_all(&self, events: Vec<Arc<dyn DomainEvent>>) -> Result<(), PublishError> {
        let mut groups: Vec<(TypeId, Vec<Arc<dyn DomainEvent>>)> = Vec::new();
        for event in events {
            let type_id = event.as_any().type_id();
            match groups.iter_mut().find(|(id, _)| *id == type_id) {
                Some((_, group)) => group.push(event),
                None => groups.push((type_id, vec![event])),
            }
        }

        let results = join_all(groups.into_iter().map(|(_, group)| async move {
            let mut failures = PublishError::default();
            for event in group {
                if let Err(error) = self.publisher.publish(event).await {
                    failures.merge(error);
                }
            }
            failures
        }))
        .await;

        let mut combined = PublishError::default();
        for failures in results {
            combined.merge(failures);
        }

        if combined.is_empty() {
            Ok(())
        } else {
            Err(combined)
        }
    }
}

async fn persist_all<Tx: Send>(
    tracked: &TrackedList<Tx>,
    tx: &mut Tx,
) -> Result<u64, StoreError> {
    let mut rows = 0;
    for entry in tracked {
        rows += entry.persist(tx).await?;
    }
    Ok(rows)
}

/// Creates a fresh [`UnitOfWork`] per command over shared collaborators.
pub struct UnitOfWorkFactory<S> {
    store: S,
    event_log: Arc<dyn EventLogStore>,
    publisher: Arc<dyn EventPublisher>,
    retry: RetryPolicy,
    clock: Arc<dyn Clock>,
}

impl<S: Clone> Clone for UnitOfWorkFactory<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            event_log: Arc::clone(&self.event_log),
            publisher: Arc::clone(&self.publisher),
            retry: self.retry.clone(),
            clock: Arc::clone(&self.clock),
        }
    }
}

impl<S: TransactionalStore + Clone> UnitOfWorkFactory<S> {
    pub fn new(
        store: S,
        event_log: Arc<dyn EventLogStore>,
        publisher: Arc<dyn EventPublisher>,
    ) -> Self {
        Self {
            store,
            event_log,
            publisher,
            retry: RetryPolicy::default(),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    pub fn event_log(&self) -> &Arc<dyn EventLogStore> {
        &self.event_log
    }

    /// A new unit of work with an empty tracker.
    pub fn create(&self) -> UnitOfWork<S> {
        UnitOfWork::new(
            self.store.clone(),
            Arc::clone(&self.event_log),
            Arc::clone(&self.publisher),
        )
        .with_retry_policy(self.retry.clone())
        .with_clock(Arc::clone(&self.clock))
    }
}
