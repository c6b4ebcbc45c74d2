use std::fmt;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use common::AggregateId;

use super::error::StoreError;
use crate::aggregate::{AggregateRoot, DomainEvent};

/// A relational store that can open read-committed transactions.
///
/// The transaction handle is owned: committing or rolling back consumes it,
/// and dropping it without either must release the connection and discard
/// the pending writes.
#[async_trait]
pub trait TransactionalStore: Send + Sync + 'static {
    type Transaction: Send + 'static;

    /// Opens a transaction at read-committed isolation.
    async fn begin(&self) -> Result<Self::Transaction, StoreError>;

    /// Commits the transaction. On failure the transaction is rolled back.
    async fn commit(&self, tx: Self::Transaction) -> Result<(), StoreError>;

    async fn rollback(&self, tx: Self::Transaction) -> Result<(), StoreError>;
}

/// Writes one aggregate type inside a store transaction.
#[async_trait]
pub trait AggregateWriter<A, Tx>: Send + Sync {
    /// Inserts a new aggregate. Returns rows affected.
    async fn insert(&self, tx: &mut Tx, aggregate: &A) -> Result<u64, StoreError>;

    /// Updates an existing aggregate. Returns rows affected.
    async fn update(&self, tx: &mut Tx, aggregate: &A) -> Result<u64, StoreError>;
}

/// How a tracked aggregate is flushed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityState {
    Added,
    Modified,
}

/// A tracked aggregate with its concrete type erased.
#[async_trait]
pub trait Tracked<Tx>: Send + Sync {
    fn aggregate_id(&self) -> AggregateId;

    fn aggregate_type(&self) -> &'static str;

    fn state(&self) -> EntityState;

    fn pending_event_count(&self) -> usize;

    /// Drains the aggregate's buffer in raise order.
    fn take_events(&mut self) -> Vec<Arc<dyn DomainEvent>>;

    async fn persist(&self, tx: &mut Tx) -> Result<u64, StoreError>;
}

struct TrackedEntry<A, W> {
    aggregate: A,
    writer: Arc<W>,
    state: EntityState,
}

#[async_trait]
impl<A, W, Tx> Tracked<Tx> for TrackedEntry<A, W>
where
    A: AggregateRoot,
    W: AggregateWriter<A, Tx> + 'static,
    Tx: Send + 'static,
{
    fn aggregate_id(&self) -> AggregateId {
        self.aggregate.id()
    }

    fn aggregate_type(&self) -> &'static str {
        A::aggregate_type()
    }

    fn state(&self) -> EntityState {
        self.state
    }

    fn pending_event_count(&self) -> usize {
        self.aggregate.pending_events().len()
    }

    fn take_events(&mut self) -> Vec<Arc<dyn DomainEvent>> {
        self.aggregate
            .take_pending_events()
            .into_iter()
            .map(|event| Arc::new(event) as Arc<dyn DomainEvent>)
            .collect()
    }

    async fn persist(&self, tx: &mut Tx) -> Result<u64, StoreError> {
        match self.state {
            EntityState::Added => self.writer.insert(tx, &self.aggregate).await,
            EntityState::Modified => self.writer.update(tx, &self.aggregate).await,
        }
    }
}

/// The list of aggregates registered with one unit of work.
///
/// Cloned handles share the same list; repositories receive one and the
/// unit of work drains it on save. Registration order is preserved.
pub struct ChangeTracker<Tx> {
    entries: Arc<Mutex<Vec<Box<dyn Tracked<Tx>>>>>,
}

impl<Tx> Clone for ChangeTracker<Tx> {
    fn clone(&self) -> Self {
        Self {
            entries: Arc::clone(&self.entries),
        }
    }
}

impl<Tx: Send + 'static> Default for ChangeTracker<Tx> {
    fn default() -> Self {
        Self {
            entries: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl<Tx: Send + 'static> ChangeTracker<Tx> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `aggregate` to be written by `writer` on the next save.
    pub fn track<A, W>(&self, aggregate: A, writer: Arc<W>, state: EntityState)
    where
        A: AggregateRoot,
        W: AggregateWriter<A, Tx> + 'static,
    {
        tracing::trace!(
            aggregate_type = A::aggregate_type(),
            aggregate_id = %aggregate.id(),
            ?state,
            "tracking aggregate"
        );
        self.lock().push(Box::new(TrackedEntry {
            aggregate,
            writer,
            state,
        }));
    }

    /// Removes and returns every tracked aggregate.
    pub fn take(&self) -> Vec<Box<dyn Tracked<Tx>>> {
        std::mem::take(&mut *self.lock())
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Box<dyn Tracked<Tx>>>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl<Tx> fmt::Debug for ChangeTracker<Tx> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let len = self.entries.lock().map(|e| e.len()).unwrap_or_default();
        f.debug_struct("ChangeTracker").field("tracked", &len).finish()
    }
}
