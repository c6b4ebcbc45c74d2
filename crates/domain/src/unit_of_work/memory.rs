//! In-memory transactional store with read-committed visibility and
//! unique indexes, for tests and the default API backend.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use async_trait::async_trait;
use common::AggregateId;
use tokio::sync::Mutex;

use super::error::StoreError;
use super::store::TransactionalStore;

/// Where an injected fault fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultPoint {
    Begin,
    Persist,
    Commit,
}

/// Transaction counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub begun: usize,
    pub committed: usize,
    pub rolled_back: usize,
}

/// A unique key value: `(index name, key)`.
pub type UniqueKey = (&'static str, String);

#[derive(Debug, Clone)]
struct Row {
    data: serde_json::Value,
    unique_keys: Vec<UniqueKey>,
}

#[derive(Debug, Default)]
struct Table {
    rows: HashMap<AggregateId, Row>,
    unique: HashMap<UniqueKey, AggregateId>,
}

impl Table {
    fn unique_owner(&self, key: &UniqueKey) -> Option<AggregateId> {
        self.unique.get(key).copied()
    }

    fn apply(&mut self, id: AggregateId, row: Row) {
        if let Some(old) = self.rows.remove(&id) {
            for key in old.unique_keys {
                self.unique.remove(&key);
            }
        }
        for key in &row.unique_keys {
            self.unique.insert(key.clone(), id);
        }
        self.rows.insert(id, row);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriteKind {
    Insert,
    Update,
}

#[derive(Debug, Clone)]
struct PendingWrite {
    table: &'static str,
    id: AggregateId,
    row: Row,
    kind: WriteKind,
}

#[derive(Default)]
struct Inner {
    tables: Mutex<HashMap<&'static str, Table>>,
    faults: StdMutex<Vec<(FaultPoint, StoreError)>>,
    begun: AtomicUsize,
    committed: AtomicUsize,
    rolled_back: AtomicUsize,
}

/// Shared in-memory store. Clones share state.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    inner: Arc<Inner>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues `error` to be returned the next time `point` is reached.
    ///
    /// Faults fire once each, in the order they were injected.
    pub fn inject_fault(&self, point: FaultPoint, error: StoreError) {
        self.faults().push((point, error));
    }

    pub fn stats(&self) -> StoreStats {
        StoreStats {
            begun: self.inner.begun.load(Ordering::SeqCst),
            committed: self.inner.committed.load(Ordering::SeqCst),
            rolled_back: self.inner.rolled_back.load(Ordering::SeqCst),
        }
    }

    /// Whether a committed row holds `key` in unique index `index`.
    pub async fn exists_unique(&self, table: &str, index: &'static str, key: &str) -> bool {
        let tables = self.inner.tables.lock().await;
        tables
            .get(table)
            .is_some_and(|t| t.unique.contains_key(&(index, key.to_string())))
    }

    /// Committed row by id.
    pub async fn get_row(&self, table: &str, id: AggregateId) -> Option<serde_json::Value> {
        let tables = self.inner.tables.lock().await;
        tables
            .get(table)
            .and_then(|t| t.rows.get(&id))
            .map(|row| row.data.clone())
    }

    pub async fn row_count(&self, table: &str) -> usize {
        let tables = self.inner.tables.lock().await;
        tables.get(table).map_or(0, |t| t.rows.len())
    }

    fn faults(&self) -> std::sync::MutexGuard<'_, Vec<(FaultPoint, StoreError)>> {
        self.inner
            .faults
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn take_fault(&self, point: FaultPoint) -> Option<StoreError> {
        let mut faults = self.faults();
        let index = faults.iter().position(|(p, _)| *p == point)?;
        Some(faults.remove(index).1)
    }

    fn record_rollback(&self) {
        self.inner.rolled_back.fetch_add(1, Ordering::SeqCst);
    }

    /// Checks a write against committed state plus the writes already pending
    /// in the same transaction.
    fn check_write(
        tables: &HashMap<&'static str, Table>,
        pending: &[PendingWrite],
        write: &PendingWrite,
    ) -> Result<(), StoreError> {
        let table = tables.get(write.table);
        let pending_same_table = pending.iter().filter(|p| p.table == write.table);

        if write.kind == WriteKind::Insert {
            let committed = table.is_some_and(|t| t.rows.contains_key(&write.id));
            let staged = pending_same_table
                .clone()
                .any(|p| p.id == write.id && p.kind == WriteKind::Insert);
            if committed || staged {
                return Err(StoreError::conflict(
                    format!("{}_pkey", write.table),
                    format!("duplicate key id={}", write.id),
                ));
            }
        }

        for key in &write.row.unique_keys {
            let committed_owner = table
                .and_then(|t| t.unique_owner(key))
                .filter(|owner| *owner != write.id);
            let staged_owner = pending_same_table
                .clone()
                .find(|p| p.id != write.id && p.row.unique_keys.contains(key))
                .map(|p| p.id);

            if committed_owner.is_some() || staged_owner.is_some() {
                return Err(StoreError::conflict(
                    key.0,
                    format!("duplicate key value {}", key.1),
                ));
            }
        }

        Ok(())
    }
}

/// An open in-memory transaction.
///
/// Writes are staged and only become visible on commit. Dropping the handle
/// without committing discards them and counts as a rollback.
pub struct MemoryTransaction {
    store: InMemoryStore,
    writes: Vec<PendingWrite>,
    finished: bool,
}

impl MemoryTransaction {
    pub async fn insert(
        &mut self,
        table: &'static str,
        id: AggregateId,
        data: serde_json::Value,
        unique_keys: Vec<UniqueKey>,
    ) -> Result<u64, StoreError> {
        self.stage(table, id, data, unique_keys, WriteKind::Insert)
            .await
    }

    /// Stages an update. Returns 0 rows when the id is unknown.
    pub async fn update(
        &mut self,
        table: &'static str,
        id: AggregateId,
        data: serde_json::Value,
        unique_keys: Vec<UniqueKey>,
    ) -> Result<u64, StoreError> {
        self.stage(table, id, data, unique_keys, WriteKind::Update)
            .await
    }

    async fn stage(
        &mut self,
        table: &'static str,
        id: AggregateId,
        data: serde_json::Value,
        unique_keys: Vec<UniqueKey>,
        kind: WriteKind,
    ) -> Result<u64, StoreError> {
        if let Some(error) = self.store.take_fault(FaultPoint::Persist) {
            return Err(error);
        }

        let write = PendingWrite {
            table,
            id,
            row: Row { data, unique_keys },
            kind,
        };

        let tables = self.store.inner.tables.lock().await;
        if kind == WriteKind::Update {
            let known = tables.get(table).is_some_and(|t| t.rows.contains_key(&id))
                || self.writes.iter().any(|p| p.table == table && p.id == id);
            if !known {
                return Ok(0);
            }
        }
        InMemoryStore::check_write(&tables, &self.writes, &write)?;
        drop(tables);

        self.writes.push(write);
        Ok(1)
    }

    pub fn pending_writes(&self) -> usize {
        self.writes.len()
    }
}

impl Drop for MemoryTransaction {
    fn drop(&mut self) {
        if !self.finished {
            tracing::debug!(pending = self.writes.len(), "transaction dropped, rolling back");
            self.store.record_rollback();
        }
    }
}

#[async_trait]
impl TransactionalStore for InMemoryStore {
    type Transaction = MemoryTransaction;

    async fn begin(&self) -> Result<MemoryTransaction, StoreError> {
        if let Some(error) = self.take_fault(FaultPoint::Begin) {
            return Err(error);
        }
        self.inner.begun.fetch_add(1, Ordering::SeqCst);
        Ok(MemoryTransaction {
            store: self.clone(),
            writes: Vec::new(),
            finished: false,
        })
    }

    async fn commit(&self, mut tx: MemoryTransaction) -> Result<(), StoreError> {
        if let Some(error) = self.take_fault(FaultPoint::Commit) {
            return Err(error);
        }

        let mut tables = self.inner.tables.lock().await;

        // Re-validate against rows committed since the writes were staged.
        for (index, write) in tx.writes.iter().enumerate() {
            Self::check_write(&tables, &tx.writes[..index], write)?;
        }

        for write in tx.writes.drain(..) {
            tables
                .entry(write.table)
                .or_default()
                .apply(write.id, write.row);
        }
        tx.finished = true;
        self.inner.committed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn rollback(&self, mut tx: MemoryTransaction) -> Result<(), StoreError> {
        tx.writes.clear();
        tx.finished = true;
        self.record_rollback();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const EMAIL_KEY: &str = "customers_email_key";

    fn email(value: &str) -> Vec<UniqueKey> {
        vec![(EMAIL_KEY, value.to_string())]
    }

    #[tokio::test]
    async fn staged_writes_are_invisible_until_commit() {
        let store = InMemoryStore::new();
        let id = AggregateId::new();

        let mut tx = store.begin().await.unwrap();
        tx.insert("customers", id, json!({"n": 1}), email("a@x.io"))
            .await
            .unwrap();
        assert!(store.get_row("customers", id).await.is_none());
        assert!(!store.exists_unique("customers", EMAIL_KEY, "a@x.io").await);

        store.commit(tx).await.unwrap();
        assert_eq!(store.get_row("customers", id).await, Some(json!({"n": 1})));
        assert!(store.exists_unique("customers", EMAIL_KEY, "a@x.io").await);
        assert_eq!(
            store.stats(),
            StoreStats {
                begun: 1,
                committed: 1,
                rolled_back: 0
            }
        );
    }

    #[tokio::test]
    async fn rollback_and_drop_discard_writes() {
        let store = InMemoryStore::new();

        let mut tx = store.begin().await.unwrap();
        tx.insert("customers", AggregateId::new(), json!({}), vec![])
            .await
            .unwrap();
        store.rollback(tx).await.unwrap();

        let mut tx = store.begin().await.unwrap();
        tx.insert("customers", AggregateId::new(), json!({}), vec![])
            .await
            .unwrap();
        drop(tx);

        assert_eq!(store.row_count("customers").await, 0);
        assert_eq!(store.stats().rolled_back, 2);
        assert_eq!(store.stats().committed, 0);
    }

    #[tokio::test]
    async fn unique_violation_against_committed_row() {
        let store = InMemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        tx.insert("customers", AggregateId::new(), json!({}), email("a@x.io"))
            .await
            .unwrap();
        store.commit(tx).await.unwrap();

        let mut tx = store.begin().await.unwrap();
        let err = tx
            .insert("customers", AggregateId::new(), json!({}), email("a@x.io"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict { ref constraint, .. } if constraint == EMAIL_KEY));
    }

    #[tokio::test]
    async fn racing_commits_on_same_key_conflict_once() {
        let store = InMemoryStore::new();

        let mut first = store.begin().await.unwrap();
        let mut second = store.begin().await.unwrap();
        first
            .insert("customers", AggregateId::new(), json!({}), email("a@x.io"))
            .await
            .unwrap();
        second
            .insert("customers", AggregateId::new(), json!({}), email("a@x.io"))
            .await
            .unwrap();

        store.commit(first).await.unwrap();
        let err = store.commit(second).await.unwrap_err();

        assert!(err.is_conflict());
        assert_eq!(store.row_count("customers").await, 1);
        assert_eq!(
            store.stats(),
            StoreStats {
                begun: 2,
                committed: 1,
                rolled_back: 1
            }
        );
    }

    #[tokio::test]
    async fn update_moves_unique_key() {
        let store = InMemoryStore::new();
        let id = AggregateId::new();

        let mut tx = store.begin().await.unwrap();
        tx.insert("customers", id, json!({}), email("old@x.io"))
            .await
            .unwrap();
        store.commit(tx).await.unwrap();

        let mut tx = store.begin().await.unwrap();
        let rows = tx
            .update("customers", id, json!({"v": 2}), email("new@x.io"))
            .await
            .unwrap();
        assert_eq!(rows, 1);
        store.commit(tx).await.unwrap();

        assert!(!store.exists_unique("customers", EMAIL_KEY, "old@x.io").await);
        assert!(store.exists_unique("customers", EMAIL_KEY, "new@x.io").await);

        let mut tx = store.begin().await.unwrap();
        let rows = tx
            .update("customers", AggregateId::new(), json!({}), vec![])
            .await
            .unwrap();
        assert_eq!(rows, 0);
    }

    #[tokio::test]
    async fn injected_faults_fire_once_at_their_point() {
        let store = InMemoryStore::new();
        store.inject_fault(FaultPoint::Begin, StoreError::transient("refused"));
        store.inject_fault(FaultPoint::Persist, StoreError::transient("reset"));

        assert!(store.begin().await.is_err());

        let mut tx = store.begin().await.unwrap();
        assert!(
            tx.insert("customers", AggregateId::new(), json!({}), vec![])
                .await
                .is_err()
        );
        assert_eq!(
            tx.insert("customers", AggregateId::new(), json!({}), vec![])
                .await
                .unwrap(),
            1
        );
        assert_eq!(tx.pending_writes(), 1);
    }
}
