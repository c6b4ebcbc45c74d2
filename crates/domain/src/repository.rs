//! Write-side repository contract.

use async_trait::async_trait;
use common::AggregateId;

use crate::aggregate::AggregateRoot;
use crate::unit_of_work::StoreError;

/// Per-aggregate write repository bound to one unit of work.
///
/// Reads see committed state only. `add` and `update` register the aggregate
/// with the unit of work's tracker; nothing is written until
/// `save_changes`.
#[async_trait]
pub trait WriteRepository<A: AggregateRoot>: Send + Sync {
    /// The business key guarded by a unique constraint.
    type Key: ?Sized + Sync;

    async fn exists_by_unique_key(&self, key: &Self::Key) -> Result<bool, StoreError>;

    async fn get_by_id(&self, id: AggregateId) -> Result<Option<A>, StoreError>;

    /// Registers a new aggregate for insertion.
    fn add(&self, aggregate: A);

    /// Registers a loaded aggregate for update.
    fn update(&self, aggregate: A);
}
