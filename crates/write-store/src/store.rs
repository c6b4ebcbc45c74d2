use async_trait::async_trait;
use domain::{StoreError, TransactionalStore};
use sqlx::{PgConnection, PgPool, Postgres, Transaction};

use crate::error::classify;

/// An open PostgreSQL transaction.
///
/// Dropping it without commit returns the connection to the pool and rolls
/// the transaction back.
pub struct PgTransaction {
    inner: Transaction<'static, Postgres>,
}

impl PgTransaction {
    /// The connection the transaction runs on.
    pub fn connection(&mut self) -> &mut PgConnection {
        &mut self.inner
    }
}

/// PostgreSQL-backed transactional store.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl TransactionalStore for PostgresStore {
    type Transaction = PgTransaction;

    async fn begin(&self) -> Result<PgTransaction, StoreError> {
        let mut inner = self.pool.begin().await.map_err(classify)?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL READ COMMITTED")
            .execute(&mut *inner)
            .await
            .map_err(classify)?;
        Ok(PgTransaction { inner })
    }

    async fn commit(&self, tx: PgTransaction) -> Result<(), StoreError> {
        tx.inner.commit().await.map_err(classify)
    }

    async fn rollback(&self, tx: PgTransaction) -> Result<(), StoreError> {
        tx.inner.rollback().await.map_err(|error| {
            tracing::warn!(%error, "rollback failed, connection will be discarded");
            classify(error)
        })
    }
}
