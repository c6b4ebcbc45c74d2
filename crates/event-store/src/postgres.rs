use async_trait::async_trait;
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::{
    AggregateId, EventEnvelope, EventId, EventQuery, EventStoreError, Result,
    store::{EventLogStore, EventStream, validate_envelopes},
};

const SELECT_COLUMNS: &str = "SELECT id, aggregate_id, event_type, payload, occurred_at FROM event_log";

/// PostgreSQL-backed event log.
///
/// Envelopes live in the `event_log` table; `position` (a `BIGSERIAL`)
/// records insertion order and every read is ordered by it.
#[derive(Clone)]
pub struct PostgresEventLog {
    pool: PgPool,
}

impl PostgresEventLog {
    /// Creates a new PostgreSQL event log.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    fn row_to_envelope(row: PgRow) -> Result<EventEnvelope> {
        Ok(EventEnvelope::from_parts(
            EventId::from_uuid(row.try_get::<Uuid, _>("id")?),
            AggregateId::from_uuid(row.try_get::<Uuid, _>("aggregate_id")?),
            row.try_get::<String, _>("event_type")?,
            row.try_get::<String, _>("payload")?,
            row.try_get("occurred_at")?,
        ))
    }
}

#[async_trait]
impl EventLogStore for PostgresEventLog {
    async fn append(&self, envelopes: Vec<EventEnvelope>) -> Result<()> {
        if envelopes.is_empty() {
            return Ok(());
        }
        validate_envelopes(&envelopes)?;

        let mut tx = self.pool.begin().await?;

        let mut inserted = 0u64;
        for envelope in &envelopes {
            let result = sqlx::query(
                r#"
                INSERT INTO event_log (id, aggregate_id, event_type, payload, occurred_at)
                VALUES ($1, $2, $3, $4, $5)
                ON CONFLICT (id) DO NOTHING
                "#,
            )
            .bind(envelope.id().as_uuid())
            .bind(envelope.aggregate_id().as_uuid())
            .bind(envelope.event_type())
            .bind(envelope.payload())
            .bind(envelope.occurred_at())
            .execute(&mut *tx)
            .await?;

            inserted += result.rows_affected();
        }

        tx.commit().await?;

        let skipped = envelopes.len() as u64 - inserted;
        if skipped > 0 {
            tracing::debug!(skipped, "skipped already appended envelopes");
        }
        metrics::counter!("event_log_appended_total").increment(inserted);

        Ok(())
    }

    async fn get_events_for_aggregate(
        &self,
        aggregate_id: AggregateId,
    ) -> Result<Vec<EventEnvelope>> {
        let rows = sqlx::query(&format!(
            "{SELECT_COLUMNS} WHERE aggregate_id = $1 ORDER BY position ASC"
        ))
        .bind(aggregate_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_envelope).collect()
    }

    async fn query_events(&self, query: EventQuery) -> Result<Vec<EventEnvelope>> {
        let mut sql = format!("{SELECT_COLUMNS} WHERE 1=1");
        let mut param_count = 0;

        // Build dynamic query
        if query.aggregate_id.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND aggregate_id = ${param_count}"));
        }
        if query.event_types.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND event_type = ANY(${param_count})"));
        }
        if query.from_timestamp.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND occurred_at >= ${param_count}"));
        }
        if query.to_timestamp.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND occurred_at <= ${param_count}"));
        }

        sql.push_str(" ORDER BY position ASC");

        if query.limit.is_some() {
            param_count += 1;
            sql.push_str(&format!(" LIMIT ${param_count}"));
        }
        if query.offset.is_some() {
            param_count += 1;
            sql.push_str(&format!(" OFFSET ${param_count}"));
        }

        let mut sqlx_query = sqlx::query(&sql);

        if let Some(id) = query.aggregate_id {
            sqlx_query = sqlx_query.bind(id.as_uuid());
        }
        if let Some(event_types) = query.event_types {
            sqlx_query = sqlx_query.bind(event_types);
        }
        if let Some(from_ts) = query.from_timestamp {
            sqlx_query = sqlx_query.bind(from_ts);
        }
        if let Some(to_ts) = query.to_timestamp {
            sqlx_query = sqlx_query.bind(to_ts);
        }
        if let Some(limit) = query.limit {
            sqlx_query = sqlx_query.bind(limit as i64);
        }
        if let Some(offset) = query.offset {
            sqlx_query = sqlx_query.bind(offset as i64);
        }

        let rows = sqlx_query.fetch_all(&self.pool).await?;
        rows.into_iter().map(Self::row_to_envelope).collect()
    }

    async fn stream_all_events(&self) -> Result<EventStream> {
        use futures_util::StreamExt;

        let stream = sqlx::query(
            r#"
            SELECT id, aggregate_id, event_type, payload, occurred_at
            FROM event_log
            ORDER BY position ASC
            "#,
        )
        .fetch(&self.pool)
        .map(|result| match result {
            Ok(row) => Self::row_to_envelope(row),
            Err(e) => Err(EventStoreError::Database(e)),
        });

        Ok(Box::pin(stream))
    }

    async fn event_count(&self) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM event_log")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u64)
    }
}
