//! PostgreSQL integration tests
//!
//! These tests use a shared PostgreSQL container and need a Docker daemon.
//! Run with:
//!
//! ```bash
//! cargo test -p event-store --test postgres_integration -- --ignored --test-threads=1
//! ```

use std::sync::Arc;

use chrono::{Duration, Utc};
use event_store::{
    AggregateId, EventEnvelope, EventLogStore, EventLogStoreExt, EventQuery, PostgresEventLog,
};
use sqlx::PgPool;
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

/// Shared container info - container stays alive for all tests
struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Postgres>,
    connection_string: String,
}

/// Global shared container
static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Postgres::default().start().await.unwrap();

            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(5432).await.unwrap();

            let connection_string =
                format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

            let temp_pool = PgPool::connect(&connection_string).await.unwrap();
            sqlx::raw_sql(include_str!("../../../migrations/001_create_event_log.sql"))
                .execute(&temp_pool)
                .await
                .unwrap();
            temp_pool.close().await;

            Arc::new(ContainerInfo {
                container,
                connection_string,
            })
        })
        .await
        .clone()
}

/// Get a fresh log with its own pool and a cleared table
async fn get_test_log() -> PostgresEventLog {
    let info = get_container_info().await;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(&info.connection_string)
        .await
        .unwrap();

    sqlx::query("TRUNCATE TABLE event_log RESTART IDENTITY")
        .execute(&pool)
        .await
        .unwrap();

    PostgresEventLog::new(pool)
}

fn create_test_envelope(aggregate_id: AggregateId, event_type: &str) -> EventEnvelope {
    EventEnvelope::new(aggregate_id, event_type, r#"{"test":true}"#, Utc::now())
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn append_and_retrieve_envelopes() {
    let log = get_test_log().await;
    let aggregate_id = AggregateId::new();

    let envelope = create_test_envelope(aggregate_id, "CustomerCreated");
    log.append(vec![envelope.clone()]).await.unwrap();

    let events = log.get_events_for_aggregate(aggregate_id).await.unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].id(), envelope.id());
    assert_eq!(events[0].event_type(), "CustomerCreated");
    assert_eq!(events[0].payload(), r#"{"test":true}"#);
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn batch_keeps_insertion_order_across_aggregates() {
    let log = get_test_log().await;
    let a = AggregateId::new();
    let b = AggregateId::new();

    let batch = vec![
        create_test_envelope(b, "Event1"),
        create_test_envelope(a, "Event2"),
        create_test_envelope(b, "Event3"),
    ];
    let ids: Vec<_> = batch.iter().map(|e| e.id()).collect();
    log.append(batch).await.unwrap();

    let all = log.query_events(EventQuery::new()).await.unwrap();
    let stored: Vec<_> = all.iter().map(|e| e.id()).collect();
    assert_eq!(stored, ids);
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn reappending_is_idempotent() {
    let log = get_test_log().await;
    let batch = vec![
        create_test_envelope(AggregateId::new(), "Event1"),
        create_test_envelope(AggregateId::new(), "Event2"),
    ];

    log.append(batch.clone()).await.unwrap();
    log.append(batch).await.unwrap();

    assert_eq!(log.event_count().await.unwrap(), 2);
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn empty_batch_writes_nothing() {
    let log = get_test_log().await;
    log.append(Vec::new()).await.unwrap();
    assert_eq!(log.event_count().await.unwrap(), 0);
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn query_with_filters() {
    let log = get_test_log().await;
    let id = AggregateId::new();
    let now = Utc::now();

    log.append(vec![
        EventEnvelope::new(id, "CustomerCreated", "{}", now - Duration::days(1)),
        EventEnvelope::new(id, "CustomerEmailChanged", "{}", now),
        EventEnvelope::new(AggregateId::new(), "CustomerCreated", "{}", now),
    ])
    .await
    .unwrap();

    let created = log
        .query_events(EventQuery::for_event_type("CustomerCreated"))
        .await
        .unwrap();
    assert_eq!(created.len(), 2);

    let recent_for_id = log
        .query_events(
            EventQuery::for_aggregate(id).from_timestamp(now - Duration::hours(1)),
        )
        .await
        .unwrap();
    assert_eq!(recent_for_id.len(), 1);
    assert_eq!(recent_for_id[0].event_type(), "CustomerEmailChanged");

    let paged = log
        .query_events(EventQuery::new().offset(1).limit(1))
        .await
        .unwrap();
    assert_eq!(paged.len(), 1);
    assert_eq!(paged[0].event_type(), "CustomerEmailChanged");
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn stream_all_events_in_order() {
    use futures_util::StreamExt;

    let log = get_test_log().await;
    for name in ["Event1", "Event2", "Event3"] {
        log.append_one(create_test_envelope(AggregateId::new(), name))
            .await
            .unwrap();
    }

    let stream = log.stream_all_events().await.unwrap();
    let types: Vec<String> = stream
        .map(|r| r.unwrap().event_type().to_string())
        .collect()
        .await;
    assert_eq!(types, vec!["Event1", "Event2", "Event3"]);
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn has_events_for_aggregate() {
    let log = get_test_log().await;
    let id = AggregateId::new();

    assert!(!log.has_events_for(id).await.unwrap());
    log.append_one(create_test_envelope(id, "CustomerCreated"))
        .await
        .unwrap();
    assert!(log.has_events_for(id).await.unwrap());
}
