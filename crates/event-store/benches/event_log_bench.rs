use chrono::Utc;
use common::AggregateId;
use criterion::{Criterion, criterion_group, criterion_main};
use event_store::{EventEnvelope, EventLogStore, EventQuery, InMemoryEventLog};

fn make_envelope(aggregate_id: AggregateId) -> EventEnvelope {
    let payload = serde_json::json!({
        "type": "CustomerCreated",
        "data": {
            "id": aggregate_id.to_string(),
            "email": "ana@example.com"
        }
    });
    EventEnvelope::new(
        aggregate_id,
        "CustomerCreated",
        payload.to_string(),
        Utc::now(),
    )
}

fn bench_append_single(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    c.bench_function("event_log/append_single", |b| {
        b.iter(|| {
            rt.block_on(async {
                let log = InMemoryEventLog::new();
                log.append(vec![make_envelope(AggregateId::new())])
                    .await
                    .unwrap();
            });
        });
    });
}

fn bench_append_batch_10(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    c.bench_function("event_log/append_batch_10", |b| {
        b.iter(|| {
            rt.block_on(async {
                let log = InMemoryEventLog::new();
                let batch: Vec<_> = (0..10).map(|_| make_envelope(AggregateId::new())).collect();
                log.append(batch).await.unwrap();
            });
        });
    });
}

fn bench_reappend_duplicate_batch(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let log = InMemoryEventLog::new();
    let batch: Vec<_> = (0..10).map(|_| make_envelope(AggregateId::new())).collect();
    rt.block_on(log.append(batch.clone())).unwrap();

    c.bench_function("event_log/reappend_duplicate_batch_10", |b| {
        b.iter(|| {
            rt.block_on(async {
                log.append(batch.clone()).await.unwrap();
            });
        });
    });
}

fn bench_query_by_aggregate(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let log = InMemoryEventLog::new();
    let agg_id = AggregateId::new();

    // 100 envelopes for the target among 1000 total
    rt.block_on(async {
        for i in 0..1000 {
            let id = if i % 10 == 0 { agg_id } else { AggregateId::new() };
            log.append(vec![make_envelope(id)]).await.unwrap();
        }
    });

    c.bench_function("event_log/query_aggregate_100_of_1000", |b| {
        b.iter(|| {
            rt.block_on(async {
                log.query_events(EventQuery::for_aggregate(agg_id))
                    .await
                    .unwrap();
            });
        });
    });
}

fn bench_stream_all_events(c: &mut Criterion) {
    use futures_util::StreamExt;

    let rt = tokio::runtime::Runtime::new().unwrap();
    let log = InMemoryEventLog::new();

    rt.block_on(async {
        for _ in 0..10 {
            let batch: Vec<_> = (0..100).map(|_| make_envelope(AggregateId::new())).collect();
            log.append(batch).await.unwrap();
        }
    });

    c.bench_function("event_log/stream_1000_events", |b| {
        b.iter(|| {
            rt.block_on(async {
                let mut stream = log.stream_all_events().await.unwrap();
                let mut count = 0;
                while let Some(result) = stream.next().await {
                    result.unwrap();
                    count += 1;
                }
                assert_eq!(count, 1000);
            });
        });
    });
}

criterion_group!(
    benches,
    bench_append_single,
    bench_append_batch_10,
    bench_reappend_duplicate_batch,
    bench_query_by_aggregate,
    bench_stream_all_events,
);
criterion_main!(benches);
