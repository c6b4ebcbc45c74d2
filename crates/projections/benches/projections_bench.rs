use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use common::AggregateId;
use criterion::{Criterion, criterion_group, criterion_main};
use domain::customer::{CustomerCreatedData, CustomerEvent};
use domain::{DomainEvent, EventTypeRegistry, Gender, InProcessEventBus};
use event_store::{EventEnvelope, EventLogStore, InMemoryEventLog};
use projections::{CustomerView, ProjectionProcessor};

fn make_envelope(i: usize) -> EventEnvelope {
    let id = AggregateId::new();
    let event = CustomerEvent::CustomerCreated(CustomerCreatedData {
        customer_id: id,
        first_name: format!("Customer{i}"),
        last_name: "Bench".into(),
        gender: Gender::Female,
        email: format!("customer{i}@example.com"),
        date_of_birth: NaiveDate::from_ymd_opt(1990, 1, 1).unwrap(),
        created_at: Utc::now(),
    });
    EventEnvelope::new(id, event.event_type(), event.to_payload().unwrap(), Utc::now())
}

/// Populate a log with N customer-created events.
async fn populate_log(log: &InMemoryEventLog, n: usize) {
    let batch: Vec<_> = (0..n).map(make_envelope).collect();
    log.append(batch).await.unwrap();
}

fn registry() -> Arc<EventTypeRegistry> {
    let mut registry = EventTypeRegistry::new();
    registry.register::<CustomerEvent>(CustomerEvent::EVENT_TYPES);
    Arc::new(registry)
}

fn bench_replay(c: &mut Criterion, n: usize) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let log = InMemoryEventLog::new();
    rt.block_on(populate_log(&log, n));

    c.bench_function(&format!("projections/replay_{n}_events"), |b| {
        b.iter(|| {
            rt.block_on(async {
                let view = CustomerView::new();
                let bus = Arc::new(InProcessEventBus::new());
                view.subscribe(&bus);
                let processor = ProjectionProcessor::new(Arc::new(log.clone()), registry(), bus);
                processor.replay().await.unwrap();
            });
        });
    });
}

fn bench_replay_100(c: &mut Criterion) {
    bench_replay(c, 100);
}

fn bench_replay_1000(c: &mut Criterion) {
    bench_replay(c, 1000);
}

fn bench_get_all_sorted(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let log = InMemoryEventLog::new();
    rt.block_on(populate_log(&log, 1000));
    let view = CustomerView::new();
    let bus = Arc::new(InProcessEventBus::new());
    view.subscribe(&bus);
    let processor = ProjectionProcessor::new(Arc::new(log), registry(), bus);
    rt.block_on(processor.replay()).unwrap();

    c.bench_function("projections/get_all_sorted_1000", |b| {
        b.iter(|| rt.block_on(view.get_all()));
    });
}

criterion_group!(benches, bench_replay_100, bench_replay_1000, bench_get_all_sorted);
criterion_main!(benches);
