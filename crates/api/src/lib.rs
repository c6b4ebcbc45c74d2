//! HTTP API server for the customer write pipeline.
//!
//! Commands go through a unit of work against the configured transactional
//! store; queries are answered by the in-memory customer view, which the
//! in-process bus keeps current after every commit. Structured logging
//! (tracing) and Prometheus metrics are wired in by the binary.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post, put};
use domain::customer::CustomerEvent;
use domain::{
    CustomerCommandHandler, CustomerRepositoryProvider, EventPublisher, EventTypeRegistry,
    InProcessEventBus, RetryPolicy, UnitOfWorkFactory,
};
use event_store::EventLogStore;
use metrics_exporter_prometheus::PrometheusHandle;
use projections::{CustomerView, ProjectionProcessor};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use routes::customers::AppState;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: CustomerRepositoryProvider>(
    state: Arc<AppState<S>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route(
            "/customers",
            post(routes::customers::create::<S>).get(routes::customers::list::<S>),
        )
        .route("/customers/rebuild", post(routes::customers::rebuild::<S>))
        .route(
            "/customers/by-email/{email}",
            get(routes::customers::get_by_email::<S>),
        )
        .route("/customers/{id}", get(routes::customers::get::<S>))
        .route(
            "/customers/{id}/email",
            put(routes::customers::change_email::<S>),
        )
        .route("/customers/{id}/events", get(routes::customers::events::<S>))
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Wires the write side, the bus, the customer view and the replay processor.
///
/// The view is subscribed before any command runs, so every event committed
/// through the returned handler reaches it.
pub fn create_state<S: CustomerRepositoryProvider>(
    store: S,
    event_log: Arc<dyn EventLogStore>,
    retry: RetryPolicy,
) -> Arc<AppState<S>> {
    let bus = Arc::new(InProcessEventBus::new());
    let customers = CustomerView::new();
    customers.subscribe(&bus);

    let mut registry = EventTypeRegistry::new();
    registry.register::<CustomerEvent>(CustomerEvent::EVENT_TYPES);

    let mut processor =
        ProjectionProcessor::new(Arc::clone(&event_log), Arc::new(registry), Arc::clone(&bus));
    processor.register(Arc::new(customers.clone()));

    let factory = UnitOfWorkFactory::new(
        store,
        Arc::clone(&event_log),
        bus as Arc<dyn EventPublisher>,
    )
    .with_retry_policy(retry);

    Arc::new(AppState {
        handler: CustomerCommandHandler::new(factory),
        customers,
        event_log,
        processor: Arc::new(processor),
    })
}
