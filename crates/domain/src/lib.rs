//! Write side of the CQRS pipeline.
//!
//! This crate provides:
//! - Aggregate roots that buffer the domain events they raise
//! - A unit of work that persists tracked aggregates in one transaction and
//!   propagates their events after commit
//! - An in-process event bus and an event-type registry for replay
//! - The customer write model and its command handler

pub mod aggregate;
pub mod customer;
pub mod error;
pub mod eventing;
pub mod repository;
pub mod retry;
pub mod unit_of_work;

pub use aggregate::{AggregateRoot, DomainEvent, EventBuffer};
pub use customer::{
    ChangeCustomerEmail, CommandOutcome, CreateCustomer, Customer, CustomerCommandHandler,
    CustomerEvent, CustomerRecord, CustomerRepositoryProvider, Email, Gender, NewCustomer,
};
pub use error::DomainError;
pub use eventing::{
    DeliveryFailure, EventHandler, EventPublisher, EventTypeRegistry, HandlerError,
    InProcessEventBus, NoopPublisher, PublishError, RegistryError,
};
pub use repository::WriteRepository;
pub use retry::{IsTransient, RetryPolicy};
pub use unit_of_work::{
    ChangeTracker, InMemoryStore, PropagationError, SaveError, StoreError, TransactionalStore,
    UnitOfWork, UnitOfWorkFactory,
};
