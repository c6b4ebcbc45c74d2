//! In-process event delivery.
//!
//! - [`EventPublisher`]: the contract the unit of work publishes through
//! - [`InProcessEventBus`]: typed handler registry with concurrent fan-out
//! - [`EventTypeRegistry`]: tag to decoder map used by replay

mod bus;
mod handler;
mod publisher;
mod registry;

pub use bus::InProcessEventBus;
pub use handler::{EventHandler, HandlerError};
pub use publisher::{DeliveryFailure, EventPublisher, NoopPublisher, PublishError};
pub use registry::{EventTypeRegistry, RegistryError};
