//! The customer write model.
//!
//! Registration and email changes run through [`CustomerCommandHandler`],
//! which persists the [`Customer`] aggregate in a unit of work and lets it
//! propagate [`CustomerEvent`]s after commit.

mod aggregate;
mod commands;
mod events;
mod handler;
mod memory;
mod repository;
mod value_objects;

pub use aggregate::{Customer, CustomerRecord, NewCustomer};
pub use commands::{ChangeCustomerEmail, CreateCustomer};
pub use events::{CustomerCreatedData, CustomerEmailChangedData, CustomerEvent};
pub use handler::{CommandOutcome, CustomerCommandHandler};
pub use memory::{CustomerRowWriter, InMemoryCustomerRepository};
pub use repository::{CUSTOMERS_EMAIL_KEY, CUSTOMERS_TABLE, CustomerRepositoryProvider};
pub use value_objects::{Email, EmailError, Gender, UnknownGender};
