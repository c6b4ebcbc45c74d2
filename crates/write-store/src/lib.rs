//! PostgreSQL write side.
//!
//! [`PostgresStore`] opens read-committed transactions for the unit of work;
//! [`PgCustomerRepository`] reads committed customers and registers changes
//! for the next save.

mod customer;
mod error;
mod store;

pub use customer::{PgCustomerRepository, PgCustomerWriter};
pub use error::classify;
pub use store::{PgTransaction, PostgresStore};
