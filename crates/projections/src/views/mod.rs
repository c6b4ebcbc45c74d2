//! Read model views for the CQRS query side.

pub mod customers;

pub use customers::{CustomerSummary, CustomerView};
