//! Read side of the CQRS pipeline.
//!
//! This crate provides:
//! - [`CustomerView`], an in-memory customer read model subscribed to
//!   customer events on the in-process bus
//! - [`Projection`] and [`ReadModel`] traits for rebuildable views
//! - [`ProjectionProcessor`] for replaying the event log into the views

pub mod error;
pub mod processor;
pub mod projection;
pub mod read_model;
pub mod views;

pub use error::{ProjectionError, Result};
pub use processor::ProjectionProcessor;
pub use projection::{Projection, ProjectionPosition};
pub use read_model::ReadModel;
pub use views::{CustomerSummary, CustomerView};
