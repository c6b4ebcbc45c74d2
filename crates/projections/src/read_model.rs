//! Read model trait for query-side views.

/// A read model providing query access to denormalized data.
///
/// Read models are updated by domain events after the write side commits,
/// so they may briefly lag behind it.
pub trait ReadModel: Send + Sync {
    /// Returns the name of this read model.
    fn name(&self) -> &'static str;

    /// Returns the number of entries in this read model.
    fn count(&self) -> usize;
}
