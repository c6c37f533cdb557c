//! Field identifiers and event stamps.

use std::sync::atomic::{AtomicU64, Ordering};

/// Unique identifier for a field.
///
/// Ids come from a process-wide counter, so a handle from one graph can
/// never alias a field of another graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FieldId(u64);

impl FieldId {
    /// Generate a new unique field ID.
    pub(crate) fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// Logical time stamp of an event.
///
/// Each graph keeps its own strictly increasing counter. Stamps only order
/// events relative to each other; wall-clock time lives in SFTime fields.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventStamp(pub(crate) u64);

impl EventStamp {
    pub fn raw(&self) -> u64 {
        self.0
    }
}
