//! Events and propagation passes.

use std::collections::HashSet;

use super::{EventStamp, FieldId};

/// The most recent event a field received.
///
/// `source` is the field the event arrived from; it is cleared once the
/// field has brought itself up to date, so a field is up to date exactly
/// when `source` is `None`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Event {
    pub source: Option<FieldId>,
    pub stamp: EventStamp,
}

impl Event {
    pub(crate) fn new(source: FieldId, stamp: EventStamp) -> Self {
        Self {
            source: Some(source),
            stamp,
        }
    }
}

/// State of one depth-first propagation pass.
///
/// Every field reached during the pass is recorded, including the origin.
/// A field that was already reached does not forward the event again, which
/// breaks route cycles and keeps diamonds from fanning out twice.
#[derive(Debug)]
pub(crate) struct Propagation {
    reached: HashSet<FieldId>,
}

impl Propagation {
    pub(crate) fn from_origin(origin: FieldId) -> Self {
        let mut reached = HashSet::new();
        reached.insert(origin);
        Self { reached }
    }

    /// Record `field`; false if it was already reached in this pass.
    pub(crate) fn reach(&mut self, field: FieldId) -> bool {
        self.reached.insert(field)
    }

    #[cfg(test)]
    pub(crate) fn has_reached(&self, field: FieldId) -> bool {
        self.reached.contains(&field)
    }
}
