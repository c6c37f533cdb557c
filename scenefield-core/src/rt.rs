//! Realtime Snapshots
//!
//! The field graph is single-threaded. Code running on another thread, such
//! as a haptics loop at 1 kHz, cannot touch it directly. Instead a field can
//! be given a snapshot cell shared between the two sides.
//!
//! # How Snapshots Work
//!
//! 1. Every time the field's value changes on the graph thread (set or
//!    update), the new value is copied into the snapshot.
//!
//! 2. The other thread reads the snapshot at any time with
//!    [`RtSnapshot::get`], without going through lazy evaluation.
//!
//! 3. When the other thread writes with [`RtSnapshot::set`], the cell is
//!    marked changed. The next time the graph pulls the field, the value is
//!    transferred into the field and an event is sent downstream.
//!
//! # Thread Safety
//!
//! The value sits behind a `parking_lot::Mutex`; the changed flag is an
//! atomic so the graph can check it without locking.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::error::{FieldError, Result};
use crate::field::{FieldData, FieldRef, FieldValue};
use crate::graph::FieldGraph;

/// The graph side of a snapshot, stored on the field.
pub(crate) trait RtMirror: Send + Sync {
    /// Copy a value set on the graph thread into the snapshot.
    fn store(&self, value: &FieldValue);

    /// Take a value written by the other thread, if any.
    fn take_changed(&self) -> Option<FieldValue>;
}

struct RtCell<T> {
    value: Mutex<T>,
    changed: AtomicBool,
}

impl<T: FieldData> RtMirror for RtCell<T> {
    fn store(&self, value: &FieldValue) {
        if let Some(value) = T::from_value(value) {
            *self.value.lock() = value;
        }
    }

    fn take_changed(&self) -> Option<FieldValue> {
        if self.changed.swap(false, Ordering::AcqRel) {
            Some(self.value.lock().clone().into_value())
        } else {
            None
        }
    }
}

/// Thread-safe view of one field.
///
/// # Example
///
/// ```rust,ignore
/// let force = graph.make_thread_safe(force_field)?;
/// let rt_force = force.clone();
/// std::thread::spawn(move || loop {
///     let f = rt_force.get();
///     // ...
/// });
/// ```
pub struct RtSnapshot<T> {
    cell: Arc<RtCell<T>>,
}

impl<T: FieldData> RtSnapshot<T> {
    /// The value as last set on either side.
    pub fn get(&self) -> T {
        self.cell.value.lock().clone()
    }

    /// Write from the realtime side. The graph picks the value up on its
    /// next pull of the field.
    pub fn set(&self, value: T) {
        *self.cell.value.lock() = value;
        self.cell.changed.store(true, Ordering::Release);
    }

    /// True if a realtime write has not been picked up yet.
    pub fn is_pending(&self) -> bool {
        self.cell.changed.load(Ordering::Acquire)
    }
}

impl<T> Clone for RtSnapshot<T> {
    fn clone(&self) -> Self {
        Self {
            cell: Arc::clone(&self.cell),
        }
    }
}

impl<T> std::fmt::Debug for RtSnapshot<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RtSnapshot")
            .field("pending", &self.cell.changed.load(Ordering::Relaxed))
            .finish()
    }
}

impl FieldGraph {
    /// Attach a realtime snapshot to `field`, replacing any previous one.
    pub fn make_thread_safe<T: FieldData>(&mut self, field: FieldRef<T>) -> Result<RtSnapshot<T>> {
        let value = self.peek(field.id())?;
        let initial = T::from_value(value).ok_or_else(|| {
            FieldError::type_mismatch(self.display_name(field.id()), T::FIELD_TYPE, value.field_type())
        })?;
        let cell = Arc::new(RtCell {
            value: Mutex::new(initial),
            changed: AtomicBool::new(false),
        });
        self.slot_mut(field.id())?.rt = Some(cell.clone() as Arc<dyn RtMirror>);
        debug!(field = %self.display_name(field.id()), "realtime snapshot attached");
        Ok(RtSnapshot { cell })
    }
}
