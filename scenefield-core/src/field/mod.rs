//! Fields
//!
//! A field is a reactive cell: it holds a value, knows which fields route
//! into it and out of it, and remembers the last event that reached it.
//!
//! # Two phases
//!
//! Writing a field pushes a "you are stale" event depth-first along its
//! outbound routes right away. Nothing is recomputed at that point. A field
//! recomputes only when someone pulls it (`up_to_date`, or a read of its
//! value), and then at most once per pending event. Several upstream writes
//! in the same frame therefore cost one recomputation downstream.
//!
//! The fields themselves live in a [`crate::FieldGraph`]; this module holds
//! the per-field data types, the access rules, the value model and the input
//! declarations used to check routes.

mod access;
mod event;
mod id;
mod input;
mod slot;
mod value;

pub use access::{AccessType, Caller};
pub use event::Event;
pub use id::{EventStamp, FieldId};
pub use input::{InputSlot, InputSpec, TypeConstraint};
pub use slot::{FieldBuilder, FieldUpdate};
pub use value::{FieldData, FieldRef, FieldType, FieldValue, TimeStamp};

pub(crate) use access::AccessPolicy;
pub(crate) use event::Propagation;
pub(crate) use slot::{DependentNodes, FieldSlot, ObserverKind, RouteList, UpdateKind};
