//! Scenefield Core
//!
//! This crate provides the field layer of an X3D scene-graph runtime.
//! It implements:
//!
//! - Fields: typed reactive cells with access types and input declarations
//! - Routes and event propagation between fields
//! - Lazy, at-most-once-per-event evaluation
//! - Display-list caching driven by field events
//! - A per-frame scene driver with periodic updates
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `field`: Per-field data, access rules and the value model
//! - `graph`: The field/node arena, routing and evaluation
//! - `render`: Backend abstraction and display-list caching
//! - `scene`: Frame loop, configuration and periodic updates
//! - `rt`: Thread-safe snapshots of single fields
//!
//! # Example
//!
//! ```rust
//! use scenefield_core::{FieldBuilder, FieldGraph, InputSpec, FieldType, UpdateContext};
//!
//! let mut graph = FieldGraph::new();
//! let a = graph.add_typed::<i32>(FieldBuilder::of(2i32)).unwrap();
//! let b = graph.add_typed::<i32>(FieldBuilder::of(3i32)).unwrap();
//! let sum = graph
//!     .add_typed::<i32>(
//!         FieldBuilder::of(0i32)
//!             .inputs(InputSpec::any_number(FieldType::SFInt32))
//!             .update(|ctx: &mut UpdateContext<'_>| {
//!                 let total: i32 = ctx.inputs_from::<i32>(0)?.into_iter().sum();
//!                 ctx.set(total)
//!             }),
//!     )
//!     .unwrap();
//! graph.route(a.id(), sum.id()).unwrap();
//! graph.route(b.id(), sum.id()).unwrap();
//!
//! assert_eq!(graph.get(sum).unwrap(), 5);
//! graph.set(a, 10).unwrap();
//! assert_eq!(graph.get(sum).unwrap(), 13);
//! ```

pub mod error;
pub mod field;
pub mod graph;
pub mod render;
pub mod rt;
pub mod scene;

pub use error::{AccessViolation, FieldError, Result};
pub use field::{
    AccessType, Caller, Event, EventStamp, FieldBuilder, FieldData, FieldId, FieldRef, FieldType,
    FieldUpdate, FieldValue, InputSpec, TimeStamp, TypeConstraint,
};
pub use graph::{FieldDecl, FieldGraph, NodeDatabase, NodeId, NodeType, UpdateContext};
pub use render::{
    AdaptiveDelay, BackendError, CacheDelayPolicy, CacheMode, CacheState, FixedDelay,
    NodeRenderer, RecordingBackend, RenderBackend,
};
pub use rt::RtSnapshot;
pub use scene::{FrameStage, Period, PeriodicUpdate, RenderRoot, Scene, SceneConfig};
