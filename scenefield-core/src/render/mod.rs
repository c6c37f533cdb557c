//! Cached rendering.
//!
//! Display lists cache the drawing commands of a node in a backend-owned
//! list and use the field graph to find out when the cache is stale.

mod backend;
mod delay;
mod display_list;

pub use backend::{
    BackendError, BackendResult, BackendStats, ListHandle, NodeRenderer, RecordingBackend,
    RenderBackend,
};
pub use delay::{AdaptiveDelay, CacheDelayPolicy, FixedDelay};
pub use display_list::{CacheMode, CacheState};

pub(crate) use display_list::DisplayListState;
