//! Display list caching.
//!
//! A display list is a value-less field owned by a renderable node. Every
//! field the node's rendering depends on is routed into it, so any change
//! upstream reaches the display list as an event and breaks its cache.
//! The compiled list is rebuilt lazily from [`FieldGraph::call_list`] once
//! the rebuild delay has run out and the display lists it depends on are
//! ready themselves.
//!
//! ```text
//!   Invalid --call_list--> Building --ok--> Valid
//!      ^                      |               |
//!      +-------failed---------+               |
//!      +-------------event / break------------+
//! ```

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::backend::{ListHandle, RenderBackend};
use crate::error::{FieldError, Result};
use crate::field::{FieldBuilder, FieldId, FieldRef, FieldType, FieldValue, InputSpec, TypeConstraint};
use crate::graph::{FieldGraph, NodeId};

/// Whether a display list caches at all.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheMode {
    On,
    Off,
    /// Follow the scene configuration.
    #[default]
    Options,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheState {
    Invalid,
    Building,
    Valid,
}

#[derive(Debug)]
pub(crate) struct DisplayListState {
    pub(crate) mode: CacheMode,
    pub(crate) state: CacheState,
    /// Present exactly when `state` is `Valid`.
    pub(crate) list: Option<ListHandle>,
    pub(crate) delay_counter: u32,
    pub(crate) breaks_since_build: u32,
    /// `call_list` ran since `is_active` last updated.
    pub(crate) active: bool,
    pub(crate) is_active: FieldRef<bool>,
    pub(crate) rebuilds: u64,
}

impl DisplayListState {
    fn new(is_active: FieldRef<bool>, delay: u32) -> Self {
        Self {
            mode: CacheMode::default(),
            state: CacheState::Invalid,
            list: None,
            delay_counter: delay,
            breaks_since_build: 0,
            active: true,
            is_active,
            rebuilds: 0,
        }
    }
}

impl FieldGraph {
    /// Give `owner` a display list field named `displayList`.
    ///
    /// The field is wired to the graph's `breakCache` field, and its
    /// `isActive` companion is updated from `time` every frame.
    pub fn add_display_list(&mut self, owner: NodeId) -> Result<FieldId> {
        let dl = self.add_field(
            FieldBuilder::void()
                .named("displayList")
                .owned_by(owner)
                .collect_events()
                .passive(),
        )?;

        let is_active = self.add_typed::<bool>(
            FieldBuilder::of(true)
                .named("isActive")
                .inputs(InputSpec::none().slot("time", TypeConstraint::Exact(FieldType::SFTime)))
                .auto_update()
                .update(move |ctx: &mut crate::UpdateContext<'_>| {
                    let active = ctx.graph().take_active(dl)?;
                    ctx.set(active)
                }),
        )?;

        let delay = self.delay_policy().initial_delay();
        self.slot_mut(dl)?.display_list = Some(Box::new(DisplayListState::new(is_active, delay)));
        self.node_slot_mut(owner)?.display_list = Some(dl);

        self.route_no_event(self.time().id(), is_active.id())?;
        self.route_no_event(self.break_cache_field(), dl)?;
        debug!(node = %self.node_name(owner)?, "add display list");
        Ok(dl)
    }

    fn dl_state(&self, dl: FieldId) -> Result<&DisplayListState> {
        let slot = self.slot(dl)?;
        match slot.display_list.as_deref() {
            Some(state) => Ok(state),
            None => Err(FieldError::type_mismatch(
                self.full_name(dl)?,
                "DisplayList",
                slot.field_type,
            )),
        }
    }

    fn dl_state_mut(&mut self, dl: FieldId) -> Result<&mut DisplayListState> {
        self.dl_state(dl)?;
        let slot = self.slot_mut(dl)?;
        slot.display_list
            .as_deref_mut()
            .ok_or(FieldError::UnknownField(dl))
    }

    pub fn cache_state(&self, dl: FieldId) -> Result<CacheState> {
        Ok(self.dl_state(dl)?.state)
    }

    pub fn have_valid_display_list(&self, dl: FieldId) -> Result<bool> {
        Ok(self.dl_state(dl)?.state == CacheState::Valid)
    }

    pub fn cache_mode(&self, dl: FieldId) -> Result<CacheMode> {
        Ok(self.dl_state(dl)?.mode)
    }

    pub fn set_cache_mode(&mut self, dl: FieldId, mode: CacheMode) -> Result<()> {
        self.dl_state_mut(dl)?.mode = mode;
        Ok(())
    }

    /// True if `dl` caches, taking [`CacheMode::Options`] from the config.
    pub fn using_caching(&self, dl: FieldId) -> Result<bool> {
        Ok(match self.dl_state(dl)?.mode {
            CacheMode::On => true,
            CacheMode::Off => false,
            CacheMode::Options => self.config().caching.use_caching,
        })
    }

    /// Successful builds of `dl` so far.
    pub fn rebuild_count(&self, dl: FieldId) -> Result<u64> {
        Ok(self.dl_state(dl)?.rebuilds)
    }

    /// Uncached renders left before `dl` tries to build.
    pub fn cache_delay_remaining(&self, dl: FieldId) -> Result<u32> {
        Ok(self.dl_state(dl)?.delay_counter)
    }

    /// The `isActive` field of `dl`: true if `call_list` ran since the
    /// previous frame.
    pub fn is_active_field(&self, dl: FieldId) -> Result<FieldRef<bool>> {
        Ok(self.dl_state(dl)?.is_active)
    }

    pub fn is_active(&mut self, dl: FieldId) -> Result<bool> {
        let field = self.is_active_field(dl)?;
        self.get(field)
    }

    pub(crate) fn take_active(&mut self, dl: FieldId) -> Result<bool> {
        Ok(std::mem::replace(&mut self.dl_state_mut(dl)?.active, false))
    }

    /// Invalidate the cache of `dl` and restart its rebuild delay. The
    /// compiled list is queued for deletion.
    pub fn break_cache(&mut self, dl: FieldId) -> Result<()> {
        let state = self.dl_state_mut(dl)?;
        state.breaks_since_build = state.breaks_since_build.saturating_add(1);
        let breaks = state.breaks_since_build;
        let delay = self.delay_policy().delay_after_break(breaks);

        let state = self.dl_state_mut(dl)?;
        let old = state.list.take();
        state.state = CacheState::Invalid;
        state.delay_counter = delay;
        if let Some(list) = old {
            debug!(field = %self.display_name(dl), ?list, "cache broken");
            self.queue_list_release(list);
        }
        Ok(())
    }

    /// Break every display list in the graph.
    pub fn rebuild_all_display_lists(&mut self) -> Result<()> {
        self.touch(self.break_cache_field())
    }

    /// Delete lists released since the last call.
    pub fn flush_released(&mut self, backend: &mut dyn RenderBackend) {
        for list in self.take_released_lists() {
            if let Err(e) = backend.delete_list(list) {
                warn!(?list, error = %e, "failed to delete display list");
            }
        }
    }

    /// Render the owner of `dl`, through the cached list when possible.
    ///
    /// With `build_list` false the call never compiles, it only replays an
    /// existing list or renders directly. Backend failures never surface:
    /// they are logged and the node renders uncached.
    pub fn call_list(
        &mut self,
        dl: FieldId,
        backend: &mut dyn RenderBackend,
        build_list: bool,
    ) -> Result<()> {
        self.flush_released(backend);
        self.call_list_called(dl)?;

        if build_list && self.using_caching(dl)? {
            if !self.is_up_to_date(dl)? {
                self.up_to_date(dl)?;
                if self.try_build(dl, backend, true)? {
                    self.replay(dl, backend)?;
                } else {
                    self.render_owner(dl, backend)?;
                }
                return Ok(());
            }
            if !self.have_valid_display_list(dl)? {
                self.try_build(dl, backend, false)?;
            }
        }

        if self.have_valid_display_list(dl)? {
            self.replay(dl, backend)
        } else {
            self.render_owner(dl, backend)?;
            if let Some(collected) = self.slot_mut(dl)?.event_fields.as_mut() {
                collected.clear();
            }
            let state = self.dl_state_mut(dl)?;
            state.delay_counter = state.delay_counter.saturating_sub(1);
            Ok(())
        }
    }

    fn call_list_called(&mut self, dl: FieldId) -> Result<()> {
        let state = self.dl_state_mut(dl)?;
        state.active = true;
        let is_active = state.is_active.id();
        self.store_value(is_active, FieldValue::Bool(true))?;
        self.start_event(is_active)
    }

    /// Compile the owner's rendering into a new list. Returns false if the
    /// delay has not run out, a dependency is not ready, or the backend
    /// failed.
    fn try_build(
        &mut self,
        dl: FieldId,
        backend: &mut dyn RenderBackend,
        cache_broken: bool,
    ) -> Result<bool> {
        if self.dl_state(dl)?.delay_counter > 0 {
            return Ok(false);
        }
        if !self.children_caches_ready(dl, cache_broken)? {
            return Ok(false);
        }
        let Some(owner) = self.owner(dl)? else {
            return Ok(false);
        };

        self.dl_state_mut(dl)?.state = CacheState::Building;
        let list = match backend.gen_list() {
            Ok(list) => list,
            Err(e) => {
                warn!(field = %self.display_name(dl), error = %e, "cannot allocate display list");
                self.dl_state_mut(dl)?.state = CacheState::Invalid;
                return Ok(false);
            }
        };
        if let Err(e) = backend.begin_list(list) {
            warn!(field = %self.display_name(dl), error = %e, "cannot start display list");
            return self.abandon_build(dl, backend, list).map(|_| false);
        }

        if let Err(e) = self.render_node(owner, backend) {
            // Close the list before giving up on it.
            let _ = backend.end_list(list);
            self.abandon_build(dl, backend, list)?;
            return Err(e);
        }
        if let Err(e) = backend.end_list(list) {
            warn!(field = %self.display_name(dl), error = %e, "cannot compile display list");
            return self.abandon_build(dl, backend, list).map(|_| false);
        }

        let state = self.dl_state_mut(dl)?;
        state.list = Some(list);
        state.state = CacheState::Valid;
        state.breaks_since_build = 0;
        state.rebuilds += 1;
        let rebuilds = state.rebuilds;
        debug!(field = %self.display_name(dl), ?list, rebuilds, "display list built");
        Ok(true)
    }

    fn abandon_build(
        &mut self,
        dl: FieldId,
        backend: &mut dyn RenderBackend,
        list: ListHandle,
    ) -> Result<()> {
        if let Err(e) = backend.delete_list(list) {
            warn!(?list, error = %e, "failed to delete display list");
        }
        self.dl_state_mut(dl)?.state = CacheState::Invalid;
        Ok(())
    }

    /// True if every display list `dl` depends on has a valid cache. Only
    /// lists that rendered last frame count unless the cache of `dl` itself
    /// was just broken.
    fn children_caches_ready(&mut self, dl: FieldId, cache_broken: bool) -> Result<bool> {
        let inputs: Vec<FieldId> = self.routes_in(dl)?.to_vec();
        for input in inputs {
            let children = if self.slot(input)?.display_list.is_some() {
                vec![input]
            } else {
                match self.field_type(input)? {
                    FieldType::SFNode | FieldType::MFNode => {
                        self.up_to_date(input)?;
                        self.peek(input)?
                            .nodes()
                            .into_iter()
                            .filter_map(|node| self.display_list_of(node).ok().flatten())
                            .collect()
                    }
                    _ => Vec::new(),
                }
            };
            for child in children {
                if child == dl || self.have_valid_display_list(child)? {
                    continue;
                }
                if cache_broken || self.is_active(child)? {
                    return Ok(false);
                }
            }
        }
        Ok(true)
    }

    fn replay(&mut self, dl: FieldId, backend: &mut dyn RenderBackend) -> Result<()> {
        let Some(list) = self.dl_state(dl)?.list else {
            return Ok(());
        };
        if let Err(e) = backend.call_list(list) {
            warn!(field = %self.display_name(dl), error = %e, "cannot call display list");
            let state = self.dl_state_mut(dl)?;
            state.list = None;
            state.state = CacheState::Invalid;
            self.queue_list_release(list);
        }
        Ok(())
    }

    fn render_owner(&mut self, dl: FieldId, backend: &mut dyn RenderBackend) -> Result<()> {
        match self.owner(dl)? {
            Some(owner) => self.render_node(owner, backend),
            None => Ok(()),
        }
    }

    /// Run the render hook of `node` directly, without any caching.
    pub fn render_node(&mut self, node: NodeId, backend: &mut dyn RenderBackend) -> Result<()> {
        let Some(mut renderer) = self.node_slot_mut(node)?.renderer.take() else {
            return Ok(());
        };
        let result = renderer.render(self, node, backend);
        if let Ok(slot) = self.node_slot_mut(node) {
            slot.renderer = Some(renderer);
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::{FixedDelay, RecordingBackend};

    fn shape(graph: &mut FieldGraph, name: &'static str) -> (NodeId, FieldId) {
        let node = graph.add_node(name, "Shape");
        graph
            .set_renderer(node, move |_: &mut FieldGraph, _: NodeId, backend: &mut dyn RenderBackend| -> Result<()> {
                backend.emit(name);
                Ok(())
            })
            .unwrap();
        let dl = graph.add_display_list(node).unwrap();
        (node, dl)
    }

    #[test]
    fn builds_after_delay_then_replays() {
        let mut graph = FieldGraph::new();
        let (_, dl) = shape(&mut graph, "box");
        let mut backend = RecordingBackend::new();

        for _ in 0..3 {
            graph.call_list(dl, &mut backend, true).unwrap();
            assert!(!graph.have_valid_display_list(dl).unwrap());
        }
        graph.call_list(dl, &mut backend, true).unwrap();
        assert_eq!(graph.cache_state(dl).unwrap(), CacheState::Valid);
        assert_eq!(graph.rebuild_count(dl).unwrap(), 1);

        graph.call_list(dl, &mut backend, true).unwrap();
        assert_eq!(backend.output().len(), 5);
        assert_eq!(backend.stats().immediate_commands, 3);
        assert_eq!(backend.stats().lists_called, 2);
    }

    #[test]
    fn event_breaks_cache_and_releases_list() {
        let mut graph = FieldGraph::new();
        graph.set_delay_policy(FixedDelay(0));
        let (node, dl) = shape(&mut graph, "cone");
        let height = graph
            .add_field(FieldBuilder::of(1.0f32).named("height").owned_by(node))
            .unwrap();
        graph.route(height, dl).unwrap();
        let mut backend = RecordingBackend::new();

        graph.call_list(dl, &mut backend, true).unwrap();
        assert_eq!(graph.rebuild_count(dl).unwrap(), 1);
        assert!(graph.is_up_to_date(dl).unwrap());

        graph.set_value(height, FieldValue::Float(2.0)).unwrap();
        assert_eq!(graph.cache_state(dl).unwrap(), CacheState::Invalid);
        assert!(graph.has_caused_event(dl, height).unwrap());

        graph.call_list(dl, &mut backend, true).unwrap();
        assert_eq!(graph.rebuild_count(dl).unwrap(), 2);
        assert_eq!(backend.stats().lists_deleted, 1);
        assert_eq!(backend.live_lists(), 1);
    }

    #[test]
    fn caching_off_always_renders_directly() {
        let mut graph = FieldGraph::new();
        graph.set_delay_policy(FixedDelay(0));
        let (_, dl) = shape(&mut graph, "sphere");
        graph.set_cache_mode(dl, CacheMode::Off).unwrap();
        let mut backend = RecordingBackend::new();

        for _ in 0..4 {
            graph.call_list(dl, &mut backend, true).unwrap();
        }
        assert_eq!(graph.rebuild_count(dl).unwrap(), 0);
        assert_eq!(backend.stats().immediate_commands, 4);
        assert!(!graph.using_caching(dl).unwrap());
    }

    #[test]
    fn failed_compile_falls_back_to_direct_rendering() {
        let mut graph = FieldGraph::new();
        graph.set_delay_policy(FixedDelay(0));
        let (_, dl) = shape(&mut graph, "torus");
        let mut backend = RecordingBackend::new();
        backend.fail_next_compile();

        graph.call_list(dl, &mut backend, true).unwrap();
        assert!(!graph.have_valid_display_list(dl).unwrap());
        assert_eq!(backend.output(), ["torus"]);
        assert_eq!(backend.live_lists(), 0);

        graph.call_list(dl, &mut backend, true).unwrap();
        assert!(graph.have_valid_display_list(dl).unwrap());
    }

    #[test]
    fn failed_call_invalidates() {
        let mut graph = FieldGraph::new();
        graph.set_delay_policy(FixedDelay(0));
        let (_, dl) = shape(&mut graph, "disk");
        let mut backend = RecordingBackend::new();

        graph.call_list(dl, &mut backend, true).unwrap();
        backend.fail_next_call();
        graph.call_list(dl, &mut backend, true).unwrap();
        assert_eq!(graph.cache_state(dl).unwrap(), CacheState::Invalid);
    }

    #[test]
    fn parent_waits_for_child_cache() {
        let mut graph = FieldGraph::new();
        graph.set_delay_policy(FixedDelay(0));
        let (_, child_dl) = shape(&mut graph, "leaf");
        let (_, group_dl) = shape(&mut graph, "group");
        graph.route(child_dl, group_dl).unwrap();
        let mut backend = RecordingBackend::new();

        // The child was never built.
        graph.call_list(group_dl, &mut backend, true).unwrap();
        assert!(!graph.have_valid_display_list(group_dl).unwrap());

        graph.call_list(child_dl, &mut backend, true).unwrap();
        assert!(graph.have_valid_display_list(child_dl).unwrap());
        graph.call_list(group_dl, &mut backend, true).unwrap();
        assert!(graph.have_valid_display_list(group_dl).unwrap());
    }

    #[test]
    fn rebuild_all_breaks_every_list() {
        let mut graph = FieldGraph::new();
        graph.set_delay_policy(FixedDelay(0));
        let (_, a) = shape(&mut graph, "a");
        let (_, b) = shape(&mut graph, "b");
        let mut backend = RecordingBackend::new();
        graph.call_list(a, &mut backend, true).unwrap();
        graph.call_list(b, &mut backend, true).unwrap();

        graph.rebuild_all_display_lists().unwrap();
        assert!(!graph.have_valid_display_list(a).unwrap());
        assert!(!graph.have_valid_display_list(b).unwrap());

        graph.flush_released(&mut backend);
        assert_eq!(backend.live_lists(), 0);
    }

    #[test]
    fn is_active_resets_each_frame() {
        let mut graph = FieldGraph::new();
        let (_, dl) = shape(&mut graph, "line");
        let mut backend = RecordingBackend::new();
        let time = graph.time();

        graph.set(time, crate::TimeStamp(1.0)).unwrap();
        graph.call_list(dl, &mut backend, true).unwrap();
        assert!(graph.is_active(dl).unwrap());

        graph.set(time, crate::TimeStamp(2.0)).unwrap();
        assert!(graph.is_active(dl).unwrap());
        graph.set(time, crate::TimeStamp(3.0)).unwrap();
        assert!(!graph.is_active(dl).unwrap());
    }
}
