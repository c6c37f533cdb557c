//! Field Graph
//!
//! The graph owns every field and node of a scene and implements routing,
//! event propagation and lazy evaluation on top of them.
//!
//! # Overview
//!
//! - Fields and nodes live in two arenas keyed by [`FieldId`] and
//!   [`NodeId`]. Routes, owners and event sources are ids, so removing a
//!   field can never leave a dangling reference behind; removal severs all
//!   routes first.
//! - A route from A to B records B in A's outbound list and A in B's inbound
//!   list. Inbound order is meaningful: the k-th inbound route feeds input
//!   slot k of B.
//! - Writes push events eagerly along outbound routes; values are pulled
//!   lazily (see [`crate::field`]).
//!
//! # Built-in fields
//!
//! Each graph creates three fields of its own, replacing what would
//! otherwise be process-wide singletons:
//!
//! - `time`: SFTime, set once per frame by the scene driver.
//! - `eventSink`: pulled at the end of every frame; fields routed into it
//!   are kept up to date even if nothing else reads them.
//! - `breakCache`: routed into every display list; touching it forces all
//!   caches to rebuild.

mod context;
mod database;
mod dependent;
mod evaluate;
mod node;
mod routing;

pub use context::UpdateContext;
pub use database::{FieldDecl, NodeDatabase, NodeType};
pub use node::NodeId;

pub(crate) use node::NodeSlot;

use indexmap::IndexMap;
use tracing::debug;

use crate::error::{FieldError, Result};
use crate::field::{
    AccessType, Caller, Event, EventStamp, FieldBuilder, FieldData, FieldId, FieldRef, FieldSlot,
    FieldType, FieldValue, TimeStamp,
};
use crate::render::{CacheDelayPolicy, ListHandle};
use crate::scene::SceneConfig;

#[derive(Debug, Clone, Copy)]
struct Builtins {
    time: FieldRef<TimeStamp>,
    event_sink: FieldId,
    break_cache: FieldId,
}

/// Arena of fields and nodes.
pub struct FieldGraph {
    fields: IndexMap<FieldId, FieldSlot>,
    nodes: IndexMap<NodeId, NodeSlot>,
    clock: u64,
    config: SceneConfig,
    delay_policy: Box<dyn CacheDelayPolicy>,
    released_lists: Vec<ListHandle>,
    builtins: Builtins,
}

impl FieldGraph {
    pub fn new() -> Self {
        Self::with_config(SceneConfig::default())
    }

    pub fn with_config(config: SceneConfig) -> Self {
        let delay_policy = config.caching.delay_policy();
        let mut fields = IndexMap::new();

        let time = FieldBuilder::of(TimeStamp::default())
            .named("time")
            .access(AccessType::OutputOnly);
        let event_sink = FieldBuilder::void().named("eventSink").event_sink();
        let break_cache = FieldBuilder::void().named("breakCache").passive();

        let mut insert = |builder: FieldBuilder| {
            let id = FieldId::new();
            fields.insert(id, builder.build(config.access_checks));
            id
        };
        let builtins = Builtins {
            time: FieldRef::new(insert(time)),
            event_sink: insert(event_sink),
            break_cache: insert(break_cache),
        };

        Self {
            fields,
            nodes: IndexMap::new(),
            clock: 0,
            config,
            delay_policy,
            released_lists: Vec::new(),
            builtins,
        }
    }

    pub fn config(&self) -> &SceneConfig {
        &self.config
    }

    /// Replace the configuration. Caching options take effect on the next
    /// display list call; the access-check default only affects new fields.
    pub fn set_config(&mut self, config: SceneConfig) {
        self.delay_policy = config.caching.delay_policy();
        self.config = config;
    }

    /// Replace the policy deciding how long a broken display list waits
    /// before it is rebuilt.
    pub fn set_delay_policy<P: CacheDelayPolicy>(&mut self, policy: P) {
        self.delay_policy = Box::new(policy);
    }

    pub(crate) fn delay_policy(&self) -> &dyn CacheDelayPolicy {
        self.delay_policy.as_ref()
    }

    /// The per-frame time field.
    pub fn time(&self) -> FieldRef<TimeStamp> {
        self.builtins.time
    }

    pub fn event_sink(&self) -> FieldId {
        self.builtins.event_sink
    }

    pub fn break_cache_field(&self) -> FieldId {
        self.builtins.break_cache
    }

    pub(crate) fn next_stamp(&mut self) -> EventStamp {
        self.clock += 1;
        EventStamp(self.clock)
    }

    pub(crate) fn queue_list_release(&mut self, list: ListHandle) {
        self.released_lists.push(list);
    }

    pub(crate) fn take_released_lists(&mut self) -> Vec<ListHandle> {
        std::mem::take(&mut self.released_lists)
    }

    // ------------------------------------------------------------------
    // Field lifetime
    // ------------------------------------------------------------------

    /// Add a field described by `builder`.
    pub fn add_field(&mut self, mut builder: FieldBuilder) -> Result<FieldId> {
        if let Some(owner) = builder.owner {
            self.node_slot(owner)?;
        }
        let dependent_fields = std::mem::take(&mut builder.dependent_fields);
        let found = builder.field_type();
        if !dependent_fields.is_empty()
            && !matches!(found, FieldType::SFNode | FieldType::MFNode)
        {
            return Err(FieldError::type_mismatch(builder.name, "SFNode or MFNode", found));
        }
        let id = FieldId::new();
        let slot = builder.build(self.config.access_checks);
        if let Some(owner) = slot.owner {
            self.adopt_field(owner, id, &slot.name)?;
        }
        debug!(field = %slot.name, field_type = %slot.field_type, "add field");
        let periodic = slot.periodic.is_some();
        let caller = slot.owner.map_or(Caller::External, Caller::Node);
        self.fields.insert(id, slot);
        if periodic {
            self.route_as(id, self.builtins.event_sink, caller)?;
        }
        if !dependent_fields.is_empty() {
            self.attach_dependent_nodes(id, dependent_fields)?;
        }
        Ok(id)
    }

    /// Add a field and return a typed handle to it.
    pub fn add_typed<T: FieldData>(&mut self, builder: FieldBuilder) -> Result<FieldRef<T>> {
        let found = builder.field_type();
        if found != T::FIELD_TYPE {
            return Err(FieldError::type_mismatch(builder.name, T::FIELD_TYPE, found));
        }
        Ok(FieldRef::new(self.add_field(builder)?))
    }

    /// A typed handle to an existing field, checking its type.
    pub fn typed<T: FieldData>(&self, id: FieldId) -> Result<FieldRef<T>> {
        let slot = self.slot(id)?;
        if slot.field_type != T::FIELD_TYPE {
            return Err(FieldError::type_mismatch(
                self.full_name(id)?,
                T::FIELD_TYPE,
                slot.field_type,
            ));
        }
        Ok(FieldRef::new(id))
    }

    /// Remove a field. All routes to and from it are severed first, and a
    /// display list's resource is queued for release.
    pub fn remove_field(&mut self, id: FieldId) -> Result<()> {
        self.unroute_all(id)?;
        let sources: Vec<FieldId> = self.slot(id)?.routes_in.iter().copied().collect();
        for source in sources {
            while self.unroute(source, id) {}
        }

        let slot = self.slot(id)?;
        let nested: Vec<FieldId> = slot
            .display_list
            .as_ref()
            .map(|dl| dl.is_active.id())
            .into_iter()
            .chain(slot.dependent.as_ref().map(|d| d.relay))
            .collect();
        if let Some(slot) = self.fields.shift_remove(&id) {
            debug!(field = %slot.name, "remove field");
            if let Some(owner) = slot.owner {
                self.release_field(owner, id);
            }
            if let Some(list) = slot.display_list.and_then(|dl| dl.list) {
                self.queue_list_release(list);
            }
        }
        for inner in nested {
            if self.contains_field(inner) {
                self.remove_field(inner)?;
            }
        }
        Ok(())
    }

    pub(crate) fn slot(&self, id: FieldId) -> Result<&FieldSlot> {
        self.fields.get(&id).ok_or(FieldError::UnknownField(id))
    }

    pub(crate) fn slot_mut(&mut self, id: FieldId) -> Result<&mut FieldSlot> {
        self.fields.get_mut(&id).ok_or(FieldError::UnknownField(id))
    }

    pub fn contains_field(&self, id: FieldId) -> bool {
        self.fields.contains_key(&id)
    }

    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    // ------------------------------------------------------------------
    // Identification and policy
    // ------------------------------------------------------------------

    pub fn set_name(&mut self, id: FieldId, name: impl Into<String>) -> Result<()> {
        let name = name.into();
        if let Some(owner) = self.slot(id)?.owner {
            self.check_unique_name(owner, id, &name)?;
        }
        let slot = self.slot_mut(id)?;
        slot.name = name.clone();
        if let Some(owner) = slot.owner {
            let node = self.node_slot_mut(owner)?;
            node.by_name.retain(|_, f| *f != id);
            if !name.is_empty() {
                node.by_name.insert(name, id);
            }
        }
        Ok(())
    }

    /// The field's name, or `Unknown <type>` when it has none.
    pub fn name(&self, id: FieldId) -> Result<String> {
        let slot = self.slot(id)?;
        if slot.name.is_empty() {
            Ok(format!("Unknown {}", slot.field_type))
        } else {
            Ok(slot.name.clone())
        }
    }

    /// `Owner.name`, or `Unknown <type> in Owner` for unnamed owned fields.
    pub fn full_name(&self, id: FieldId) -> Result<String> {
        let slot = self.slot(id)?;
        match slot.owner.and_then(|owner| self.nodes.get(&owner)) {
            Some(node) if slot.name.is_empty() => {
                Ok(format!("Unknown {} in {}", slot.field_type, node.name))
            }
            Some(node) => Ok(format!("{}.{}", node.name, slot.name)),
            None => self.name(id),
        }
    }

    pub(crate) fn display_name(&self, id: FieldId) -> String {
        self.full_name(id).unwrap_or_else(|_| format!("{id:?}"))
    }

    pub fn field_type(&self, id: FieldId) -> Result<FieldType> {
        Ok(self.slot(id)?.field_type)
    }

    pub fn owner(&self, id: FieldId) -> Result<Option<NodeId>> {
        Ok(self.slot(id)?.owner)
    }

    pub fn access_type(&self, id: FieldId) -> Result<AccessType> {
        Ok(self.slot(id)?.access_type)
    }

    pub fn set_access_type(&mut self, id: FieldId, access_type: AccessType) -> Result<()> {
        self.slot_mut(id)?.access_type = access_type;
        Ok(())
    }

    pub fn is_access_check_on(&self, id: FieldId) -> Result<bool> {
        Ok(self.slot(id)?.access_check_on)
    }

    pub fn set_access_check(&mut self, id: FieldId, on: bool) -> Result<()> {
        self.slot_mut(id)?.access_check_on = on;
        Ok(())
    }

    /// Flag a field as a program setting, exposed to settings editors.
    pub fn mark_program_setting(&mut self, id: FieldId, used_as_setting: bool) -> Result<()> {
        self.slot_mut(id)?.is_program_setting = used_as_setting;
        Ok(())
    }

    pub fn program_settings(&self) -> Vec<FieldId> {
        self.fields
            .iter()
            .filter(|(_, slot)| slot.is_program_setting)
            .map(|(id, _)| *id)
            .collect()
    }

    // ------------------------------------------------------------------
    // Graph inspection
    // ------------------------------------------------------------------

    pub fn routes_in(&self, id: FieldId) -> Result<&[FieldId]> {
        Ok(&self.slot(id)?.routes_in)
    }

    pub fn routes_out(&self, id: FieldId) -> Result<&[FieldId]> {
        Ok(&self.slot(id)?.routes_out)
    }

    pub fn routes_to(&self, from: FieldId, to: FieldId) -> bool {
        self.fields
            .get(&from)
            .is_some_and(|slot| slot.routes_out.contains(&to))
    }

    pub fn has_route_from(&self, to: FieldId, from: FieldId) -> bool {
        self.fields
            .get(&to)
            .is_some_and(|slot| slot.routes_in.contains(&from))
    }

    pub fn is_up_to_date(&self, id: FieldId) -> Result<bool> {
        Ok(self.slot(id)?.is_up_to_date())
    }

    pub fn latest_event(&self, id: FieldId) -> Result<Event> {
        Ok(self.slot(id)?.event)
    }

    /// True if `source` sent an event to `id` since `id` last updated.
    /// Only fields built with `collect_events` (and display lists) track
    /// this; for others it is always false.
    pub fn has_caused_event(&self, id: FieldId, source: FieldId) -> Result<bool> {
        Ok(self
            .slot(id)?
            .event_fields
            .as_ref()
            .is_some_and(|set| set.contains(&source)))
    }

    /// The stored value without pulling or access checks.
    pub fn peek(&self, id: FieldId) -> Result<&FieldValue> {
        Ok(&self.slot(id)?.value)
    }
}

impl Default for FieldGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for FieldGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FieldGraph")
            .field("field_count", &self.fields.len())
            .field("node_count", &self.nodes.len())
            .field("clock", &self.clock)
            .finish()
    }
}
