//! Event propagation and lazy evaluation.
//!
//! Propagation is an eager depth-first push that only records events.
//! Evaluation is a pull: `up_to_date` runs a field's update hook if an event
//! is pending, and reading a value pulls first.
//!
//! Both directions walk the graph with an explicit stack, so chain length is
//! bounded by memory, not by the thread's stack.

use std::collections::HashSet;
use std::mem;

use tracing::{debug, trace};

use super::{FieldGraph, UpdateContext};
use crate::error::{FieldError, Result};
use crate::field::{
    Caller, Event, FieldData, FieldId, FieldRef, FieldValue, ObserverKind, Propagation, RouteList,
    UpdateKind,
};

/// Work item of a propagation pass.
enum Step {
    Arrive(FieldId, Event),
    AutoUpdate(FieldId),
}

impl FieldGraph {
    /// Send an event from `field` to everything it routes to without
    /// changing its value.
    pub fn touch(&mut self, field: FieldId) -> Result<()> {
        trace!(field = %self.display_name(field), "touch");
        self.begin_pass(field, false)
    }

    /// Mark `origin` as the source of a new event and push it downstream.
    /// Any event pending on `origin` itself is dropped.
    pub(crate) fn start_event(&mut self, origin: FieldId) -> Result<()> {
        self.begin_pass(origin, true)
    }

    fn begin_pass(&mut self, origin: FieldId, clear_own: bool) -> Result<()> {
        let stamp = self.next_stamp();
        let slot = self.slot_mut(origin)?;
        slot.event.stamp = stamp;
        if clear_own {
            slot.event.source = None;
        }
        let targets = slot.routes_out.clone();

        let mut pass = Propagation::from_origin(origin);
        let event = Event::new(origin, stamp);
        for to in targets {
            self.propagate_event(to, event, &mut pass)?;
        }
        Ok(())
    }

    /// Send a fresh event from `from` along a single edge into `to`.
    pub(crate) fn fire_from(&mut self, from: FieldId, to: FieldId) -> Result<()> {
        let stamp = self.next_stamp();
        self.slot_mut(from)?.event.stamp = stamp;
        let mut pass = Propagation::from_origin(from);
        self.propagate_event(to, Event::new(from, stamp), &mut pass)
    }

    /// Deliver `event` to `target` and forward it depth first to every field
    /// that has not seen it yet in this pass.
    ///
    /// Arrival hooks run on every delivery, forwarded or not: event
    /// collection, display list cache breaking and auto update. Auto update
    /// runs once everything downstream of the field received the event.
    pub(crate) fn propagate_event(
        &mut self,
        target: FieldId,
        event: Event,
        pass: &mut Propagation,
    ) -> Result<()> {
        let mut stack = vec![Step::Arrive(target, event)];
        while let Some(step) = stack.pop() {
            let (target, event) = match step {
                Step::Arrive(target, event) => (target, event),
                Step::AutoUpdate(id) => {
                    self.up_to_date(id)?;
                    continue;
                }
            };

            let slot = self.slot_mut(target)?;
            if let (Some(collected), Some(source)) = (slot.event_fields.as_mut(), event.source) {
                collected.insert(source);
            }
            let is_display_list = slot.display_list.is_some();
            let auto_update = slot.auto_update;

            let forward = event.stamp > slot.event.stamp && pass.reach(target);
            let targets = if forward {
                slot.event = event;
                slot.routes_out.clone()
            } else {
                RouteList::new()
            };
            trace!(field = %self.display_name(target), forward, "event");

            if is_display_list {
                self.break_cache(target)?;
            }
            if auto_update {
                stack.push(Step::AutoUpdate(target));
            }
            let next = Event::new(target, event.stamp);
            stack.extend(targets.iter().rev().map(|to| Step::Arrive(*to, next)));
        }
        Ok(())
    }

    /// Bring `id` up to date, running its update hook if an event is
    /// pending. Does nothing while the field is already updating.
    ///
    /// Stale inputs are brought up to date first, deepest first, so the
    /// hook only reads current values and the pull never recurses along a
    /// chain. A failed update leaves the event pending so the next pull
    /// retries.
    pub fn up_to_date(&mut self, id: FieldId) -> Result<()> {
        self.transfer_realtime(id)?;

        let slot = self.slot_mut(id)?;
        if slot.is_up_to_date() || slot.update_lock {
            return Ok(());
        }
        slot.update_lock = true;
        if let Err(e) = self.pull_stale_inputs(id) {
            if let Some(slot) = self.fields.get_mut(&id) {
                slot.update_lock = false;
            }
            return Err(e);
        }

        let slot = self.slot_mut(id)?;
        let event = slot.event;
        let mut update = mem::replace(&mut slot.update, UpdateKind::None);
        debug!(field = %self.display_name(id), kind = ?update, "update");

        let outcome = self.run_update(id, event, &mut update);

        if let Some(slot) = self.fields.get_mut(&id) {
            slot.update = update;
            slot.update_lock = false;
            if matches!(outcome, Ok(true)) && slot.event.stamp == event.stamp {
                slot.event.source = None;
                if let Some(collected) = slot.event_fields.as_mut() {
                    collected.clear();
                }
            }
        }
        outcome.map(|_| ())
    }

    /// Update every stale field `root` reads from, in post order over the
    /// inbound routes. Fields that are updating right now are left alone.
    fn pull_stale_inputs(&mut self, root: FieldId) -> Result<()> {
        let mut seen = HashSet::from([root]);
        let mut order = Vec::new();
        let mut stack: Vec<(FieldId, bool)> = self
            .stale_dependencies(root)?
            .into_iter()
            .rev()
            .map(|f| (f, false))
            .collect();

        while let Some((id, expanded)) = stack.pop() {
            if expanded {
                order.push(id);
                continue;
            }
            if !seen.insert(id) {
                continue;
            }
            stack.push((id, true));
            for dep in self.stale_dependencies(id)?.into_iter().rev() {
                if !seen.contains(&dep) {
                    stack.push((dep, false));
                }
            }
        }

        for id in order {
            self.up_to_date(id)?;
        }
        Ok(())
    }

    /// The pending fields the update of `id` will read.
    fn stale_dependencies(&self, id: FieldId) -> Result<Vec<FieldId>> {
        let slot = self.slot(id)?;
        if slot.is_up_to_date() {
            return Ok(Vec::new());
        }
        let candidates: Vec<FieldId> = match &slot.update {
            UpdateKind::CopyFromEvent => slot.event.source.into_iter().collect(),
            UpdateKind::Custom(_) => slot.routes_in.to_vec(),
            UpdateKind::None | UpdateKind::EventSink | UpdateKind::Touch(_) => Vec::new(),
        };
        Ok(candidates
            .into_iter()
            .filter(|f| {
                self.fields
                    .get(f)
                    .is_some_and(|s| !s.is_up_to_date() && !s.update_lock)
            })
            .collect())
    }

    /// Returns false when the field should stay pending after a
    /// successful run.
    fn run_update(&mut self, id: FieldId, event: Event, update: &mut UpdateKind) -> Result<bool> {
        match update {
            UpdateKind::None => Ok(true),
            UpdateKind::CopyFromEvent => {
                self.copy_from_event(id, event)?;
                Ok(true)
            }
            UpdateKind::Custom(hook) => {
                let mut ctx = UpdateContext::new(self, id, event);
                hook.update(&mut ctx)?;
                Ok(true)
            }
            UpdateKind::EventSink => self.pull_sink_inputs(id),
            UpdateKind::Touch(target) => {
                let target = *target;
                if self.contains_field(target) {
                    self.touch(target)?;
                }
                Ok(true)
            }
        }
    }

    fn copy_from_event(&mut self, id: FieldId, event: Event) -> Result<()> {
        let Some(source) = event.source.filter(|s| self.contains_field(*s)) else {
            return Ok(());
        };
        let slot = self.slot(id)?;
        let expected = slot.field_type;
        let caller = slot.owner.map_or(Caller::External, Caller::Node);

        let value = self.get_value_as(source, caller)?;
        if value.field_type() != expected {
            return Err(FieldError::type_mismatch(
                self.full_name(id)?,
                expected,
                value.field_type(),
            ));
        }
        self.store_value(id, value)
    }

    /// Pull every input of the event sink. Periodic inputs are skipped
    /// until their period elapsed; the sink stays pending while a skipped
    /// input still has an event.
    fn pull_sink_inputs(&mut self, sink: FieldId) -> Result<bool> {
        let now = match self.peek(self.time().id())? {
            FieldValue::Time(t) => *t,
            _ => 0.0,
        };
        let inputs: Vec<FieldId> = self.slot(sink)?.routes_in.iter().copied().collect();

        let mut done = true;
        for input in inputs {
            let Some(slot) = self.fields.get_mut(&input) else {
                continue;
            };
            if let Some(periodic) = slot.periodic.as_mut() {
                if !periodic.time_to_update(now) {
                    done &= slot.is_up_to_date();
                    continue;
                }
            }
            self.up_to_date(input)?;
        }
        Ok(done)
    }

    /// Store a new value, mirror it to a realtime snapshot and notify the
    /// observer. No event is started.
    pub(crate) fn store_value(&mut self, id: FieldId, value: FieldValue) -> Result<()> {
        let slot = self.slot_mut(id)?;
        let before = slot.dependent.as_ref().map(|_| slot.value.nodes());
        let changed = slot.value != value;
        slot.value = value;
        slot.mirror_realtime();
        if let Some(observer) = slot.observer.as_mut() {
            if changed || observer.kind == ObserverKind::NewValue {
                (observer.callback)(&slot.value);
            }
        }
        match before {
            Some(before) if changed => self.sync_dependent_nodes(id, &before),
            _ => Ok(()),
        }
    }

    fn transfer_realtime(&mut self, id: FieldId) -> Result<()> {
        let Some(rt) = self.slot(id)?.rt.clone() else {
            return Ok(());
        };
        if let Some(value) = rt.take_changed() {
            trace!(field = %self.display_name(id), "realtime value");
            let slot = self.slot_mut(id)?;
            let before = slot.dependent.as_ref().map(|_| slot.value.nodes());
            slot.value = value;
            if let Some(observer) = slot.observer.as_mut() {
                (observer.callback)(&slot.value);
            }
            if let Some(before) = before {
                self.sync_dependent_nodes(id, &before)?;
            }
            self.start_event(id)?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Values
    // ------------------------------------------------------------------

    /// Pull and read a field as external code.
    pub fn get_value(&mut self, id: FieldId) -> Result<FieldValue> {
        self.get_value_as(id, Caller::External)
    }

    pub fn get_value_as(&mut self, id: FieldId, caller: Caller) -> Result<FieldValue> {
        let slot = self.slot(id)?;
        if let Some(reason) = slot.policy().check_get(caller, !slot.routes_out.is_empty()) {
            return Err(FieldError::Access {
                field: self.full_name(id)?,
                reason,
            });
        }
        self.up_to_date(id)?;
        Ok(self.slot(id)?.value.clone())
    }

    pub fn get<T: FieldData>(&mut self, field: FieldRef<T>) -> Result<T> {
        self.get_as(field, Caller::External)
    }

    pub fn get_as<T: FieldData>(&mut self, field: FieldRef<T>, caller: Caller) -> Result<T> {
        let value = self.get_value_as(field.id(), caller)?;
        T::from_value(&value).ok_or_else(|| {
            FieldError::type_mismatch(self.display_name(field.id()), T::FIELD_TYPE, value.field_type())
        })
    }

    /// Write a field as external code and push an event downstream.
    pub fn set_value(&mut self, id: FieldId, value: FieldValue) -> Result<()> {
        self.set_value_as(id, value, Caller::External)
    }

    pub fn set_value_as(&mut self, id: FieldId, value: FieldValue, caller: Caller) -> Result<()> {
        let slot = self.slot(id)?;
        if value.field_type() != slot.field_type {
            return Err(FieldError::type_mismatch(
                self.full_name(id)?,
                slot.field_type,
                value.field_type(),
            ));
        }
        let initialized = slot
            .owner
            .and_then(|owner| self.nodes.get(&owner))
            .is_some_and(|node| node.initialized);
        if let Some(reason) = slot.policy().check_set(caller, initialized) {
            return Err(FieldError::Access {
                field: self.full_name(id)?,
                reason,
            });
        }

        trace!(field = %self.display_name(id), "set value");
        self.store_value(id, value)?;
        self.start_event(id)
    }

    pub fn set<T: FieldData>(&mut self, field: FieldRef<T>, value: T) -> Result<()> {
        self.set_value_as(field.id(), value.into_value(), Caller::External)
    }

    pub fn set_as<T: FieldData>(&mut self, field: FieldRef<T>, value: T, caller: Caller) -> Result<()> {
        self.set_value_as(field.id(), value.into_value(), caller)
    }
}
