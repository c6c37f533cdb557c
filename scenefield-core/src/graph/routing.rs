//! Route management.
//!
//! Routes are a multiset: routing A to B twice installs two edges, each of
//! which occupies its own input slot of B and needs its own `unroute`.

use tracing::debug;

use super::FieldGraph;
use crate::error::{FieldError, Result};
use crate::field::{Caller, FieldId, FieldSlot};

impl FieldGraph {
    /// Route `from` into `to` and send an event along the new edge.
    pub fn route(&mut self, from: FieldId, to: FieldId) -> Result<()> {
        self.route_as(from, to, Caller::External)
    }

    /// [`FieldGraph::route`] performed on behalf of `caller`.
    pub fn route_as(&mut self, from: FieldId, to: FieldId, caller: Caller) -> Result<()> {
        self.check_route(from, to, caller, self.slot(to)?.routes_in.len())?;
        self.link(from, to)?;
        self.fire_from(from, to)
    }

    /// Route `from` into `to` without an event. A target that copies its
    /// value from events takes the current value of `from` silently.
    pub fn route_no_event(&mut self, from: FieldId, to: FieldId) -> Result<()> {
        self.route_no_event_as(from, to, Caller::External)
    }

    pub fn route_no_event_as(&mut self, from: FieldId, to: FieldId, caller: Caller) -> Result<()> {
        self.check_route(from, to, caller, self.slot(to)?.routes_in.len())?;
        self.link(from, to)?;
        self.seed(from, to)
    }

    /// Remove one route from `from` to `to`. Returns false if there was none.
    ///
    /// If `to` has a pending event that came from `from` and no other route
    /// from `from` into `to` remains, the event is cancelled.
    pub fn unroute(&mut self, from: FieldId, to: FieldId) -> bool {
        let removed_out = self
            .fields
            .get_mut(&from)
            .is_some_and(|slot| remove_first(&mut slot.routes_out, to));
        let removed_in = match self.fields.get_mut(&to) {
            Some(slot) => {
                let removed = remove_first(&mut slot.routes_in, from);
                cancel_event_from(slot, from);
                removed
            }
            None => false,
        };
        if removed_out || removed_in {
            debug!(
                from = %self.display_name(from),
                to = %self.display_name(to),
                "unroute"
            );
        }
        removed_out || removed_in
    }

    /// Remove every outbound route of `from`.
    pub fn unroute_all(&mut self, from: FieldId) -> Result<()> {
        let targets: Vec<FieldId> = self.slot(from)?.routes_out.iter().copied().collect();
        for to in targets {
            self.unroute(from, to);
        }
        Ok(())
    }

    /// Put `from` into inbound slot `index` of `to`, replacing whatever
    /// was there, and send an event. Returns the replaced source.
    pub fn replace_route(&mut self, from: FieldId, to: FieldId, index: usize) -> Result<FieldId> {
        self.replace_route_as(from, to, index, Caller::External)
    }

    pub fn replace_route_as(
        &mut self,
        from: FieldId,
        to: FieldId,
        index: usize,
        caller: Caller,
    ) -> Result<FieldId> {
        let old = self.swap_in(from, to, index, caller)?;
        self.fire_from(from, to)?;
        Ok(old)
    }

    /// [`FieldGraph::replace_route`] without the event.
    pub fn replace_route_no_event(
        &mut self,
        from: FieldId,
        to: FieldId,
        index: usize,
    ) -> Result<FieldId> {
        let old = self.swap_in(from, to, index, Caller::External)?;
        self.seed(from, to)?;
        Ok(old)
    }

    fn check_route(&self, from: FieldId, to: FieldId, caller: Caller, index: usize) -> Result<()> {
        let source = self.slot(from)?;
        let target = self.slot(to)?;
        if let Some(reason) = source.policy().check_route_out(caller) {
            return Err(FieldError::Access {
                field: self.full_name(from)?,
                reason,
            });
        }
        if let Some(reason) = target.policy().check_route_in(caller) {
            return Err(FieldError::Access {
                field: self.full_name(to)?,
                reason,
            });
        }
        if let Err(expected) = target.inputs.check(index, source.field_type) {
            return Err(FieldError::type_mismatch(
                self.full_name(to)?,
                expected,
                source.field_type,
            ));
        }
        Ok(())
    }

    fn link(&mut self, from: FieldId, to: FieldId) -> Result<()> {
        self.slot_mut(from)?.routes_out.push(to);
        self.slot_mut(to)?.routes_in.push(from);
        debug!(from = %self.display_name(from), to = %self.display_name(to), "route");
        Ok(())
    }

    fn swap_in(&mut self, from: FieldId, to: FieldId, index: usize, caller: Caller) -> Result<FieldId> {
        let len = self.slot(to)?.routes_in.len();
        if index >= len {
            return Err(FieldError::RouteIndex {
                field: self.full_name(to)?,
                index,
                len,
            });
        }
        self.check_route(from, to, caller, index)?;

        let target = self.slot_mut(to)?;
        let old = std::mem::replace(&mut target.routes_in[index], from);
        cancel_event_from(target, old);
        if let Some(slot) = self.fields.get_mut(&old) {
            remove_first(&mut slot.routes_out, to);
        }
        self.slot_mut(from)?.routes_out.push(to);
        debug!(
            from = %self.display_name(from),
            to = %self.display_name(to),
            index,
            "replace route"
        );
        Ok(old)
    }

    /// Copy the current value of `from` into `to` when `to` would copy it
    /// on an event anyway. No event is started.
    fn seed(&mut self, from: FieldId, to: FieldId) -> Result<()> {
        let target = self.slot(to)?;
        if !target.update.is_copy() || target.field_type != self.slot(from)?.field_type {
            return Ok(());
        }
        let value = self.peek(from)?.clone();
        self.store_value(to, value)
    }
}

fn remove_first(list: &mut crate::field::RouteList, id: FieldId) -> bool {
    match list.iter().position(|f| *f == id) {
        Some(pos) => {
            list.remove(pos);
            true
        }
        None => false,
    }
}

/// Drop a pending event from `source` once `source` no longer routes into
/// the field at all.
fn cancel_event_from(slot: &mut FieldSlot, source: FieldId) {
    if slot.event.source == Some(source) && !slot.routes_in.contains(&source) {
        slot.event.source = None;
    }
}

#[cfg(test)]
mod tests {
    use crate::field::{AccessType, FieldBuilder, FieldValue};
    use crate::FieldGraph;

    #[test]
    fn route_records_both_directions() {
        let mut graph = FieldGraph::new();
        let a = graph.add_field(FieldBuilder::of(1i32)).unwrap();
        let b = graph.add_field(FieldBuilder::of(0i32)).unwrap();

        graph.route(a, b).unwrap();
        assert!(graph.routes_to(a, b));
        assert!(graph.has_route_from(b, a));
        assert!(!graph.is_up_to_date(b).unwrap());

        assert!(graph.unroute(a, b));
        assert!(!graph.routes_to(a, b));
        assert!(!graph.has_route_from(b, a));
        assert!(graph.is_up_to_date(b).unwrap());
        assert!(!graph.unroute(a, b));
    }

    #[test]
    fn duplicate_routes_accumulate() {
        let mut graph = FieldGraph::new();
        let a = graph.add_field(FieldBuilder::of(1i32)).unwrap();
        let b = graph.add_field(FieldBuilder::of(0i32)).unwrap();

        graph.route(a, b).unwrap();
        graph.route(a, b).unwrap();
        assert_eq!(graph.routes_in(b).unwrap(), &[a, a]);

        graph.unroute(a, b);
        assert_eq!(graph.routes_in(b).unwrap(), &[a]);
        assert_eq!(graph.routes_out(a).unwrap(), &[b]);
    }

    #[test]
    fn unrouting_one_duplicate_keeps_pending_event() {
        let mut graph = FieldGraph::new();
        let a = graph.add_field(FieldBuilder::of(1i32)).unwrap();
        let b = graph.add_field(FieldBuilder::of(0i32)).unwrap();
        graph.route(a, b).unwrap();
        graph.route(a, b).unwrap();
        graph.get_value(b).unwrap();

        graph.set_value(a, FieldValue::Int32(5)).unwrap();
        assert!(graph.unroute(a, b));
        assert!(!graph.is_up_to_date(b).unwrap());
        assert_eq!(graph.get_value(b).unwrap(), FieldValue::Int32(5));

        graph.set_value(a, FieldValue::Int32(6)).unwrap();
        assert!(graph.unroute(a, b));
        assert!(graph.is_up_to_date(b).unwrap());
        assert_eq!(graph.get_value(b).unwrap(), FieldValue::Int32(5));
    }

    #[test]
    fn replacing_one_duplicate_keeps_pending_event() {
        let mut graph = FieldGraph::new();
        let a = graph.add_field(FieldBuilder::of(1i32)).unwrap();
        let c = graph.add_field(FieldBuilder::of(9i32)).unwrap();
        let b = graph.add_field(FieldBuilder::of(0i32).passive()).unwrap();
        graph.route(a, b).unwrap();
        graph.route(a, b).unwrap();
        graph.up_to_date(b).unwrap();

        graph.set_value(a, FieldValue::Int32(5)).unwrap();
        assert_eq!(graph.replace_route_no_event(c, b, 0).unwrap(), a);
        assert_eq!(graph.routes_in(b).unwrap(), &[c, a]);
        assert!(!graph.is_up_to_date(b).unwrap());
    }

    #[test]
    fn mismatched_types_are_rejected_at_install() {
        let mut graph = FieldGraph::new();
        let a = graph.add_field(FieldBuilder::of(1i32)).unwrap();
        let b = graph.add_field(FieldBuilder::of(String::new())).unwrap();

        let err = graph.route(a, b).unwrap_err();
        assert!(err.to_string().contains("SFInt32"));
        assert!(graph.routes_out(a).unwrap().is_empty());
        assert!(graph.routes_in(b).unwrap().is_empty());
    }

    #[test]
    fn routing_into_output_only_needs_owner() {
        let mut graph = FieldGraph::new();
        let node = graph.add_node("Sensor", "TimeSensor");
        let out = graph
            .add_field(
                FieldBuilder::of(0.0f32)
                    .named("fraction_changed")
                    .owned_by(node)
                    .access(AccessType::OutputOnly),
            )
            .unwrap();
        let src = graph.add_field(FieldBuilder::of(1.0f32)).unwrap();

        let err = graph.route(src, out).unwrap_err();
        assert!(err.is_access_error());
        graph.route_as(src, out, node.into()).unwrap();
    }

    #[test]
    fn route_no_event_seeds_value_silently() {
        let mut graph = FieldGraph::new();
        let a = graph.add_field(FieldBuilder::of(7i32)).unwrap();
        let b = graph.add_field(FieldBuilder::of(0i32)).unwrap();

        graph.route_no_event(a, b).unwrap();
        assert!(graph.is_up_to_date(b).unwrap());
        assert_eq!(graph.peek(b).unwrap(), &FieldValue::Int32(7));
    }

    #[test]
    fn replace_route_keeps_position() {
        let mut graph = FieldGraph::new();
        let p = graph.add_field(FieldBuilder::of(1i32)).unwrap();
        let q = graph.add_field(FieldBuilder::of(2i32)).unwrap();
        let r = graph.add_field(FieldBuilder::of(3i32)).unwrap();
        let sum = graph.add_field(FieldBuilder::of(0i32).passive()).unwrap();

        graph.route(p, sum).unwrap();
        graph.route(q, sum).unwrap();
        let old = graph.replace_route(r, sum, 0).unwrap();

        assert_eq!(old, p);
        assert_eq!(graph.routes_in(sum).unwrap(), &[r, q]);
        assert!(graph.routes_out(p).unwrap().is_empty());
        assert!(graph.replace_route(p, sum, 5).is_err());
    }
}
