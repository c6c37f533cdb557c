//! Dependent node fields
//!
//! An SFNode or MFNode field built with [`crate::FieldBuilder::depends_on`]
//! follows the nodes it refers to. The named fields of every referenced node
//! route into a hidden relay field, and the relay touches the dependent
//! field on arrival. A parent whose display list reads `children` is thereby
//! invalidated when the display list of a child breaks.
//!
//! The routes are kept in step with the value: whenever the set of
//! referenced nodes changes, routes from nodes that left are removed and
//! routes from nodes that joined are added.

use indexmap::IndexMap;
use tracing::debug;

use super::{FieldGraph, NodeId};
use crate::error::Result;
use crate::field::{Caller, DependentNodes, FieldBuilder, FieldId};

impl FieldGraph {
    pub(crate) fn attach_dependent_nodes(&mut self, id: FieldId, fields: Vec<String>) -> Result<()> {
        let relay = self.add_field(FieldBuilder::void().auto_update().touches(id))?;
        self.slot_mut(id)?.dependent = Some(DependentNodes { fields, relay });
        self.sync_dependent_nodes(id, &[])
    }

    /// Move the routes of a dependent field from the nodes in `before` to
    /// the nodes it refers to now.
    pub(crate) fn sync_dependent_nodes(&mut self, id: FieldId, before: &[NodeId]) -> Result<()> {
        let slot = self.slot(id)?;
        let Some(dependent) = slot.dependent.clone() else {
            return Ok(());
        };
        let (removed, added) = node_diff(before, &slot.value.nodes());

        for node in removed {
            for name in &dependent.fields {
                if let Ok(field) = self.get_field(node, name) {
                    self.unroute(field, dependent.relay);
                }
            }
        }
        for node in added {
            for name in &dependent.fields {
                match self.get_field(node, name) {
                    Ok(field) => self.route_no_event_as(field, dependent.relay, Caller::Node(node))?,
                    Err(_) => debug!(
                        field = %self.display_name(id),
                        node = %node.raw(),
                        missing = %name,
                        "referenced node has no such field"
                    ),
                }
            }
        }
        Ok(())
    }
}

/// Multiset difference of two node lists: `(left, joined)`.
fn node_diff(before: &[NodeId], after: &[NodeId]) -> (Vec<NodeId>, Vec<NodeId>) {
    let mut counts: IndexMap<NodeId, isize> = IndexMap::new();
    for node in before {
        *counts.entry(*node).or_default() -= 1;
    }
    for node in after {
        *counts.entry(*node).or_default() += 1;
    }

    let mut left = Vec::new();
    let mut joined = Vec::new();
    for (node, count) in counts {
        for _ in 0..count.unsigned_abs() {
            if count < 0 {
                left.push(node);
            } else {
                joined.push(node);
            }
        }
    }
    (left, joined)
}
