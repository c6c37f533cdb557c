//! Nodes
//!
//! A node owns a set of fields and gives them a name scope. Routes between
//! fields of different nodes are plain references and never transfer
//! ownership; removing a node severs every route touching its fields.

use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::FieldGraph;
use crate::error::{FieldError, Result};
use crate::field::FieldId;
use crate::render::NodeRenderer;

/// Unique identifier for a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(u64);

impl NodeId {
    /// Generate a new unique node ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

pub(crate) struct NodeSlot {
    pub(crate) name: String,
    pub(crate) type_name: String,
    /// Every field this node owns, named or not, in creation order.
    pub(crate) owned: Vec<FieldId>,
    pub(crate) by_name: IndexMap<String, FieldId>,
    pub(crate) initialized: bool,
    pub(crate) renderer: Option<Box<dyn NodeRenderer>>,
    pub(crate) display_list: Option<FieldId>,
}

impl NodeSlot {
    fn new(name: String, type_name: String) -> Self {
        Self {
            name,
            type_name,
            owned: Vec::new(),
            by_name: IndexMap::new(),
            initialized: false,
            renderer: None,
            display_list: None,
        }
    }
}

impl FieldGraph {
    /// Add an empty node. Fields join it through
    /// [`crate::FieldBuilder::owned_by`].
    pub fn add_node(&mut self, name: impl Into<String>, type_name: impl Into<String>) -> NodeId {
        let id = NodeId::new();
        let slot = NodeSlot::new(name.into(), type_name.into());
        debug!(node = %slot.name, type_name = %slot.type_name, "add node");
        self.nodes.insert(id, slot);
        id
    }

    pub(crate) fn node_slot(&self, id: NodeId) -> Result<&NodeSlot> {
        self.nodes.get(&id).ok_or(FieldError::UnknownNode(id))
    }

    pub(crate) fn node_slot_mut(&mut self, id: NodeId) -> Result<&mut NodeSlot> {
        self.nodes.get_mut(&id).ok_or(FieldError::UnknownNode(id))
    }

    pub fn contains_node(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn node_name(&self, id: NodeId) -> Result<&str> {
        Ok(&self.node_slot(id)?.name)
    }

    pub fn node_type(&self, id: NodeId) -> Result<&str> {
        Ok(&self.node_slot(id)?.type_name)
    }

    /// Resolve a field of `node` by name.
    pub fn get_field(&self, node: NodeId, name: &str) -> Result<FieldId> {
        let slot = self.node_slot(node)?;
        slot.by_name
            .get(name)
            .copied()
            .ok_or_else(|| FieldError::NoSuchNodeField {
                node: slot.name.clone(),
                name: name.to_string(),
            })
    }

    /// Named fields of `node` in declaration order.
    pub fn node_fields(&self, node: NodeId) -> Result<Vec<(String, FieldId)>> {
        Ok(self
            .node_slot(node)?
            .by_name
            .iter()
            .map(|(name, id)| (name.clone(), *id))
            .collect())
    }

    /// Mark the node initialized. From now on its INITIALIZE_ONLY fields
    /// refuse new values.
    pub fn initialize_node(&mut self, node: NodeId) -> Result<()> {
        let slot = self.node_slot_mut(node)?;
        slot.initialized = true;
        debug!(node = %slot.name, "node initialized");
        Ok(())
    }

    pub fn is_initialized(&self, node: NodeId) -> Result<bool> {
        Ok(self.node_slot(node)?.initialized)
    }

    /// Install the render hook a display list of this node calls.
    pub fn set_renderer<R: NodeRenderer>(&mut self, node: NodeId, renderer: R) -> Result<()> {
        self.node_slot_mut(node)?.renderer = Some(Box::new(renderer));
        Ok(())
    }

    /// The display list field of `node`, if it has one.
    pub fn display_list_of(&self, node: NodeId) -> Result<Option<FieldId>> {
        Ok(self.node_slot(node)?.display_list)
    }

    /// Remove a node together with all fields it owns.
    pub fn remove_node(&mut self, node: NodeId) -> Result<()> {
        let owned = self.node_slot(node)?.owned.clone();
        for field in owned {
            if self.contains_field(field) {
                self.remove_field(field)?;
            }
        }
        if let Some(slot) = self.nodes.shift_remove(&node) {
            debug!(node = %slot.name, "remove node");
        }
        Ok(())
    }

    /// Fails if another field of `node` already goes by `name`.
    pub(crate) fn check_unique_name(&self, node: NodeId, field: FieldId, name: &str) -> Result<()> {
        let slot = self.node_slot(node)?;
        match slot.by_name.get(name) {
            Some(existing) if *existing != field && !name.is_empty() => {
                Err(FieldError::DuplicateField {
                    node: slot.name.clone(),
                    name: name.to_string(),
                })
            }
            _ => Ok(()),
        }
    }

    pub(crate) fn adopt_field(&mut self, node: NodeId, field: FieldId, name: &str) -> Result<()> {
        self.check_unique_name(node, field, name)?;
        let slot = self.node_slot_mut(node)?;
        slot.owned.push(field);
        if !name.is_empty() {
            slot.by_name.insert(name.to_string(), field);
        }
        Ok(())
    }

    pub(crate) fn release_field(&mut self, node: NodeId, field: FieldId) {
        if let Some(slot) = self.nodes.get_mut(&node) {
            slot.owned.retain(|f| *f != field);
            slot.by_name.retain(|_, f| *f != field);
            if slot.display_list == Some(field) {
                slot.display_list = None;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::{AccessType, FieldBuilder};

    #[test]
    fn node_ids_are_unique() {
        let id1 = NodeId::new();
        let id2 = NodeId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn fields_resolve_by_name() {
        let mut graph = FieldGraph::new();
        let node = graph.add_node("Material", "Material");
        let shininess = graph
            .add_field(
                FieldBuilder::of(0.2f32)
                    .named("shininess")
                    .owned_by(node)
                    .access(AccessType::InputOutput),
            )
            .unwrap();

        assert_eq!(graph.get_field(node, "shininess").unwrap(), shininess);
        assert!(matches!(
            graph.get_field(node, "transparency"),
            Err(FieldError::NoSuchNodeField { .. })
        ));
        assert_eq!(graph.node_fields(node).unwrap().len(), 1);
        assert_eq!(graph.full_name(shininess).unwrap(), "Material.shininess");
    }

    #[test]
    fn field_names_are_unique_per_node() {
        let mut graph = FieldGraph::new();
        let node = graph.add_node("Material", "Material");
        let first = graph
            .add_field(FieldBuilder::of(0.2f32).named("shininess").owned_by(node))
            .unwrap();
        let err = graph
            .add_field(FieldBuilder::of(0.5f32).named("shininess").owned_by(node))
            .unwrap_err();
        assert!(matches!(err, FieldError::DuplicateField { .. }));
        assert_eq!(graph.get_field(node, "shininess").unwrap(), first);
        assert_eq!(graph.node_fields(node).unwrap().len(), 1);

        let second = graph
            .add_field(FieldBuilder::of(0.0f32).named("transparency").owned_by(node))
            .unwrap();
        let err = graph.set_name(second, "shininess").unwrap_err();
        assert!(matches!(err, FieldError::DuplicateField { .. }));
        assert_eq!(graph.get_field(node, "shininess").unwrap(), first);
        assert_eq!(graph.get_field(node, "transparency").unwrap(), second);

        // Renaming a field to its own name is fine.
        graph.set_name(first, "shininess").unwrap();
    }

    #[test]
    fn removing_node_removes_its_fields_and_routes() {
        let mut graph = FieldGraph::new();
        let node = graph.add_node("Group", "Group");
        let inner = graph
            .add_field(FieldBuilder::of(1i32).named("value").owned_by(node))
            .unwrap();
        let outside = graph.add_field(FieldBuilder::of(0i32)).unwrap();
        graph.route(inner, outside).unwrap();

        graph.remove_node(node).unwrap();

        assert!(!graph.contains_node(node));
        assert!(!graph.contains_field(inner));
        assert!(graph.routes_in(outside).unwrap().is_empty());
        assert!(graph.is_up_to_date(outside).unwrap());
    }

    #[test]
    fn initialization_flag() {
        let mut graph = FieldGraph::new();
        let node = graph.add_node("Box", "Box");
        assert!(!graph.is_initialized(node).unwrap());
        graph.initialize_node(node).unwrap();
        assert!(graph.is_initialized(node).unwrap());
    }
}
