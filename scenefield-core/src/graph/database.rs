//! Node type registry.
//!
//! A [`NodeDatabase`] is constructed by the application and passed where
//! nodes are created. It maps type names (and aliases) to field
//! declarations and instantiates nodes from them.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{FieldGraph, NodeId};
use crate::error::{FieldError, Result};
use crate::field::{AccessType, FieldBuilder, FieldType, FieldValue};

/// One field of a node type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDecl {
    pub name: String,
    #[serde(default)]
    pub access: AccessType,
    pub default: FieldValue,
}

impl FieldDecl {
    pub fn new(name: impl Into<String>, access: AccessType, default: FieldValue) -> Self {
        Self {
            name: name.into(),
            access,
            default,
        }
    }

    pub fn field_type(&self) -> FieldType {
        self.default.field_type()
    }
}

/// Declaration of a node type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeType {
    pub name: String,
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(default)]
    pub fields: Vec<FieldDecl>,
    /// Nodes of this type render through a cached display list.
    #[serde(default)]
    pub display_list: bool,
}

impl NodeType {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            aliases: Vec::new(),
            fields: Vec::new(),
            display_list: false,
        }
    }

    pub fn field(mut self, decl: FieldDecl) -> Self {
        self.fields.push(decl);
        self
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.aliases.push(alias.into());
        self
    }

    pub fn with_display_list(mut self) -> Self {
        self.display_list = true;
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct NodeDatabase {
    types: IndexMap<String, NodeType>,
}

impl NodeDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load node types from a JSON array of [`NodeType`].
    pub fn from_json(json: &str) -> Result<Self> {
        let types: Vec<NodeType> = serde_json::from_str(json)?;
        let mut db = Self::new();
        for node_type in types {
            db.register(node_type);
        }
        Ok(db)
    }

    /// Register a type, replacing one of the same name.
    pub fn register(&mut self, node_type: NodeType) {
        debug!(type_name = %node_type.name, fields = node_type.fields.len(), "register node type");
        self.types.insert(node_type.name.clone(), node_type);
    }

    /// Look a type up by name or alias.
    pub fn get(&self, name: &str) -> Option<&NodeType> {
        self.types.get(name).or_else(|| {
            self.types
                .values()
                .find(|t| t.aliases.iter().any(|a| a == name))
        })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn type_names(&self) -> impl Iterator<Item = &str> {
        self.types.keys().map(String::as_str)
    }

    /// Instantiate a node of `type_name` in `graph`, with one owned field
    /// per declaration holding its default value.
    pub fn create_node(
        &self,
        graph: &mut FieldGraph,
        type_name: &str,
        node_name: impl Into<String>,
    ) -> Result<NodeId> {
        let node_type = self
            .get(type_name)
            .ok_or_else(|| FieldError::UnknownNodeType(type_name.to_string()))?;

        let node = graph.add_node(node_name, node_type.name.clone());
        for decl in &node_type.fields {
            graph.add_field(
                FieldBuilder::with_value(decl.default.clone())
                    .named(decl.name.clone())
                    .access(decl.access)
                    .owned_by(node),
            )?;
        }
        if node_type.display_list {
            graph.add_display_list(node)?;
        }
        Ok(node)
    }
}
