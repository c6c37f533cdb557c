//! Error types for the field engine.
//!
//! Everything the graph can refuse to do is a [`FieldError`]. Access
//! violations and type mismatches are programming errors in node wiring and
//! are raised immediately to the caller. Failures of the render backend are
//! not part of this enum; a display list absorbs them and falls back to
//! uncached rendering (see [`crate::render::BackendError`]).

use std::fmt;

use thiserror::Error;

use crate::field::{FieldId, FieldType};
use crate::graph::NodeId;

pub type Result<T> = std::result::Result<T, FieldError>;

/// The access rule that was broken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessViolation {
    /// A non-owner routed out of an INPUT_ONLY field.
    RouteFromInputOnly,
    /// A non-owner routed into an INITIALIZE_ONLY field.
    RouteToInitializeOnly,
    /// A non-owner routed into an OUTPUT_ONLY field.
    RouteToOutputOnly,
    /// A non-owner read an INPUT_ONLY field that routes nowhere.
    GetInputOnly,
    /// An INITIALIZE_ONLY field was set after its node was initialized.
    SetInitializeOnly,
    /// A non-owner set an OUTPUT_ONLY field.
    SetOutputOnly,
}

impl fmt::Display for AccessViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            Self::RouteFromInputOnly => "cannot route from an INPUT_ONLY field",
            Self::RouteToInitializeOnly => "cannot route to an INITIALIZE_ONLY field",
            Self::RouteToOutputOnly => "cannot route to an OUTPUT_ONLY field",
            Self::GetInputOnly => {
                "cannot get the value of an INPUT_ONLY field from outside its node"
            }
            Self::SetInitializeOnly => "cannot set an INITIALIZE_ONLY field after initialization",
            Self::SetOutputOnly => "cannot set an OUTPUT_ONLY field from outside its node",
        };
        f.write_str(msg)
    }
}

#[derive(Debug, Error)]
pub enum FieldError {
    #[error("{reason}: {field}")]
    Access {
        field: String,
        reason: AccessViolation,
    },

    #[error("invalid field type for {field}: expected {expected}, got {found}")]
    InvalidType {
        field: String,
        expected: String,
        found: String,
    },

    #[error("route index {index} out of range for {field} ({len} inbound routes)")]
    RouteIndex {
        field: String,
        index: usize,
        len: usize,
    },

    #[error("{field} declares no input named '{role}'")]
    UnknownInput { field: String, role: String },

    #[error("unknown field {0:?}")]
    UnknownField(FieldId),

    #[error("unknown node {0:?}")]
    UnknownNode(NodeId),

    #[error("node '{node}' has no field named '{name}'")]
    NoSuchNodeField { node: String, name: String },

    #[error("node '{node}' already has a field named '{name}'")]
    DuplicateField { node: String, name: String },

    #[error("unknown node type '{0}'")]
    UnknownNodeType(String),

    #[error("update of {field} failed: {message}")]
    Update { field: String, message: String },

    #[error("invalid configuration: {0}")]
    Config(#[from] serde_json::Error),
}

impl FieldError {
    pub(crate) fn type_mismatch(field: String, expected: impl fmt::Display, found: FieldType) -> Self {
        FieldError::InvalidType {
            field,
            expected: expected.to_string(),
            found: found.to_string(),
        }
    }

    /// True for [`FieldError::Access`].
    pub fn is_access_error(&self) -> bool {
        matches!(self, FieldError::Access { .. })
    }
}
