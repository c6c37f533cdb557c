//! Access types and the rules that go with them.
//!
//! Rules only apply to fields that have an owner and have access checking
//! switched on. The owner node itself is never restricted, except that an
//! INITIALIZE_ONLY field is frozen for everybody once the node is
//! initialized.

use serde::{Deserialize, Serialize};

use crate::error::AccessViolation;
use crate::graph::NodeId;

/// How a field may be used from outside its node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccessType {
    InitializeOnly,
    OutputOnly,
    InputOnly,
    #[default]
    InputOutput,
}

/// Who is performing an operation on a field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Caller {
    /// Code outside any node (scene setup, tests, scripting).
    #[default]
    External,
    /// Code running on behalf of a node.
    Node(NodeId),
}

impl Caller {
    fn is(&self, node: NodeId) -> bool {
        matches!(self, Caller::Node(id) if *id == node)
    }
}

impl From<NodeId> for Caller {
    fn from(node: NodeId) -> Self {
        Caller::Node(node)
    }
}

/// The access-relevant part of a field, detached from the graph.
#[derive(Debug, Clone, Copy)]
pub(crate) struct AccessPolicy {
    pub(crate) access_type: AccessType,
    pub(crate) check_on: bool,
    pub(crate) owner: Option<NodeId>,
}

impl AccessPolicy {
    /// The owner when rules apply to `caller`, `None` otherwise.
    fn restricted_owner(&self, caller: Caller) -> Option<NodeId> {
        if !self.check_on {
            return None;
        }
        self.owner.filter(|owner| !caller.is(*owner))
    }

    /// Routing out of this field.
    pub(crate) fn check_route_out(&self, caller: Caller) -> Option<AccessViolation> {
        self.restricted_owner(caller)?;
        (self.access_type == AccessType::InputOnly).then_some(AccessViolation::RouteFromInputOnly)
    }

    /// Routing into this field.
    pub(crate) fn check_route_in(&self, caller: Caller) -> Option<AccessViolation> {
        self.restricted_owner(caller)?;
        match self.access_type {
            AccessType::InitializeOnly => Some(AccessViolation::RouteToInitializeOnly),
            AccessType::OutputOnly => Some(AccessViolation::RouteToOutputOnly),
            _ => None,
        }
    }

    /// Reading this field. An INPUT_ONLY field that already routes somewhere
    /// stays readable, since its downstream fields pull from it.
    pub(crate) fn check_get(&self, caller: Caller, routes_out: bool) -> Option<AccessViolation> {
        self.restricted_owner(caller)?;
        (self.access_type == AccessType::InputOnly && !routes_out)
            .then_some(AccessViolation::GetInputOnly)
    }

    /// Writing this field.
    pub(crate) fn check_set(&self, caller: Caller, owner_initialized: bool) -> Option<AccessViolation> {
        if !self.check_on || self.owner.is_none() {
            return None;
        }
        match self.access_type {
            AccessType::InitializeOnly if owner_initialized => {
                Some(AccessViolation::SetInitializeOnly)
            }
            AccessType::OutputOnly if self.restricted_owner(caller).is_some() => {
                Some(AccessViolation::SetOutputOnly)
            }
            _ => None,
        }
    }
}
