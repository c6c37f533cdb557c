//! The view of the graph an update hook works with.

use super::FieldGraph;
use crate::error::{FieldError, Result};
use crate::field::{Caller, Event, FieldData, FieldId, FieldValue};

/// Handed to [`crate::FieldUpdate::update`].
///
/// Inputs are addressed by position in the field's inbound routes, or by
/// the role names of its [`crate::InputSpec`]. Reading an input pulls it,
/// and reads happen on behalf of the field's owner node.
pub struct UpdateContext<'g> {
    graph: &'g mut FieldGraph,
    field: FieldId,
    event: Event,
}

impl<'g> UpdateContext<'g> {
    pub(crate) fn new(graph: &'g mut FieldGraph, field: FieldId, event: Event) -> Self {
        Self {
            graph,
            field,
            event,
        }
    }

    /// The field being updated.
    pub fn field(&self) -> FieldId {
        self.field
    }

    /// The field whose event triggered this update.
    pub fn event_source(&self) -> Option<FieldId> {
        self.event.source
    }

    pub fn event(&self) -> Event {
        self.event
    }

    pub fn input_count(&self) -> usize {
        self.graph
            .slot(self.field)
            .map(|slot| slot.routes_in.len())
            .unwrap_or(0)
    }

    /// Id of the field routed into position `index`.
    pub fn input_id(&self, index: usize) -> Result<FieldId> {
        let slot = self.graph.slot(self.field)?;
        slot.routes_in
            .get(index)
            .copied()
            .ok_or_else(|| FieldError::RouteIndex {
                field: self.graph.display_name(self.field),
                index,
                len: slot.routes_in.len(),
            })
    }

    /// Pull and read the input at `index`.
    pub fn input_value(&mut self, index: usize) -> Result<FieldValue> {
        let input = self.input_id(index)?;
        let caller = self.caller();
        self.graph.get_value_as(input, caller)
    }

    pub fn input<T: FieldData>(&mut self, index: usize) -> Result<T> {
        let value = self.input_value(index)?;
        T::from_value(&value).ok_or_else(|| {
            FieldError::type_mismatch(
                format!("input {index} of {}", self.graph.display_name(self.field)),
                T::FIELD_TYPE,
                value.field_type(),
            )
        })
    }

    /// Read the input occupying the slot named `role`.
    pub fn input_by_role<T: FieldData>(&mut self, role: &str) -> Result<T> {
        let index = self
            .graph
            .slot(self.field)?
            .inputs
            .index_of(role)
            .ok_or_else(|| FieldError::UnknownInput {
                field: self.graph.display_name(self.field),
                role: role.to_string(),
            })?;
        self.input(index)
    }

    /// Read all inputs from position `start` on, e.g. the repeating tail
    /// of an input declaration.
    pub fn inputs_from<T: FieldData>(&mut self, start: usize) -> Result<Vec<T>> {
        (start..self.input_count()).map(|k| self.input(k)).collect()
    }

    /// True if `input` sent an event since the last update. Only
    /// meaningful for fields that collect events.
    pub fn caused_event(&self, input: FieldId) -> bool {
        self.graph
            .has_caused_event(self.field, input)
            .unwrap_or(false)
    }

    /// The field's current value.
    pub fn value(&self) -> Result<&FieldValue> {
        self.graph.peek(self.field)
    }

    /// Store the new value of the field.
    pub fn set<T: FieldData>(&mut self, value: T) -> Result<()> {
        self.set_value(value.into_value())
    }

    pub fn set_value(&mut self, value: FieldValue) -> Result<()> {
        let expected = self.graph.field_type(self.field)?;
        if value.field_type() != expected {
            return Err(FieldError::type_mismatch(
                self.graph.display_name(self.field),
                expected,
                value.field_type(),
            ));
        }
        self.graph.store_value(self.field, value)
    }

    /// An update error attributed to this field.
    pub fn fail(&self, message: impl Into<String>) -> FieldError {
        FieldError::Update {
            field: self.graph.display_name(self.field),
            message: message.into(),
        }
    }

    /// The whole graph, for hooks that reach beyond their inputs.
    pub fn graph(&mut self) -> &mut FieldGraph {
        &mut *self.graph
    }

    fn caller(&self) -> Caller {
        self.graph
            .owner(self.field)
            .ok()
            .flatten()
            .map_or(Caller::External, Caller::Node)
    }
}
