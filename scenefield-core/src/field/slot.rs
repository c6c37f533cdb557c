//! Per-field storage and the builder that configures it.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use smallvec::SmallVec;

use super::access::AccessPolicy;
use super::{AccessType, Event, FieldData, FieldId, FieldType, FieldValue, InputSpec};
use crate::error::Result;
use crate::graph::{NodeId, UpdateContext};
use crate::render::DisplayListState;
use crate::rt::RtMirror;
use crate::scene::PeriodicUpdate;

pub(crate) type RouteList = SmallVec<[FieldId; 4]>;

/// Recomputation hook of a field.
///
/// Called from `up_to_date` when the field has a pending event. The hook
/// reads its inputs through the context and writes the field's new value
/// with [`UpdateContext::set`]. Errors propagate unchanged to whoever
/// pulled the field.
pub trait FieldUpdate: 'static {
    fn update(&mut self, ctx: &mut UpdateContext<'_>) -> Result<()>;
}

impl<F> FieldUpdate for F
where
    F: FnMut(&mut UpdateContext<'_>) -> Result<()> + 'static,
{
    fn update(&mut self, ctx: &mut UpdateContext<'_>) -> Result<()> {
        self(ctx)
    }
}

pub(crate) enum UpdateKind {
    /// Nothing to recompute; pulling just clears the event.
    None,
    /// Take the value of the field the event came from.
    CopyFromEvent,
    Custom(Box<dyn FieldUpdate>),
    /// Pull every input, honouring periodic inputs.
    EventSink,
    /// Start an event from the given field.
    Touch(FieldId),
}

impl UpdateKind {
    pub(crate) fn is_copy(&self) -> bool {
        matches!(self, UpdateKind::CopyFromEvent)
    }
}

impl fmt::Debug for UpdateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            UpdateKind::None => "None",
            UpdateKind::CopyFromEvent => "CopyFromEvent",
            UpdateKind::Custom(_) => "Custom",
            UpdateKind::EventSink => "EventSink",
            UpdateKind::Touch(_) => "Touch",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ObserverKind {
    /// Only when the value differs from the previous one.
    ValueChange,
    /// On every set or update.
    NewValue,
}

pub(crate) struct Observer {
    pub(crate) kind: ObserverKind,
    pub(crate) callback: Box<dyn FnMut(&FieldValue)>,
}

pub(crate) struct FieldSlot {
    pub(crate) name: String,
    pub(crate) field_type: FieldType,
    pub(crate) value: FieldValue,
    pub(crate) access_type: AccessType,
    pub(crate) access_check_on: bool,
    pub(crate) owner: Option<NodeId>,
    pub(crate) update_lock: bool,
    pub(crate) is_program_setting: bool,
    pub(crate) routes_out: RouteList,
    pub(crate) routes_in: RouteList,
    pub(crate) event: Event,
    pub(crate) inputs: InputSpec,
    pub(crate) update: UpdateKind,
    pub(crate) auto_update: bool,
    pub(crate) event_fields: Option<HashSet<FieldId>>,
    pub(crate) observer: Option<Observer>,
    pub(crate) periodic: Option<PeriodicUpdate>,
    pub(crate) rt: Option<Arc<dyn RtMirror>>,
    pub(crate) display_list: Option<Box<DisplayListState>>,
    pub(crate) dependent: Option<DependentNodes>,
}

/// Routes kept for a field built with [`FieldBuilder::depends_on`].
///
/// The referenced nodes' fields route into `relay`, an auto-updating field
/// that touches the dependent field whenever one of them sends an event.
#[derive(Debug, Clone)]
pub(crate) struct DependentNodes {
    pub(crate) fields: Vec<String>,
    pub(crate) relay: FieldId,
}

impl FieldSlot {
    pub(crate) fn policy(&self) -> AccessPolicy {
        AccessPolicy {
            access_type: self.access_type,
            check_on: self.access_check_on,
            owner: self.owner,
        }
    }

    pub(crate) fn is_up_to_date(&self) -> bool {
        self.event.source.is_none()
    }

    pub(crate) fn mirror_realtime(&self) {
        if let Some(rt) = &self.rt {
            rt.store(&self.value);
        }
    }
}

/// Configuration for a new field.
///
/// ```rust,ignore
/// let speed = graph.add_typed::<f32>(
///     FieldBuilder::of(1.0f32)
///         .named("speed")
///         .owned_by(node)
///         .access(AccessType::InputOutput),
/// )?;
/// ```
pub struct FieldBuilder {
    pub(crate) name: String,
    pub(crate) value: FieldValue,
    pub(crate) access_type: AccessType,
    pub(crate) access_check: Option<bool>,
    pub(crate) owner: Option<NodeId>,
    pub(crate) inputs: Option<InputSpec>,
    pub(crate) update: Option<UpdateKind>,
    pub(crate) auto_update: bool,
    pub(crate) collect_events: bool,
    pub(crate) observer: Option<Observer>,
    pub(crate) periodic: Option<PeriodicUpdate>,
    pub(crate) dependent_fields: Vec<String>,
}

impl FieldBuilder {
    /// A field of `field_type` holding that type's zero value.
    pub fn new(field_type: FieldType) -> Self {
        Self::with_value(field_type.default_value())
    }

    pub fn with_value(value: FieldValue) -> Self {
        Self {
            name: String::new(),
            value,
            access_type: AccessType::InputOutput,
            access_check: None,
            owner: None,
            inputs: None,
            update: None,
            auto_update: false,
            collect_events: false,
            observer: None,
            periodic: None,
            dependent_fields: Vec::new(),
        }
    }

    pub fn of<T: FieldData>(initial: T) -> Self {
        Self::with_value(initial.into_value())
    }

    /// A value-less field, used to fan events in or out.
    pub fn void() -> Self {
        Self::with_value(FieldValue::Void)
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn access(mut self, access_type: AccessType) -> Self {
        self.access_type = access_type;
        self
    }

    /// Override the graph-wide default for access checking.
    pub fn access_check(mut self, on: bool) -> Self {
        self.access_check = Some(on);
        self
    }

    pub fn owned_by(mut self, node: NodeId) -> Self {
        self.owner = Some(node);
        self
    }

    pub fn inputs(mut self, inputs: InputSpec) -> Self {
        self.inputs = Some(inputs);
        self
    }

    pub fn update<U: FieldUpdate>(mut self, update: U) -> Self {
        self.update = Some(UpdateKind::Custom(Box::new(update)));
        self
    }

    /// Never recompute; events only mark the field.
    pub fn passive(mut self) -> Self {
        self.update = Some(UpdateKind::None);
        self
    }

    pub(crate) fn touches(mut self, target: FieldId) -> Self {
        self.update = Some(UpdateKind::Touch(target));
        self
    }

    pub(crate) fn event_sink(mut self) -> Self {
        self.update = Some(UpdateKind::EventSink);
        self
    }

    /// Bring the field up to date as soon as an event reaches it.
    pub fn auto_update(mut self) -> Self {
        self.auto_update = true;
        self
    }

    /// Remember which inputs caused events since the last update.
    pub fn collect_events(mut self) -> Self {
        self.collect_events = true;
        self
    }

    /// Call `f` after a set or update that changed the value.
    pub fn on_value_change(mut self, f: impl FnMut(&FieldValue) + 'static) -> Self {
        self.observer = Some(Observer {
            kind: ObserverKind::ValueChange,
            callback: Box::new(f),
        });
        self
    }

    /// Call `f` after every set or update.
    pub fn on_new_value(mut self, f: impl FnMut(&FieldValue) + 'static) -> Self {
        self.observer = Some(Observer {
            kind: ObserverKind::NewValue,
            callback: Box::new(f),
        });
        self
    }

    /// Only let the event sink pull this field once per period.
    pub fn periodic(mut self, periodic: PeriodicUpdate) -> Self {
        self.periodic = Some(periodic);
        self
    }

    /// For SFNode and MFNode fields: route the named fields of every node
    /// the value refers to into this field, so a change inside a referenced
    /// node sends an event from this field. Typically `["displayList"]`.
    ///
    /// Nodes without a field of that name are skipped.
    pub fn depends_on(mut self, fields: &[&str]) -> Self {
        self.dependent_fields = fields.iter().map(|f| f.to_string()).collect();
        self
    }

    pub fn field_type(&self) -> FieldType {
        self.value.field_type()
    }

    pub(crate) fn build(self, default_access_check: bool) -> FieldSlot {
        let field_type = self.value.field_type();
        let update = self.update.unwrap_or(match field_type {
            FieldType::Void => UpdateKind::None,
            _ => UpdateKind::CopyFromEvent,
        });
        let inputs = self.inputs.unwrap_or_else(|| {
            if update.is_copy() {
                InputSpec::any_number(field_type)
            } else {
                InputSpec::unconstrained()
            }
        });

        FieldSlot {
            name: self.name,
            field_type,
            value: self.value,
            access_type: self.access_type,
            access_check_on: self.access_check.unwrap_or(default_access_check),
            owner: self.owner,
            update_lock: false,
            is_program_setting: false,
            routes_out: RouteList::new(),
            routes_in: RouteList::new(),
            event: Event::default(),
            inputs,
            update,
            auto_update: self.auto_update,
            event_fields: self.collect_events.then(HashSet::new),
            observer: self.observer,
            periodic: self.periodic,
            rt: None,
            display_list: None,
            dependent: None,
        }
    }
}

impl fmt::Debug for FieldBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldBuilder")
            .field("name", &self.name)
            .field("type", &self.field_type())
            .field("access_type", &self.access_type)
            .field("owner", &self.owner)
            .finish()
    }
}
