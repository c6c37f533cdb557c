//! Typed, named inputs.
//!
//! A field that computes its value from several routed inputs declares the
//! inputs up front as an [`InputSpec`]. The n-th route installed into the
//! field fills the n-th slot, and the source field's type is checked against
//! that slot when the route is installed, never during update. Update hooks
//! then read inputs by slot index or by role name through an
//! [`crate::UpdateContext`].

use smallvec::SmallVec;

use super::FieldType;

/// Which field types a slot accepts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeConstraint {
    /// Anything can be routed here.
    Any,
    Exact(FieldType),
    /// One of several types.
    OneOf(SmallVec<[FieldType; 4]>),
}

impl TypeConstraint {
    pub fn one_of(types: &[FieldType]) -> Self {
        TypeConstraint::OneOf(types.iter().copied().collect())
    }

    pub fn accepts(&self, ty: FieldType) -> bool {
        match self {
            TypeConstraint::Any => true,
            TypeConstraint::Exact(t) => *t == ty,
            TypeConstraint::OneOf(ts) => ts.contains(&ty),
        }
    }

    /// Human-readable form for error messages.
    pub fn describe(&self) -> String {
        match self {
            TypeConstraint::Any => "any field".to_string(),
            TypeConstraint::Exact(t) => t.to_string(),
            TypeConstraint::OneOf(ts) => ts
                .iter()
                .map(FieldType::name)
                .collect::<Vec<_>>()
                .join(" or "),
        }
    }
}

/// One declared input position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputSlot {
    pub role: &'static str,
    pub accepts: TypeConstraint,
}

/// Ordered input declaration of a field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputSpec {
    slots: Vec<InputSlot>,
    /// Accepts any number of further inputs after `slots`.
    rest: Option<InputSlot>,
}

impl InputSpec {
    /// A field that takes no inputs at all.
    pub fn none() -> Self {
        Self {
            slots: Vec::new(),
            rest: None,
        }
    }

    /// Any number of inputs of any type.
    pub fn unconstrained() -> Self {
        Self::none().then_any_number("input", TypeConstraint::Any)
    }

    /// Any number of inputs of exactly `ty`.
    pub fn any_number(ty: FieldType) -> Self {
        Self::none().then_any_number("input", TypeConstraint::Exact(ty))
    }

    /// Append a named slot.
    pub fn slot(mut self, role: &'static str, accepts: TypeConstraint) -> Self {
        self.slots.push(InputSlot { role, accepts });
        self
    }

    /// Accept any number of inputs after the declared slots.
    pub fn then_any_number(mut self, role: &'static str, accepts: TypeConstraint) -> Self {
        self.rest = Some(InputSlot { role, accepts });
        self
    }

    /// The slot that the input at `index` occupies, if any.
    pub fn slot_at(&self, index: usize) -> Option<&InputSlot> {
        self.slots.get(index).or(self.rest.as_ref())
    }

    /// Index of the slot named `role`. For the repeating tail this is the
    /// first position of the tail.
    pub fn index_of(&self, role: &str) -> Option<usize> {
        self.slots
            .iter()
            .position(|s| s.role == role)
            .or_else(|| {
                self.rest
                    .as_ref()
                    .filter(|r| r.role == role)
                    .map(|_| self.slots.len())
            })
    }

    pub fn fixed_len(&self) -> usize {
        self.slots.len()
    }

    /// Check that a field of type `ty` may occupy position `index`.
    /// On failure returns a description of what was expected.
    pub fn check(&self, index: usize, ty: FieldType) -> Result<(), String> {
        match self.slot_at(index) {
            Some(slot) if slot.accepts.accepts(ty) => Ok(()),
            Some(slot) => Err(format!("{} for input '{}'", slot.accepts.describe(), slot.role)),
            None => Err(format!("no input at position {index}")),
        }
    }
}

impl Default for InputSpec {
    fn default() -> Self {
        Self::unconstrained()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positional_slots_check_in_order() {
        let spec = InputSpec::none()
            .slot("calibration", TypeConstraint::Exact(FieldType::SFFloat))
            .slot("position", TypeConstraint::Exact(FieldType::SFVec3f));

        assert!(spec.check(0, FieldType::SFFloat).is_ok());
        assert!(spec.check(0, FieldType::SFVec3f).is_err());
        assert!(spec.check(1, FieldType::SFVec3f).is_ok());
        assert!(spec.check(2, FieldType::SFVec3f).is_err());
        assert_eq!(spec.index_of("position"), Some(1));
        assert_eq!(spec.index_of("missing"), None);
    }

    #[test]
    fn tail_repeats_after_fixed_slots() {
        let spec = InputSpec::none()
            .slot("scale", TypeConstraint::Exact(FieldType::SFFloat))
            .then_any_number(
                "values",
                TypeConstraint::one_of(&[FieldType::SFInt32, FieldType::SFFloat]),
            );

        assert!(spec.check(0, FieldType::SFFloat).is_ok());
        assert!(spec.check(5, FieldType::SFInt32).is_ok());
        assert!(spec.check(5, FieldType::SFString).is_err());
        assert_eq!(spec.index_of("values"), Some(1));
    }

    #[test]
    fn any_slot_takes_one_input_of_any_type() {
        let spec = InputSpec::none().slot("value", TypeConstraint::Any);
        assert!(spec.check(0, FieldType::SFString).is_ok());
        assert!(spec.check(0, FieldType::MFNode).is_ok());
        assert!(spec.check(1, FieldType::SFString).is_err());
        assert_eq!(TypeConstraint::Any.describe(), "any field");
    }

    #[test]
    fn unconstrained_accepts_everything() {
        let spec = InputSpec::unconstrained();
        assert!(spec.check(0, FieldType::Void).is_ok());
        assert!(spec.check(99, FieldType::MFNode).is_ok());
        assert!(InputSpec::none().check(0, FieldType::Void).is_err());
    }
}
