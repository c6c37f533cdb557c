//! Field values.
//!
//! The set of value categories a field can hold is closed: [`FieldValue`]
//! is the runtime representation and [`FieldType`] its tag. Rust types map
//! onto these categories through [`FieldData`], which lets
//! [`FieldRef<T>`] handles read and write fields with static types while
//! the graph itself stores everything uniformly.

use std::fmt;
use std::marker::PhantomData;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use super::FieldId;
use crate::graph::NodeId;

/// Tag of a [`FieldValue`], named after the X3D field types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldType {
    /// A field without a value (event-only fields, display lists).
    Void,
    SFBool,
    SFInt32,
    SFFloat,
    SFDouble,
    SFTime,
    SFVec3f,
    SFString,
    SFNode,
    MFBool,
    MFInt32,
    MFFloat,
    MFDouble,
    MFVec3f,
    MFString,
    MFNode,
}

impl FieldType {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Void => "Field",
            Self::SFBool => "SFBool",
            Self::SFInt32 => "SFInt32",
            Self::SFFloat => "SFFloat",
            Self::SFDouble => "SFDouble",
            Self::SFTime => "SFTime",
            Self::SFVec3f => "SFVec3f",
            Self::SFString => "SFString",
            Self::SFNode => "SFNode",
            Self::MFBool => "MFBool",
            Self::MFInt32 => "MFInt32",
            Self::MFFloat => "MFFloat",
            Self::MFDouble => "MFDouble",
            Self::MFVec3f => "MFVec3f",
            Self::MFString => "MFString",
            Self::MFNode => "MFNode",
        }
    }

    /// The zero value of this type.
    pub fn default_value(&self) -> FieldValue {
        match self {
            Self::Void => FieldValue::Void,
            Self::SFBool => FieldValue::Bool(false),
            Self::SFInt32 => FieldValue::Int32(0),
            Self::SFFloat => FieldValue::Float(0.0),
            Self::SFDouble => FieldValue::Double(0.0),
            Self::SFTime => FieldValue::Time(0.0),
            Self::SFVec3f => FieldValue::Vec3f([0.0; 3]),
            Self::SFString => FieldValue::String(String::new()),
            Self::SFNode => FieldValue::Node(None),
            Self::MFBool => FieldValue::MBool(Vec::new()),
            Self::MFInt32 => FieldValue::MInt32(Vec::new()),
            Self::MFFloat => FieldValue::MFloat(Vec::new()),
            Self::MFDouble => FieldValue::MDouble(Vec::new()),
            Self::MFVec3f => FieldValue::MVec3f(Vec::new()),
            Self::MFString => FieldValue::MString(Vec::new()),
            Self::MFNode => FieldValue::MNode(Vec::new()),
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The value held by a field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FieldValue {
    Void,
    Bool(bool),
    Int32(i32),
    Float(f32),
    Double(f64),
    Time(f64),
    Vec3f([f32; 3]),
    String(String),
    Node(Option<NodeId>),
    MBool(Vec<bool>),
    MInt32(Vec<i32>),
    MFloat(Vec<f32>),
    MDouble(Vec<f64>),
    MVec3f(Vec<[f32; 3]>),
    MString(Vec<String>),
    MNode(Vec<NodeId>),
}

impl FieldValue {
    pub fn field_type(&self) -> FieldType {
        match self {
            Self::Void => FieldType::Void,
            Self::Bool(_) => FieldType::SFBool,
            Self::Int32(_) => FieldType::SFInt32,
            Self::Float(_) => FieldType::SFFloat,
            Self::Double(_) => FieldType::SFDouble,
            Self::Time(_) => FieldType::SFTime,
            Self::Vec3f(_) => FieldType::SFVec3f,
            Self::String(_) => FieldType::SFString,
            Self::Node(_) => FieldType::SFNode,
            Self::MBool(_) => FieldType::MFBool,
            Self::MInt32(_) => FieldType::MFInt32,
            Self::MFloat(_) => FieldType::MFFloat,
            Self::MDouble(_) => FieldType::MFDouble,
            Self::MVec3f(_) => FieldType::MFVec3f,
            Self::MString(_) => FieldType::MFString,
            Self::MNode(_) => FieldType::MFNode,
        }
    }

    /// Nodes referenced by an SFNode or MFNode value.
    pub fn nodes(&self) -> Vec<NodeId> {
        match self {
            Self::Node(Some(n)) => vec![*n],
            Self::MNode(ns) => ns.clone(),
            _ => Vec::new(),
        }
    }
}

/// Wall-clock time in seconds, the value of SFTime fields.
#[derive(Debug, Clone, Copy, Default, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct TimeStamp(pub f64);

impl TimeStamp {
    /// Seconds since the Unix epoch.
    pub fn now() -> Self {
        let secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or_default();
        Self(secs)
    }

    pub fn seconds(&self) -> f64 {
        self.0
    }
}

/// A Rust type that can live in a field.
pub trait FieldData: Clone + Send + Sync + 'static {
    const FIELD_TYPE: FieldType;

    fn into_value(self) -> FieldValue;

    fn from_value(value: &FieldValue) -> Option<Self>;
}

macro_rules! field_data {
    ($ty:ty, $tag:ident, $variant:ident) => {
        impl FieldData for $ty {
            const FIELD_TYPE: FieldType = FieldType::$tag;

            fn into_value(self) -> FieldValue {
                FieldValue::$variant(self)
            }

            fn from_value(value: &FieldValue) -> Option<Self> {
                match value {
                    FieldValue::$variant(v) => Some(v.clone()),
                    _ => None,
                }
            }
        }
    };
}

field_data!(bool, SFBool, Bool);
field_data!(i32, SFInt32, Int32);
field_data!(f32, SFFloat, Float);
field_data!(f64, SFDouble, Double);
field_data!([f32; 3], SFVec3f, Vec3f);
field_data!(String, SFString, String);
field_data!(Option<NodeId>, SFNode, Node);
field_data!(Vec<bool>, MFBool, MBool);
field_data!(Vec<i32>, MFInt32, MInt32);
field_data!(Vec<f32>, MFFloat, MFloat);
field_data!(Vec<f64>, MFDouble, MDouble);
field_data!(Vec<[f32; 3]>, MFVec3f, MVec3f);
field_data!(Vec<String>, MFString, MString);
field_data!(Vec<NodeId>, MFNode, MNode);

impl FieldData for TimeStamp {
    const FIELD_TYPE: FieldType = FieldType::SFTime;

    fn into_value(self) -> FieldValue {
        FieldValue::Time(self.0)
    }

    fn from_value(value: &FieldValue) -> Option<Self> {
        match value {
            FieldValue::Time(t) => Some(TimeStamp(*t)),
            _ => None,
        }
    }
}

/// A typed handle to a field.
///
/// Obtained from [`crate::FieldGraph::add_typed`] or
/// [`crate::FieldGraph::typed`], both of which verify the field's type once.
pub struct FieldRef<T> {
    id: FieldId,
    _marker: PhantomData<fn() -> T>,
}

impl<T: FieldData> FieldRef<T> {
    pub(crate) fn new(id: FieldId) -> Self {
        Self {
            id,
            _marker: PhantomData,
        }
    }

    pub fn id(&self) -> FieldId {
        self.id
    }
}

impl<T> Clone for FieldRef<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for FieldRef<T> {}

impl<T> PartialEq for FieldRef<T> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<T> Eq for FieldRef<T> {}

impl<T> fmt::Debug for FieldRef<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("FieldRef").field(&self.id).finish()
    }
}

impl<T> From<FieldRef<T>> for FieldId {
    fn from(field: FieldRef<T>) -> Self {
        field.id
    }
}
