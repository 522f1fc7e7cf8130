//! The closed set of value kinds the engine knows how to canonicalize and
//! fingerprint (spec.md Open Question (a)): primitive scalars, ordered
//! sequences, sets, mappings, references to prior Resources/FileResources,
//! and a fallback "opaque" kind for anything else, carrying a type tag so
//! that two different opaque types never compare equal by accident.

use rms_common::serde::{Deserialize, Serialize};

use crate::ids::{FileResourceId, ResourceId};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(crate = "rms_common::serde")]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
    /// An ordered sequence; element order is significant.
    Seq(Vec<Value>),
    /// An unordered collection; canonicalized by sorted element digests.
    Set(Vec<Value>),
    /// A mapping; canonicalized by key-sorted pairs.
    Map(Vec<(Value, Value)>),
    /// A reference to a Resource produced by a prior Task. Canonicalized by
    /// the fingerprint of that Task plus the Resource's output ordinal, not
    /// by this id (ids are not stable across databases).
    Resource(ResourceId),
    /// A reference to a FileResource. Canonicalized by its stored MD5, not
    /// by path.
    FileResource(FileResourceId),
    /// Anything else: a stable serialization of a type tag plus its bytes.
    Opaque { type_tag: String, bytes: Vec<u8> },
}

impl Value {
    pub fn text(s: impl Into<String>) -> Self {
        Value::Text(s.into())
    }

    pub fn is_resource_ref(&self) -> bool {
        matches!(self, Value::Resource(_) | Value::FileResource(_))
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}
