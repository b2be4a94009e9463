// SPDX-License-Identifier: MIT OR Apache-2.0
//! The tagged value carrier.
//!
//! Object graphs are dynamic in the source model; here they are an owned
//! tree of [`Value`] nodes. Recipes decide how a given node is serialized,
//! so the same `Value::String` can become a scalar span, a regexp-checked
//! string, or a stringifiable blob depending on the rule it lands in.

use crate::hash::Hash;
use serde::{Deserialize, Serialize};

/// Which artifact kind a reference points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefKind {
    /// A stored object (microdata file) addressed by content hash.
    Object,
    /// A versioned identity addressed by ID hash.
    Id,
    /// A UTF-8 text file addressed by content hash.
    Clob,
    /// An opaque binary file addressed by content hash.
    Blob,
}

impl RefKind {
    /// The `data-type` attribute value used in microdata anchors.
    #[must_use]
    pub fn data_type(&self) -> &'static str {
        match self {
            Self::Object => "obj",
            Self::Id => "id",
            Self::Clob => "clob",
            Self::Blob => "blob",
        }
    }

    /// Parse a `data-type` attribute value.
    #[must_use]
    pub fn from_data_type(s: &str) -> Option<Self> {
        match s {
            "obj" => Some(Self::Object),
            "id" => Some(Self::Id),
            "clob" => Some(Self::Clob),
            "blob" => Some(Self::Blob),
            _ => None,
        }
    }
}

/// A typed link to another stored artifact.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RefLink {
    /// What the hash addresses.
    pub kind: RefKind,
    /// The target hash.
    pub hash: Hash,
}

impl RefLink {
    /// Link to a stored object.
    #[must_use]
    pub fn obj(hash: Hash) -> Self {
        Self { kind: RefKind::Object, hash }
    }

    /// Link to a versioned identity.
    #[must_use]
    pub fn id(hash: Hash) -> Self {
        Self { kind: RefKind::Id, hash }
    }

    /// Link to a CLOB.
    #[must_use]
    pub fn clob(hash: Hash) -> Self {
        Self { kind: RefKind::Clob, hash }
    }

    /// Link to a BLOB.
    #[must_use]
    pub fn blob(hash: Hash) -> Self {
        Self { kind: RefKind::Blob, hash }
    }
}

/// A node in an object graph.
///
/// `Bag` and `Set` keep their insertion order in memory; serialization
/// sorts them so the output is insertion-order-independent. `Map` entries
/// are likewise sorted at serialization time by the key's canonical form.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Absent / null.
    Null,
    /// Boolean scalar.
    Bool(bool),
    /// Integer scalar.
    Integer(i64),
    /// Floating-point scalar.
    Number(f64),
    /// String scalar.
    String(String),
    /// Typed link to another stored artifact.
    Reference(RefLink),
    /// Ordered collection.
    List(Vec<Value>),
    /// Unordered collection, duplicates allowed.
    Bag(Vec<Value>),
    /// Unordered collection without duplicates.
    Set(Vec<Value>),
    /// Key/value entries.
    Map(Vec<(Value, Value)>),
    /// Nested record (inline object rules, not a separate stored object).
    Record(Vec<(String, Value)>),
}

impl Value {
    /// The variant name, for error messages.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "boolean",
            Self::Integer(_) => "integer",
            Self::Number(_) => "number",
            Self::String(_) => "string",
            Self::Reference(_) => "reference",
            Self::List(_) => "array",
            Self::Bag(_) => "bag",
            Self::Set(_) => "set",
            Self::Map(_) => "map",
            Self::Record(_) => "object",
        }
    }

    /// Visit every [`RefLink`] in this value tree, depth-first.
    pub fn for_each_reference(&self, f: &mut impl FnMut(&RefLink)) {
        match self {
            Self::Reference(link) => f(link),
            Self::List(items) | Self::Bag(items) | Self::Set(items) => {
                for item in items {
                    item.for_each_reference(f);
                }
            }
            Self::Map(entries) => {
                for (k, v) in entries {
                    k.for_each_reference(f);
                    v.for_each_reference(f);
                }
            }
            Self::Record(fields) => {
                for (_, v) in fields {
                    v.for_each_reference(f);
                }
            }
            _ => {}
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Self::Integer(n)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<RefLink> for Value {
    fn from(link: RefLink) -> Self {
        Self::Reference(link)
    }
}
