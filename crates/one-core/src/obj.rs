// SPDX-License-Identifier: MIT OR Apache-2.0
//! Typed records.
//!
//! An [`Obj`] is what callers hand to the store: a type name, a set of
//! properties, and (after a versioned read) the content hash of the version
//! it was loaded from. The source model carries the type and version as the
//! meta-properties `$type$` and `$versionHash$`; here they are plain struct
//! fields and never appear among the props.

use crate::hash::Hash;
use crate::value::{RefLink, Value};
use std::collections::BTreeMap;

/// The meta-key naming an object's type in the source model.
pub const META_TYPE: &str = "$type$";
/// The meta-key carrying the loaded version's content hash.
pub const META_VERSION_HASH: &str = "$versionHash$";

/// A typed, recipe-validated record.
#[derive(Debug, Clone, PartialEq)]
pub struct Obj {
    type_name: String,
    props: BTreeMap<String, Value>,
    version_hash: Option<Hash>,
}

impl Obj {
    /// Create an empty object of the given type.
    #[must_use]
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            props: BTreeMap::new(),
            version_hash: None,
        }
    }

    /// Builder-style property setter.
    #[must_use]
    pub fn with(mut self, prop: impl Into<String>, value: impl Into<Value>) -> Self {
        self.props.insert(prop.into(), value.into());
        self
    }

    /// Set a property.
    pub fn set(&mut self, prop: impl Into<String>, value: impl Into<Value>) {
        self.props.insert(prop.into(), value.into());
    }

    /// Read a property.
    #[must_use]
    pub fn get(&self, prop: &str) -> Option<&Value> {
        self.props.get(prop)
    }

    /// The object's type name.
    #[must_use]
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// All properties in key order.
    #[must_use]
    pub fn props(&self) -> &BTreeMap<String, Value> {
        &self.props
    }

    /// The content hash of the version this object was loaded from, if any.
    #[must_use]
    pub fn version_hash(&self) -> Option<Hash> {
        self.version_hash
    }

    /// Record the version this object was loaded from.
    pub fn set_version_hash(&mut self, hash: Hash) {
        self.version_hash = Some(hash);
    }

    /// Visit every reference link in the object's property values.
    pub fn for_each_reference(&self, mut f: impl FnMut(&RefLink)) {
        for value in self.props.values() {
            value.for_each_reference(&mut f);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::RefKind;

    #[test]
    fn builder_and_accessors() {
        let obj = Obj::new("Person").with("email", "a@b").with("age", 42i64);
        assert_eq!(obj.type_name(), "Person");
        assert_eq!(obj.get("email"), Some(&Value::String("a@b".into())));
        assert_eq!(obj.get("age"), Some(&Value::Integer(42)));
        assert!(obj.get("missing").is_none());
        assert!(obj.version_hash().is_none());
    }

    #[test]
    fn reference_walk_covers_all_props() {
        let h = Hash::digest(b"x");
        let obj = Obj::new("Instance")
            .with("owner", RefLink::id(h))
            .with("data", Value::List(vec![Value::Reference(RefLink::blob(h))]));
        let mut kinds = Vec::new();
        obj.for_each_reference(|link| kinds.push(link.kind));
        kinds.sort();
        assert_eq!(kinds, vec![RefKind::Id, RefKind::Blob]);
    }
}
