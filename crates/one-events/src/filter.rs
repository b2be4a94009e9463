// SPDX-License-Identifier: MIT OR Apache-2.0
//! Handler filter shapes.
//!
//! Three shapes mirror the three event kinds: versioned `(type, idHash)`
//! with `*` wildcards on either position, unversioned `(type)`, and
//! id-object `(type)`. A filter only ever matches events of its own kind;
//! `*`/`*` matches every event of that kind.

use one_core::Hash;
use one_versioned::{StoreEvent, StoreEventKind};

/// Matches a type name exactly, or any type (`*`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypePattern {
    /// Matches every type.
    Any,
    /// Matches one type name.
    Exact(String),
}

impl TypePattern {
    /// Parse `"*"` as [`TypePattern::Any`], anything else as exact.
    #[must_use]
    pub fn new(pattern: &str) -> Self {
        if pattern == "*" {
            Self::Any
        } else {
            Self::Exact(pattern.to_string())
        }
    }

    /// Whether `type_name` matches.
    #[must_use]
    pub fn matches(&self, type_name: &str) -> bool {
        match self {
            Self::Any => true,
            Self::Exact(name) => name == type_name,
        }
    }
}

/// Matches an ID hash exactly, or any (`*`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdPattern {
    /// Matches every identity.
    Any,
    /// Matches one ID hash.
    Exact(Hash),
}

impl IdPattern {
    /// Whether `id_hash` matches.
    #[must_use]
    pub fn matches(&self, id_hash: Option<Hash>) -> bool {
        match self {
            Self::Any => true,
            Self::Exact(expected) => id_hash == Some(*expected),
        }
    }
}

/// What a handler subscribes to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventFilter {
    /// New versions of versioned objects.
    Versioned {
        /// Type filter.
        type_pattern: TypePattern,
        /// Identity filter.
        id_pattern: IdPattern,
    },
    /// New unversioned objects.
    Unversioned {
        /// Type filter.
        type_pattern: TypePattern,
    },
    /// First appearance of a versioned identity.
    IdObject {
        /// Type filter.
        type_pattern: TypePattern,
    },
}

impl EventFilter {
    /// Versioned filter; `"*"` wildcards the type, `None` the identity.
    #[must_use]
    pub fn versioned(type_pattern: &str, id_hash: Option<Hash>) -> Self {
        Self::Versioned {
            type_pattern: TypePattern::new(type_pattern),
            id_pattern: match id_hash {
                Some(h) => IdPattern::Exact(h),
                None => IdPattern::Any,
            },
        }
    }

    /// Unversioned filter; `"*"` wildcards the type.
    #[must_use]
    pub fn unversioned(type_pattern: &str) -> Self {
        Self::Unversioned {
            type_pattern: TypePattern::new(type_pattern),
        }
    }

    /// Id-object filter; `"*"` wildcards the type.
    #[must_use]
    pub fn id_object(type_pattern: &str) -> Self {
        Self::IdObject {
            type_pattern: TypePattern::new(type_pattern),
        }
    }

    /// Whether this filter matches `event`.
    #[must_use]
    pub fn matches(&self, event: &StoreEvent) -> bool {
        match self {
            Self::Versioned {
                type_pattern,
                id_pattern,
            } => {
                event.kind == StoreEventKind::NewVersionedObject
                    && type_pattern.matches(event.type_name())
                    && id_pattern.matches(event.id_hash)
            }
            Self::Unversioned { type_pattern } => {
                event.kind == StoreEventKind::NewUnversionedObject
                    && type_pattern.matches(event.type_name())
            }
            Self::IdObject { type_pattern } => {
                event.kind == StoreEventKind::NewIdObject
                    && type_pattern.matches(event.type_name())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use one_core::Obj;

    fn event(kind: StoreEventKind, type_name: &str, id: Option<Hash>) -> StoreEvent {
        StoreEvent {
            kind,
            obj: Obj::new(type_name),
            hash: Hash::digest(b"content"),
            id_hash: id,
            timestamp: 0,
        }
    }

    #[test]
    fn wildcard_matches_every_type_of_its_kind() {
        let filter = EventFilter::versioned("*", None);
        let id = Hash::digest(b"id");
        assert!(filter.matches(&event(StoreEventKind::NewVersionedObject, "A", Some(id))));
        assert!(filter.matches(&event(StoreEventKind::NewVersionedObject, "B", Some(id))));
        // Kind boundaries hold even for `*`/`*`.
        assert!(!filter.matches(&event(StoreEventKind::NewUnversionedObject, "A", None)));
        assert!(!filter.matches(&event(StoreEventKind::NewIdObject, "A", Some(id))));
    }

    #[test]
    fn exact_type_and_id_narrow_the_match() {
        let id = Hash::digest(b"id");
        let other = Hash::digest(b"other");
        let filter = EventFilter::versioned("Person", Some(id));
        assert!(filter.matches(&event(StoreEventKind::NewVersionedObject, "Person", Some(id))));
        assert!(!filter.matches(&event(StoreEventKind::NewVersionedObject, "Person", Some(other))));
        assert!(!filter.matches(&event(StoreEventKind::NewVersionedObject, "Group", Some(id))));
    }

    #[test]
    fn unversioned_and_id_object_shapes() {
        assert!(EventFilter::unversioned("Tag")
            .matches(&event(StoreEventKind::NewUnversionedObject, "Tag", None)));
        assert!(EventFilter::id_object("*")
            .matches(&event(StoreEventKind::NewIdObject, "Anything", Some(Hash::digest(b"i")))));
        assert!(!EventFilter::unversioned("Tag")
            .matches(&event(StoreEventKind::NewVersionedObject, "Tag", None)));
    }
}
