// SPDX-License-Identifier: MIT OR Apache-2.0
//! one-core
//!
//! The stable data contract for the ONE object store: the [`Hash`] newtype,
//! the tagged [`Value`] carrier, the [`Obj`] record, and the canonical
//! stringifier every content hash is ultimately derived from.
//!
//! If you only take one dependency, take this one.

#![deny(unsafe_code)]
#![warn(missing_docs)]

/// Deterministic, byte-exact stringification of [`Value`] trees.
pub mod canonical;
/// The 32-byte content / ID hash newtype.
pub mod hash;
/// Typed records with `$type$` / `$versionHash$` meta handling.
pub mod obj;
/// The tagged value carrier every object graph is made of.
pub mod value;

pub use canonical::{MAX_DEPTH, canonical_number, canonical_string};
pub use hash::{EMPTY_HASH, Hash};
pub use obj::Obj;
pub use value::{RefKind, RefLink, Value};
