// SPDX-License-Identifier: MIT OR Apache-2.0
//! one-versioned
//!
//! The versioned object layer on top of the storage engine. A versioned
//! object has a stable identity (its ID hash) and a history of content
//! hashes recorded in an append-only version head; the last line is the
//! current head. Writes also maintain the reverse maps and announce new
//! objects on a broadcast channel the event dispatcher subscribes to.

#![deny(unsafe_code)]
#![warn(missing_docs)]

/// Store events and their broadcast plumbing.
pub mod events;
/// Version-head and reverse-map line records.
pub mod nodes;
/// The object store facade.
pub mod store;

pub use events::{EventSink, StoreEvent, StoreEventKind};
pub use nodes::{ReverseMapEntry, VersionNode};
pub use store::{ObjectStore, VersionedCreation};
