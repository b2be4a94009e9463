// SPDX-License-Identifier: MIT OR Apache-2.0
//! one-store
//!
//! Facade over the ONE content-addressed object store. Every persisted
//! object is serialized to a canonical microdata line whose SHA-256 digest
//! is the object's identity; on top of that sit recipes, versioned
//! objects, an event dispatcher, and promise-based RPC over a pluggable
//! transport.
//!
//! The individual crates are re-exported here so applications can take a
//! single dependency:
//!
//! - [`core`]: hashes, the value carrier, canonical stringification
//! - [`recipes`]: the schema registry driving all serialization
//! - [`microdata`]: the object ↔ microdata codec
//! - [`storage`]: the on-disk engine
//! - [`versioned`]: version trees and the object store facade
//! - [`events`]: the object-event dispatcher
//! - [`rpc`]: fragmentation and the promisifier
//! - [`sync`]: named serializer, queues, retry, timeout
//! - [`error`]: the stable-code error taxonomy

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub use one_core as core;
pub use one_error as error;
pub use one_events as events;
pub use one_microdata as microdata;
pub use one_recipes as recipes;
pub use one_rpc as rpc;
pub use one_storage as storage;
pub use one_sync as sync;
pub use one_versioned as versioned;

pub use one_core::{Hash, Obj, RefKind, RefLink, Value};
pub use one_error::{ErrorKind, OneError, Result};
pub use one_recipes::{Recipe, RecipeRegistry, RecipeRule, ValueType};
pub use one_storage::{Storage, StorageInitOptions};
pub use one_versioned::ObjectStore;
