// SPDX-License-Identifier: MIT OR Apache-2.0
//! Store events and their broadcast plumbing.
//!
//! Every successful write of a *new* file announces itself here. Events
//! are immutable once published — subscribers share one `Arc` per event —
//! and delivery is fan-out: each subscriber sees every event published
//! after it subscribed.

use one_core::{Hash, Obj};
use std::sync::Arc;
use tokio::sync::broadcast;

/// What kind of write produced an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreEventKind {
    /// A new version of a versioned object was written.
    NewVersionedObject,
    /// A new unversioned object was written.
    NewUnversionedObject,
    /// A versioned identity appeared for the first time.
    NewIdObject,
}

/// An announcement of a newly stored object.
#[derive(Debug, Clone)]
pub struct StoreEvent {
    /// What happened.
    pub kind: StoreEventKind,
    /// The stored object.
    pub obj: Obj,
    /// The content hash of the written file.
    pub hash: Hash,
    /// The object's ID hash, for versioned and ID events.
    pub id_hash: Option<Hash>,
    /// Write time in epoch milliseconds.
    pub timestamp: i64,
}

impl StoreEvent {
    /// The stored object's type name.
    #[must_use]
    pub fn type_name(&self) -> &str {
        self.obj.type_name()
    }
}

/// Fan-out sender for store events.
///
/// A sink with no subscribers silently drops events, matching the source
/// semantics where nothing listens until a dispatcher connects.
#[derive(Debug, Clone)]
pub struct EventSink {
    sender: broadcast::Sender<Arc<StoreEvent>>,
}

impl Default for EventSink {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSink {
    /// Create a sink with the default buffer.
    #[must_use]
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(256);
        Self { sender }
    }

    /// Subscribe to events published after this call.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<StoreEvent>> {
        self.sender.subscribe()
    }

    /// Publish an event to all current subscribers.
    pub fn emit(&self, event: StoreEvent) {
        // An Err only means there are no subscribers right now.
        let _ = self.sender.send(Arc::new(event));
    }
}
