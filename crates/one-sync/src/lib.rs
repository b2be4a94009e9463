// SPDX-License-Identifier: MIT OR Apache-2.0
//! one-sync
//!
//! The coordination primitives the store is built on: a named serializer
//! guaranteeing at-most-one in-flight execution per string name, a tracking
//! promise with externally exposed resolve/reject, a blocking priority
//! queue, and retry/timeout combinators.

#![deny(unsafe_code)]
#![warn(missing_docs)]

/// Shareable settle-once promise handles.
pub mod promise;
/// Blocking, bounded, priority-ordered queue.
pub mod queue;
/// Exponential-backoff retry.
pub mod retry;
/// Per-name FIFO execution chains.
pub mod serializer;
/// Deadline combinator.
pub mod timeout;

pub use promise::TrackingPromise;
pub use queue::{BlockingPriorityQueue, QueueOptions};
pub use retry::{RetryOptions, retry};
pub use serializer::NamedSerializer;
pub use timeout::{NEVER, timeout};
