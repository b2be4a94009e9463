// SPDX-License-Identifier: MIT OR Apache-2.0
//! one-events
//!
//! The object-event dispatcher: a single cooperative loop that pulls
//! store events off a priority queue and runs every matching handler,
//! sequentially, in registration order. Handler failures are routed to an
//! error callback and never break the loop.

#![deny(unsafe_code)]
#![warn(missing_docs)]

/// The dispatcher loop and its registration API.
pub mod dispatcher;
/// Handler filter shapes.
pub mod filter;
/// Bounded execution statistics.
pub mod stats;

pub use dispatcher::{DispatcherOptions, HandlerId, ObjectEventDispatcher};
pub use filter::{EventFilter, IdPattern, TypePattern};
pub use stats::{DispatcherStats, ExecutionSample, ProcessedEvent};
