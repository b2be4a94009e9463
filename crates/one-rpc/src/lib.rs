// SPDX-License-Identifier: MIT OR Apache-2.0
//! one-rpc
//!
//! Request/response RPC over a pluggable, message-oriented transport.
//! Three layers, bottom up: the [`MessageTransport`] trait (the only seam a
//! concrete WebSocket/QUIC implementation has to fill), the fragmentation
//! layer turning large messages into `start / data… / end` frame
//! sequences, and the promisifier matching JSON request envelopes to
//! response envelopes by numeric ID.

#![deny(unsafe_code)]
#![warn(missing_docs)]

/// Chunking and reassembly of large messages.
pub mod fragment;
/// Request/response matching and service dispatch.
pub mod promisifier;
/// The transport seam and an in-process implementation.
pub mod transport;

pub use fragment::{
    DEFAULT_CHUNK_SIZE, FRAGMENTATION_END, FRAGMENTATION_START_BINARY, FRAGMENTATION_START_STRING,
    FragmentCollector, encode_fragments,
};
pub use promisifier::{Promisifier, PromisifierStats};
pub use transport::{MessageTransport, TransportEvent, WireMessage, memory_pair};
