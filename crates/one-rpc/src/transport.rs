// SPDX-License-Identifier: MIT OR Apache-2.0
//! The transport seam and an in-process implementation.
//!
//! A transport is full-duplex and message-oriented: it delivers whole
//! text or binary messages, in order, and reports its close exactly once.
//! Incoming traffic arrives on an event channel rather than a callback, so
//! consumers own their receive loop.

use async_trait::async_trait;
use one_error::{ErrorKind, OneError, Result, codes};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc;

/// One transport message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireMessage {
    /// A UTF-8 text message.
    Text(String),
    /// A binary message.
    Binary(Vec<u8>),
}

impl WireMessage {
    /// Payload length in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Text(s) => s.len(),
            Self::Binary(b) => b.len(),
        }
    }

    /// Whether the payload is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// What a transport delivers to its consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// An incoming message.
    Message(WireMessage),
    /// The connection closed; no further events follow.
    Closed {
        /// Close code.
        code: u16,
        /// Optional close reason.
        reason: Option<String>,
    },
}

/// A full-duplex, message-oriented connection.
#[async_trait]
pub trait MessageTransport: Send + Sync {
    /// Send one message.
    ///
    /// # Errors
    ///
    /// `WS-CLOSE` when the connection is no longer open.
    async fn send(&self, message: WireMessage) -> Result<()>;

    /// Close the connection. Idempotent.
    ///
    /// # Errors
    ///
    /// Transport-specific failures; the in-process transport never fails.
    async fn close(&self, code: u16, reason: Option<String>) -> Result<()>;
}

// ---------------------------------------------------------------------------
// In-process pair transport
// ---------------------------------------------------------------------------

/// One side of an in-process connection pair.
///
/// Used by tests and local loopback wiring; semantics match the trait
/// contract, including close delivery to both sides.
pub struct MemoryTransport {
    to_peer: mpsc::UnboundedSender<TransportEvent>,
    to_self: mpsc::UnboundedSender<TransportEvent>,
    closed: AtomicBool,
}

/// Create a connected transport pair.
///
/// Each element is a transport handle plus the event stream of traffic
/// arriving at that side.
#[must_use]
pub fn memory_pair() -> (
    (Arc<MemoryTransport>, mpsc::UnboundedReceiver<TransportEvent>),
    (Arc<MemoryTransport>, mpsc::UnboundedReceiver<TransportEvent>),
) {
    let (a_tx, a_rx) = mpsc::unbounded_channel();
    let (b_tx, b_rx) = mpsc::unbounded_channel();
    let a = Arc::new(MemoryTransport {
        to_peer: b_tx.clone(),
        to_self: a_tx.clone(),
        closed: AtomicBool::new(false),
    });
    let b = Arc::new(MemoryTransport {
        to_peer: a_tx,
        to_self: b_tx,
        closed: AtomicBool::new(false),
    });
    ((a, a_rx), (b, b_rx))
}

#[async_trait]
impl MessageTransport for MemoryTransport {
    async fn send(&self, message: WireMessage) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(closed_error());
        }
        self.to_peer
            .send(TransportEvent::Message(message))
            .map_err(|_| closed_error())
    }

    async fn close(&self, code: u16, reason: Option<String>) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let event = TransportEvent::Closed {
            code,
            reason,
        };
        let _ = self.to_peer.send(event.clone());
        let _ = self.to_self.send(event);
        Ok(())
    }
}

fn closed_error() -> OneError {
    OneError::new(ErrorKind::Transport, codes::WS_CLOSE, "connection is closed")
}
