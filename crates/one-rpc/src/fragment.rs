// SPDX-License-Identifier: MIT OR Apache-2.0
//! Chunking and reassembly of large messages.
//!
//! Messages longer than the chunk size travel as a keyword frame
//! (`fragmentation_start_binary` / `fragmentation_start_string`), N data
//! frames, and a `fragmentation_end` frame. Text frames that would collide
//! with a keyword get a single `x` appended; the receiver strips exactly
//! one. Small messages pass through unchanged. One connection carries one
//! stream at a time — interleaving is an error, not a feature.

use crate::transport::WireMessage;
use one_error::{ErrorKind, OneError, Result, codes};

/// Opens a fragmented binary stream.
pub const FRAGMENTATION_START_BINARY: &str = "fragmentation_start_binary";
/// Opens a fragmented text stream.
pub const FRAGMENTATION_START_STRING: &str = "fragmentation_start_string";
/// Terminates a fragmented stream.
pub const FRAGMENTATION_END: &str = "fragmentation_end";

/// Default payload bytes per data frame.
pub const DEFAULT_CHUNK_SIZE: usize = 16 * 1024;

const ESCAPE: char = 'x';

fn starts_with_keyword(s: &str) -> bool {
    s.starts_with(FRAGMENTATION_START_BINARY)
        || s.starts_with(FRAGMENTATION_START_STRING)
        || s.starts_with(FRAGMENTATION_END)
}

fn escape_if_keyword(s: String) -> String {
    if starts_with_keyword(&s) {
        let mut escaped = s;
        escaped.push(ESCAPE);
        escaped
    } else {
        s
    }
}

fn strip_escape(s: &str) -> Result<String> {
    match s.strip_suffix(ESCAPE) {
        Some(stripped) => Ok(stripped.to_string()),
        None => Err(OneError::new(
            ErrorKind::Transport,
            codes::WSF_MSG1,
            format!("keyword-prefixed frame without escape character: {s:?}"),
        )),
    }
}

/// Split a string on char boundaries into chunks of at most `chunk_size`
/// bytes. A single char wider than the chunk size travels whole — frames
/// must stay valid UTF-8.
fn chunk_str(s: &str, chunk_size: usize) -> Vec<&str> {
    let mut chunks = Vec::new();
    let mut rest = s;
    while !rest.is_empty() {
        let mut end = rest.len().min(chunk_size);
        while end > 0 && !rest.is_char_boundary(end) {
            end -= 1;
        }
        if end == 0 {
            end = rest.chars().next().map_or(rest.len(), char::len_utf8);
        }
        let (chunk, tail) = rest.split_at(end);
        chunks.push(chunk);
        rest = tail;
    }
    chunks
}

/// Encode one outgoing message as a frame sequence.
///
/// Messages no longer than `chunk_size` pass through as a single frame
/// (escaped if text colliding with a keyword); longer messages become
/// `start`, data frames, `end`.
///
/// # Panics
///
/// Panics if `chunk_size` is zero; the chunk size is a construction-time
/// constant, not data.
#[must_use]
pub fn encode_fragments(message: WireMessage, chunk_size: usize) -> Vec<WireMessage> {
    assert!(chunk_size > 0, "chunk size must be positive");
    match message {
        WireMessage::Text(s) => {
            if s.len() <= chunk_size {
                return vec![WireMessage::Text(escape_if_keyword(s))];
            }
            let mut frames = vec![WireMessage::Text(FRAGMENTATION_START_STRING.to_string())];
            for chunk in chunk_str(&s, chunk_size) {
                frames.push(WireMessage::Text(escape_if_keyword(chunk.to_string())));
            }
            frames.push(WireMessage::Text(FRAGMENTATION_END.to_string()));
            frames
        }
        WireMessage::Binary(bytes) => {
            if bytes.len() <= chunk_size {
                return vec![WireMessage::Binary(bytes)];
            }
            let mut frames = vec![WireMessage::Text(FRAGMENTATION_START_BINARY.to_string())];
            for chunk in bytes.chunks(chunk_size) {
                frames.push(WireMessage::Binary(chunk.to_vec()));
            }
            frames.push(WireMessage::Text(FRAGMENTATION_END.to_string()));
            frames
        }
    }
}

// ---------------------------------------------------------------------------
// FragmentCollector
// ---------------------------------------------------------------------------

enum CollectorState {
    Idle,
    Binary(Vec<u8>),
    Text(String),
}

/// Receiver-side reassembly.
///
/// Feed every incoming frame through [`push`](FragmentCollector::push);
/// complete messages come back out. One collector per connection.
pub struct FragmentCollector {
    state: CollectorState,
}

impl Default for FragmentCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl FragmentCollector {
    /// Create an idle collector.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: CollectorState::Idle,
        }
    }

    /// Whether a fragmented stream is currently being reassembled.
    #[must_use]
    pub fn is_reassembling(&self) -> bool {
        !matches!(self.state, CollectorState::Idle)
    }

    /// Consume one frame; returns a complete message when one is ready.
    ///
    /// # Errors
    ///
    /// `WSF-MSG1` for interleaved streams, a stray `end`, a text frame
    /// inside a binary stream, or a keyword frame missing its escape.
    pub fn push(&mut self, frame: WireMessage) -> Result<Option<WireMessage>> {
        match (&mut self.state, frame) {
            (CollectorState::Idle, WireMessage::Text(s)) => {
                if s == FRAGMENTATION_START_BINARY {
                    self.state = CollectorState::Binary(Vec::new());
                    Ok(None)
                } else if s == FRAGMENTATION_START_STRING {
                    self.state = CollectorState::Text(String::new());
                    Ok(None)
                } else if s == FRAGMENTATION_END {
                    Err(stream_error("end frame without an open stream"))
                } else if starts_with_keyword(&s) {
                    Ok(Some(WireMessage::Text(strip_escape(&s)?)))
                } else {
                    Ok(Some(WireMessage::Text(s)))
                }
            }
            (CollectorState::Idle, WireMessage::Binary(bytes)) => {
                Ok(Some(WireMessage::Binary(bytes)))
            }
            (CollectorState::Binary(buffer), WireMessage::Binary(bytes)) => {
                buffer.extend_from_slice(&bytes);
                Ok(None)
            }
            (CollectorState::Binary(_), WireMessage::Text(s)) => {
                if s == FRAGMENTATION_END {
                    let CollectorState::Binary(buffer) =
                        std::mem::replace(&mut self.state, CollectorState::Idle)
                    else {
                        unreachable!("state checked above");
                    };
                    Ok(Some(WireMessage::Binary(buffer)))
                } else {
                    Err(stream_error("text frame inside a binary stream"))
                }
            }
            (CollectorState::Text(buffer), WireMessage::Text(s)) => {
                if s == FRAGMENTATION_END {
                    let CollectorState::Text(buffer) =
                        std::mem::replace(&mut self.state, CollectorState::Idle)
                    else {
                        unreachable!("state checked above");
                    };
                    Ok(Some(WireMessage::Text(buffer)))
                } else if s == FRAGMENTATION_START_BINARY || s == FRAGMENTATION_START_STRING {
                    Err(stream_error("interleaved streams are not supported"))
                } else if starts_with_keyword(&s) {
                    buffer.push_str(&strip_escape(&s)?);
                    Ok(None)
                } else {
                    buffer.push_str(&s);
                    Ok(None)
                }
            }
            (CollectorState::Text(_), WireMessage::Binary(_)) => {
                Err(stream_error("binary frame inside a text stream"))
            }
        }
    }
}

fn stream_error(message: &str) -> OneError {
    OneError::new(ErrorKind::Transport, codes::WSF_MSG1, message.to_string())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
