// SPDX-License-Identifier: MIT OR Apache-2.0
//! Unified error taxonomy with stable error codes for the ONE object store.
//!
//! Every error carries a machine-readable, stable `code` string (e.g.
//! `"O2M-RTYC1"`, `"SB-READ2"`, `"WSRQ-JRMH1"`), an [`ErrorKind`] naming the
//! broad failure family, a human-readable message, an optional source error
//! for cause-chaining, and an optional serializable remote cause. Codes are
//! part of the public contract and never change across releases; messages
//! are informational only.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, OneError>;

// ---------------------------------------------------------------------------
// ErrorKind
// ---------------------------------------------------------------------------

/// Broad failure family an error belongs to.
///
/// Kinds classify errors for handling policy (retry, surface, convert);
/// the `code` string identifies the precise site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// A referenced file (object, BLOB, CLOB, vhead, rmap, private) is absent.
    FileNotFound,
    /// An exclusive create hit an existing path.
    AlreadyExists,
    /// A value does not match the type its recipe rule declares.
    TypeMismatch,
    /// A non-optional (or ID) rule has no value.
    RuleMissingValue,
    /// A reference field holds something that is not a hash.
    BadReference,
    /// An object carries a property no recipe rule names.
    SuperfluousProperty,
    /// An ID hash was requested for a type without ID rules.
    NoIdRules,
    /// A recipe lookup was made for an unregistered type.
    UnknownType,
    /// Recipe registration or inheritance resolution failed.
    RecipeViolation,
    /// The canonical stringifier met an unencodable value.
    Canonicalization,
    /// Microdata deviates from the canonical shape.
    Parse,
    /// A deadline elapsed (the inner operation is not cancelled).
    Timeout,
    /// A blocking-queue capacity or cancellation condition.
    Queue,
    /// A named-serializer fault.
    Serializer,
    /// Transport-level failure (close, malformed frame, bad envelope).
    Transport,
    /// An error raised by a service function on the remote side.
    Remote,
    /// Stored data fails an integrity check (hash or ID mismatch).
    Integrity,
    /// Unexpected filesystem error other than not-found / already-exists.
    FatalStorage,
}

impl ErrorKind {
    /// Stable error name in the source contract's style
    /// (e.g. `"FileNotFoundError"`, `"WebsocketRequestError"`).
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::FileNotFound => "FileNotFoundError",
            Self::AlreadyExists => "FileExistsError",
            Self::TypeMismatch => "TypeMismatchError",
            Self::RuleMissingValue => "RuleMissingValueError",
            Self::BadReference => "BadReferenceError",
            Self::SuperfluousProperty => "SuperfluousPropertyError",
            Self::NoIdRules => "NoIdRulesError",
            Self::UnknownType => "UnknownTypeError",
            Self::RecipeViolation => "RecipeViolationError",
            Self::Canonicalization => "CanonicalizationError",
            Self::Parse => "MicrodataParseError",
            Self::Timeout => "TimeoutError",
            Self::Queue => "QueueError",
            Self::Serializer => "SerializerError",
            Self::Transport => "TransportError",
            Self::Remote => "WebsocketRequestError",
            Self::Integrity => "IntegrityError",
            Self::FatalStorage => "FatalStorageError",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ---------------------------------------------------------------------------
// Stable codes
// ---------------------------------------------------------------------------

/// The stable error codes. Consumers match on these, never on messages.
pub mod codes {
    /// Value does not match the declared `ValueType`.
    pub const O2M_RTYC1: &str = "O2M-RTYC1";
    /// Non-optional (or ID) rule has no value.
    pub const O2M_RTYC2: &str = "O2M-RTYC2";
    /// Object carries a property no rule names.
    pub const O2M_RTYC3: &str = "O2M-RTYC3";
    /// Reference field holds a non-hash (including an imploded inline object).
    pub const O2M_RTYC4: &str = "O2M-RTYC4";
    /// ID hash requested for a type with no ID rules.
    pub const O2M_RTYC5: &str = "O2M-RTYC5";
    /// Canonical stringification failed (depth guard / unencodable value).
    pub const O2M_CNV1: &str = "O2M-CNV1";
    /// Recipe lookup for an unregistered type.
    pub const OR_UNKN1: &str = "OR-UNKN1";
    /// Duplicate recipe registration.
    pub const OR_DUP1: &str = "OR-DUP1";
    /// Unresolvable or circular rule inheritance chain.
    pub const OR_INH1: &str = "OR-INH1";
    /// Microdata deviates from the canonical shape.
    pub const M2O_PARSE1: &str = "M2O-PARSE1";
    /// Decoded value violates the recipe.
    pub const M2O_PARSE2: &str = "M2O-PARSE2";
    /// Invalid storage init options.
    pub const SB_INIT1: &str = "SB-INIT1";
    /// Missing vhead / rmap / private file.
    pub const SB_READ1: &str = "SB-READ1";
    /// Missing object / BLOB / CLOB file.
    pub const SB_READ2: &str = "SB-READ2";
    /// Rename target directory vanished mid-write.
    pub const SB_WRITE1: &str = "SB-WRITE1";
    /// Exclusive create of an existing `private/` file.
    pub const SB_WRITE2: &str = "SB-WRITE2";
    /// Stored file's content hash does not match its name.
    pub const SB_SCAN1: &str = "SB-SCAN1";
    /// Unexpected filesystem error other than not-found / already-exists.
    pub const SB_IO1: &str = "SB-IO1";
    /// Named-serializer internal fault.
    pub const USS_SER1: &str = "USS-SER1";
    /// `max_queue_length` exceeded.
    pub const USS_QUEUE1: &str = "USS-QUEUE1";
    /// `max_pending_promises` exceeded.
    pub const USS_QUEUE2: &str = "USS-QUEUE2";
    /// Waiter cancelled via `cancel_pending_promises`.
    pub const USS_QUEUE3: &str = "USS-QUEUE3";
    /// `timeout(0, …)` rejected outright.
    pub const USS_TO1: &str = "USS-TO1";
    /// Deadline elapsed.
    pub const USS_TO2: &str = "USS-TO2";
    /// Dispatcher pause called while already paused.
    pub const OED_PAUSE1: &str = "OED-PAUSE1";
    /// Materialized ID object does not reproduce the requested ID hash.
    pub const VOB_IDO1: &str = "VOB-IDO1";
    /// Malformed version-head or reverse-map line.
    pub const VOB_LINE1: &str = "VOB-LINE1";
    /// Malformed or interleaved fragmentation frame.
    pub const WSF_MSG1: &str = "WSF-MSG1";
    /// Malformed request/response envelope.
    pub const WSP_MSG1: &str = "WSP-MSG1";
    /// Unknown service code.
    pub const WSP_MSG2: &str = "WSP-MSG2";
    /// Remote service function returned an error.
    pub const WSRQ_JRMH1: &str = "WSRQ-JRMH1";
    /// Transport closed with requests pending.
    pub const WS_CLOSE: &str = "WS-CLOSE";
}

// ---------------------------------------------------------------------------
// ErrorCause
// ---------------------------------------------------------------------------

/// Serializable cause attached to errors that cross a wire boundary.
///
/// When a remote service function throws, the local error wraps the remote
/// error's identity here instead of in the opaque `source` chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorCause {
    /// Error name on the remote side (e.g. `"Error"`).
    pub name: String,
    /// Remote error message.
    pub message: String,
    /// Remote stable code, if the remote error carried one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl ErrorCause {
    /// A plain error with the generic `"Error"` name and no code — the
    /// shape an untyped remote failure travels in.
    #[must_use]
    pub fn plain(message: impl Into<String>) -> Self {
        Self {
            name: "Error".into(),
            message: message.into(),
            code: None,
        }
    }
}

impl From<&OneError> for ErrorCause {
    fn from(err: &OneError) -> Self {
        Self {
            name: err.name().to_string(),
            message: err.message(),
            code: Some(err.code().to_string()),
        }
    }
}

// ---------------------------------------------------------------------------
// OneError
// ---------------------------------------------------------------------------

/// Unified error for the ONE object store.
///
/// `Display` renders `"<CODE>: <message>"` so the stable code always leads
/// the user-visible text.
///
/// # Builder usage
///
/// ```
/// use one_error::{codes, ErrorKind, OneError};
///
/// let err = OneError::new(ErrorKind::FileNotFound, codes::SB_READ2, "no object file")
///     .with_cause_name("ENOENT");
/// assert_eq!(err.to_string(), "SB-READ2: no object file");
/// assert_eq!(err.code(), "SB-READ2");
/// ```
#[derive(Clone)]
pub struct OneError {
    kind: ErrorKind,
    code: &'static str,
    message: String,
    source: Option<Arc<dyn std::error::Error + Send + Sync>>,
    cause: Option<ErrorCause>,
}

impl OneError {
    /// Create a new error with the given kind, stable code, and message.
    pub fn new(kind: ErrorKind, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            kind,
            code,
            message: message.into(),
            source: None,
            cause: None,
        }
    }

    /// Attach an underlying cause for `std::error::Error::source` chaining.
    #[must_use]
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Arc::new(source));
        self
    }

    /// Attach a serializable remote cause.
    #[must_use]
    pub fn with_cause(mut self, cause: ErrorCause) -> Self {
        self.cause = Some(cause);
        self
    }

    /// Attach a cause that is only a name (e.g. an OS error code).
    #[must_use]
    pub fn with_cause_name(self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.with_cause(ErrorCause {
            name,
            message: String::new(),
            code: None,
        })
    }

    /// The broad failure family.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// The stable machine-readable code.
    #[must_use]
    pub fn code(&self) -> &'static str {
        self.code
    }

    /// The message with the stable code prefixed, exactly as `Display`
    /// renders it.
    #[must_use]
    pub fn message(&self) -> String {
        format!("{}: {}", self.code, self.message)
    }

    /// The stable error name (e.g. `"WebsocketRequestError"`).
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.kind.name()
    }

    /// The serializable cause, if one was attached.
    #[must_use]
    pub fn cause(&self) -> Option<&ErrorCause> {
        self.cause.as_ref()
    }
}

impl fmt::Debug for OneError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut d = f.debug_struct("OneError");
        d.field("kind", &self.kind);
        d.field("code", &self.code);
        d.field("message", &self.message);
        if let Some(ref src) = self.source {
            d.field("source", &src.to_string());
        }
        if let Some(ref cause) = self.cause {
            d.field("cause", cause);
        }
        d.finish()
    }
}

impl fmt::Display for OneError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for OneError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

// ---------------------------------------------------------------------------
// Serialization support
// ---------------------------------------------------------------------------

/// Serializable snapshot of a [`OneError`] (without the opaque source).
///
/// This is the shape that travels in RPC error envelopes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OneErrorDto {
    /// Stable error name.
    pub name: String,
    /// Human-readable message (code-prefixed).
    pub message: String,
    /// Stable machine-readable code.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// Remote cause, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cause: Option<ErrorCause>,
}

impl From<&OneError> for OneErrorDto {
    fn from(err: &OneError) -> Self {
        Self {
            name: err.name().to_string(),
            message: err.message(),
            code: Some(err.code().to_string()),
            cause: err.cause.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn basic_construction() {
        let err = OneError::new(ErrorKind::FatalStorage, codes::SB_WRITE1, "boom");
        assert_eq!(err.kind(), ErrorKind::FatalStorage);
        assert_eq!(err.code(), "SB-WRITE1");
        assert!(err.cause().is_none());
    }

    #[test]
    fn display_leads_with_code() {
        let err = OneError::new(ErrorKind::FileNotFound, codes::SB_READ2, "no such object");
        assert_eq!(err.to_string(), "SB-READ2: no such object");
        assert_eq!(err.message(), "SB-READ2: no such object");
    }

    #[test]
    fn kind_names_are_stable() {
        assert_eq!(ErrorKind::FileNotFound.name(), "FileNotFoundError");
        assert_eq!(ErrorKind::Remote.name(), "WebsocketRequestError");
        assert_eq!(ErrorKind::Timeout.name(), "TimeoutError");
    }

    #[test]
    fn remote_error_envelope_shape() {
        let err = OneError::new(
            ErrorKind::Remote,
            codes::WSRQ_JRMH1,
            "Remote websocket function returned an error (see \"cause\" property)",
        )
        .with_cause(ErrorCause {
            name: "Error".into(),
            message: "Something is very wrong".into(),
            code: None,
        });

        assert_eq!(err.name(), "WebsocketRequestError");
        assert_eq!(err.code(), "WSRQ-JRMH1");
        assert_eq!(
            err.message(),
            "WSRQ-JRMH1: Remote websocket function returned an error (see \"cause\" property)"
        );
        let cause = err.cause().unwrap();
        assert_eq!(cause.name, "Error");
        assert_eq!(cause.message, "Something is very wrong");
    }

    #[test]
    fn source_chain_preserved() {
        let inner = io::Error::new(io::ErrorKind::NotFound, "not found");
        let err =
            OneError::new(ErrorKind::FileNotFound, codes::SB_READ1, "read failed").with_source(inner);
        let src = std::error::Error::source(&err).unwrap();
        assert_eq!(src.to_string(), "not found");
    }

    #[test]
    fn errors_are_cloneable() {
        let inner = io::Error::other("underlying");
        let err = OneError::new(ErrorKind::FatalStorage, codes::SB_WRITE1, "x").with_source(inner);
        let clone = err.clone();
        assert_eq!(clone.code(), err.code());
        assert!(std::error::Error::source(&clone).is_some());
    }

    #[test]
    fn dto_roundtrip() {
        let err = OneError::new(ErrorKind::Remote, codes::WSRQ_JRMH1, "remote failed").with_cause(
            ErrorCause {
                name: "Error".into(),
                message: "bad".into(),
                code: Some("X-1".into()),
            },
        );
        let dto: OneErrorDto = (&err).into();
        let json = serde_json::to_string(&dto).unwrap();
        let back: OneErrorDto = serde_json::from_str(&json).unwrap();
        assert_eq!(dto, back);
        assert_eq!(back.code.as_deref(), Some("WSRQ-JRMH1"));
    }

    #[test]
    fn codes_are_verbatim() {
        assert_eq!(codes::O2M_RTYC1, "O2M-RTYC1");
        assert_eq!(codes::O2M_RTYC4, "O2M-RTYC4");
        assert_eq!(codes::SB_READ2, "SB-READ2");
        assert_eq!(codes::WSRQ_JRMH1, "WSRQ-JRMH1");
        assert_eq!(codes::WS_CLOSE, "WS-CLOSE");
    }
}
