// SPDX-License-Identifier: MIT OR Apache-2.0
//! Request/response matching and service dispatch.
//!
//! Outgoing calls carry a monotonically increasing request ID; a pending
//! map holds the tracking promise each response settles. Incoming traffic
//! is either a response (`{id, result | error}`) or a service invocation
//! (`{id, type, args}`) dispatched to a function registered under the
//! numeric method code. Remote failures reject the local promise wrapped
//! in the stable `WSRQ-JRMH1` envelope with the original as `cause`.

use crate::fragment::{DEFAULT_CHUNK_SIZE, FragmentCollector, encode_fragments};
use crate::transport::{MessageTransport, TransportEvent, WireMessage};
use one_error::{ErrorCause, ErrorKind, OneError, Result, codes};
use one_sync::TrackingPromise;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Request envelope: `{id, type, args}`.
#[derive(Debug, Serialize, Deserialize)]
struct RequestEnvelope {
    id: u64,
    #[serde(rename = "type")]
    type_code: u32,
    args: Vec<Value>,
}

/// Response envelope: `{id, result}` or `{id, error}`.
#[derive(Debug, Serialize, Deserialize)]
struct ResponseEnvelope {
    id: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<ErrorCause>,
}

/// Observable counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PromisifierStats {
    /// Requests sent by this side.
    pub requests_sent_total: u64,
    /// Service invocations received.
    pub requests_received_total: u64,
    /// Incoming messages that were not valid envelopes.
    pub requests_received_invalid: u64,
}

type ServiceFuture = Pin<Box<dyn Future<Output = std::result::Result<Value, ErrorCause>> + Send>>;
type ServiceFn = Arc<dyn Fn(Vec<Value>) -> ServiceFuture + Send + Sync>;

/// Promise-based RPC endpoint over a [`MessageTransport`].
///
/// Cloning is cheap; clones share the pending map and service table.
#[derive(Clone)]
pub struct Promisifier {
    inner: Arc<Inner>,
}

struct Inner {
    transport: Arc<dyn MessageTransport>,
    chunk_size: usize,
    pending: StdMutex<HashMap<u64, TrackingPromise<Value>>>,
    services: StdMutex<HashMap<u32, ServiceFn>>,
    next_id: AtomicU64,
    closed: AtomicBool,
    requests_sent_total: AtomicU64,
    requests_received_total: AtomicU64,
    requests_received_invalid: AtomicU64,
}

impl Promisifier {
    /// Build an endpoint over a transport and its event stream, with the
    /// default chunk size.
    #[must_use]
    pub fn new(
        transport: Arc<dyn MessageTransport>,
        events: mpsc::UnboundedReceiver<TransportEvent>,
    ) -> Self {
        Self::with_chunk_size(transport, events, DEFAULT_CHUNK_SIZE)
    }

    /// Build an endpoint with an explicit fragmentation chunk size.
    #[must_use]
    pub fn with_chunk_size(
        transport: Arc<dyn MessageTransport>,
        mut events: mpsc::UnboundedReceiver<TransportEvent>,
        chunk_size: usize,
    ) -> Self {
        let inner = Arc::new(Inner {
            transport,
            chunk_size,
            pending: StdMutex::new(HashMap::new()),
            services: StdMutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            closed: AtomicBool::new(false),
            requests_sent_total: AtomicU64::new(0),
            requests_received_total: AtomicU64::new(0),
            requests_received_invalid: AtomicU64::new(0),
        });
        let pump = Arc::clone(&inner);
        tokio::spawn(async move {
            let mut collector = FragmentCollector::new();
            loop {
                match events.recv().await {
                    Some(TransportEvent::Message(frame)) => match collector.push(frame) {
                        Ok(Some(message)) => handle_message(&pump, message),
                        Ok(None) => {}
                        Err(e) => {
                            pump.requests_received_invalid.fetch_add(1, Ordering::SeqCst);
                            warn!(code = e.code(), "dropping malformed frame: {e}");
                        }
                    },
                    Some(TransportEvent::Closed { code, reason }) => {
                        pump.on_close(code, reason.as_deref());
                        break;
                    }
                    // Channel gone without a close event: same outcome.
                    None => {
                        pump.on_close(1006, None);
                        break;
                    }
                }
            }
        });
        Self { inner }
    }

    /// Register a service function under a numeric method code.
    ///
    /// A later registration under the same code replaces the earlier one.
    pub fn add_service<F, Fut>(&self, code: u32, service: F)
    where
        F: Fn(Vec<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<Value, ErrorCause>> + Send + 'static,
    {
        let wrapped: ServiceFn = Arc::new(move |args| Box::pin(service(args)) as ServiceFuture);
        self.inner
            .services
            .lock()
            .expect("service table poisoned")
            .insert(code, wrapped);
    }

    /// Remove a service function.
    pub fn remove_service(&self, code: u32) {
        self.inner
            .services
            .lock()
            .expect("service table poisoned")
            .remove(&code);
    }

    /// Remove all service functions.
    pub fn clear_services(&self) {
        self.inner
            .services
            .lock()
            .expect("service table poisoned")
            .clear();
    }

    /// Invoke the remote service registered under `type_code`.
    ///
    /// # Errors
    ///
    /// `WSRQ-JRMH1` when the remote function fails (original error in
    /// `cause`), `WS-CLOSE` when the transport closes before the response.
    pub async fn call(&self, type_code: u32, args: Vec<Value>) -> Result<Value> {
        if self.inner.closed.load(Ordering::SeqCst) {
            return Err(close_rejection(None));
        }
        let id = self.inner.next_id.fetch_add(1, Ordering::SeqCst);
        let promise = TrackingPromise::new();
        self.inner
            .pending
            .lock()
            .expect("pending map poisoned")
            .insert(id, promise.clone());

        let envelope = RequestEnvelope {
            id,
            type_code,
            args,
        };
        let send_result = self.inner.send_json(&envelope).await;
        if let Err(e) = send_result {
            self.inner.pending.lock().expect("pending map poisoned").remove(&id);
            return Err(e);
        }
        self.inner.requests_sent_total.fetch_add(1, Ordering::SeqCst);
        debug!(id, type_code, "request sent");

        let outcome = promise.wait().await;
        self.inner.pending.lock().expect("pending map poisoned").remove(&id);
        outcome
    }

    /// Close the underlying transport.
    ///
    /// # Errors
    ///
    /// Whatever the transport's close reports.
    pub async fn close(&self, code: u16, reason: Option<String>) -> Result<()> {
        self.inner.transport.close(code, reason).await
    }

    /// Snapshot of the observable counters.
    #[must_use]
    pub fn stats(&self) -> PromisifierStats {
        PromisifierStats {
            requests_sent_total: self.inner.requests_sent_total.load(Ordering::SeqCst),
            requests_received_total: self.inner.requests_received_total.load(Ordering::SeqCst),
            requests_received_invalid: self.inner.requests_received_invalid.load(Ordering::SeqCst),
        }
    }

    /// Number of requests awaiting a response.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.inner.pending.lock().expect("pending map poisoned").len()
    }
}

fn handle_message(inner: &Arc<Inner>, message: WireMessage) {
    let WireMessage::Text(text) = message else {
        inner.requests_received_invalid.fetch_add(1, Ordering::SeqCst);
        return;
    };
    let Ok(value) = serde_json::from_str::<Value>(&text) else {
        inner.requests_received_invalid.fetch_add(1, Ordering::SeqCst);
        return;
    };
    let is_request = value.get("type").is_some() && value.get("args").is_some();
    if is_request {
        match serde_json::from_value::<RequestEnvelope>(value) {
            Ok(request) => handle_request(inner, request),
            Err(_) => {
                inner.requests_received_invalid.fetch_add(1, Ordering::SeqCst);
            }
        }
        return;
    }
    match serde_json::from_value::<ResponseEnvelope>(value) {
        Ok(response) => inner.handle_response(response),
        Err(_) => {
            inner.requests_received_invalid.fetch_add(1, Ordering::SeqCst);
        }
    }
}

fn handle_request(inner: &Arc<Inner>, request: RequestEnvelope) {
    inner.requests_received_total.fetch_add(1, Ordering::SeqCst);
    let service = inner
        .services
        .lock()
        .expect("service table poisoned")
        .get(&request.type_code)
        .cloned();
    {
        let inner = Arc::clone(inner);
        // Each invocation runs as its own task, so responses from slow and
        // fast services interleave freely under their distinct IDs.
        tokio::spawn(async move {
            let response = match service {
                Some(service) => match service(request.args).await {
                    Ok(result) => ResponseEnvelope {
                        id: request.id,
                        result: Some(result),
                        error: None,
                    },
                    Err(cause) => ResponseEnvelope {
                        id: request.id,
                        result: None,
                        error: Some(cause),
                    },
                },
                None => ResponseEnvelope {
                    id: request.id,
                    result: None,
                    error: Some(ErrorCause {
                        name: ErrorKind::Transport.name().to_string(),
                        message: format!(
                            "{}: no service registered for code {}",
                            codes::WSP_MSG2,
                            request.type_code
                        ),
                        code: Some(codes::WSP_MSG2.to_string()),
                    }),
                },
            };
            if let Err(e) = inner.send_json(&response).await {
                warn!(id = request.id, "failed to send response: {e}");
            }
        });
    }
}

impl Inner {
    fn handle_response(&self, response: ResponseEnvelope) {
        let promise = self
            .pending
            .lock()
            .expect("pending map poisoned")
            .remove(&response.id);
        let Some(promise) = promise else {
            self.requests_received_invalid.fetch_add(1, Ordering::SeqCst);
            return;
        };
        match (response.result, response.error) {
            (Some(result), None) => {
                promise.resolve(result);
            }
            (None, Some(cause)) => {
                promise.reject(
                    OneError::new(
                        ErrorKind::Remote,
                        codes::WSRQ_JRMH1,
                        "Remote websocket function returned an error (see \"cause\" property)",
                    )
                    .with_cause(cause),
                );
            }
            _ => {
                self.requests_received_invalid.fetch_add(1, Ordering::SeqCst);
                promise.reject(OneError::new(
                    ErrorKind::Transport,
                    codes::WSP_MSG1,
                    "response envelope carries neither result nor error",
                ));
            }
        }
    }

    async fn send_json(&self, payload: &impl Serialize) -> Result<()> {
        let text = serde_json::to_string(payload).map_err(|e| {
            OneError::new(
                ErrorKind::Transport,
                codes::WSP_MSG1,
                "unserializable envelope",
            )
            .with_source(e)
        })?;
        for frame in encode_fragments(WireMessage::Text(text), self.chunk_size) {
            self.transport.send(frame).await?;
        }
        Ok(())
    }

    fn on_close(&self, code: u16, reason: Option<&str>) {
        self.closed.store(true, Ordering::SeqCst);
        let pending: Vec<TrackingPromise<Value>> = {
            let mut map = self.pending.lock().expect("pending map poisoned");
            map.drain().map(|(_, promise)| promise).collect()
        };
        debug!(code, rejected = pending.len(), "transport closed");
        for promise in pending {
            promise.reject(close_rejection(reason));
        }
    }
}

fn close_rejection(reason: Option<&str>) -> OneError {
    let message = match reason {
        Some(reason) => format!("connection closed: {reason}"),
        None => "connection closed".to_string(),
    };
    OneError::new(ErrorKind::Transport, codes::WS_CLOSE, message)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
