// SPDX-License-Identifier: MIT OR Apache-2.0
//! The dispatcher loop and its registration API.
//!
//! Exactly one dispatch task is active per dispatcher. It removes events in
//! `(priority, FIFO)` order and awaits matching handlers one after another,
//! so the side effects of handler *i* are visible to handler *i+1* for the
//! same event. `pause` gates between dequeue and dispatch — events keep
//! arriving and enqueueing while paused.

use crate::filter::EventFilter;
use crate::stats::{DispatcherStats, ExecutionSample, ProcessedEvent, StatsState};
use chrono::Utc;
use one_error::{ErrorKind, OneError, Result, codes};
use one_sync::{BlockingPriorityQueue, QueueOptions};
use one_versioned::StoreEvent;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::{Notify, broadcast};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Dispatcher tuning knobs.
#[derive(Debug, Clone, Copy)]
pub struct DispatcherOptions {
    /// Drop events at enqueue time when no registered handler matches.
    pub enable_enqueue_filtering: bool,
    /// Bound on the processed-event history (`-1` = unbounded).
    pub max_processed_object_count: i64,
    /// Bound on per-handler execution samples (`-1` = unbounded).
    pub max_execution_statistics_per_handler: i64,
    /// Priority assigned when no priority function is installed.
    /// Lower values dispatch first.
    pub default_priority: u32,
}

impl Default for DispatcherOptions {
    fn default() -> Self {
        Self {
            enable_enqueue_filtering: false,
            max_processed_object_count: 1000,
            max_execution_statistics_per_handler: 100,
            default_priority: 100,
        }
    }
}

/// Token returned by [`ObjectEventDispatcher::register`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

type HandlerFuture = Pin<Box<dyn Future<Output = Result<()>> + Send>>;
type HandlerFn = Arc<dyn Fn(Arc<StoreEvent>) -> HandlerFuture + Send + Sync>;
type PriorityFn = Arc<dyn Fn(&StoreEvent) -> u32 + Send + Sync>;
type ErrorFn = Arc<dyn Fn(&OneError) + Send + Sync>;

#[derive(Clone)]
struct HandlerEntry {
    id: u64,
    filter: EventFilter,
    handler: HandlerFn,
}

/// The object-event dispatcher.
///
/// Cloning is cheap; clones share the loop, queue, and handler table.
#[derive(Clone)]
pub struct ObjectEventDispatcher {
    inner: Arc<Inner>,
}

struct Inner {
    options: DispatcherOptions,
    queue: BlockingPriorityQueue<Arc<StoreEvent>>,
    handlers: StdMutex<Vec<HandlerEntry>>,
    next_id: AtomicU64,
    paused: StdMutex<bool>,
    resume: Notify,
    stopped: AtomicBool,
    priority_fn: StdMutex<Option<PriorityFn>>,
    on_error: StdMutex<Option<ErrorFn>>,
    stats: StdMutex<StatsState>,
    forwarders: StdMutex<Vec<JoinHandle<()>>>,
    dispatch_task: StdMutex<Option<JoinHandle<()>>>,
}

impl ObjectEventDispatcher {
    /// Create a dispatcher and start its dispatch loop.
    #[must_use]
    pub fn new(options: DispatcherOptions) -> Self {
        let inner = Arc::new(Inner {
            options,
            queue: BlockingPriorityQueue::new(QueueOptions::default()),
            handlers: StdMutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
            paused: StdMutex::new(false),
            resume: Notify::new(),
            stopped: AtomicBool::new(false),
            priority_fn: StdMutex::new(None),
            on_error: StdMutex::new(None),
            stats: StdMutex::new(StatsState::default()),
            forwarders: StdMutex::new(Vec::new()),
            dispatch_task: StdMutex::new(None),
        });
        let task = tokio::spawn(dispatch_loop(Arc::clone(&inner)));
        *inner.dispatch_task.lock().expect("dispatcher state poisoned") = Some(task);
        Self { inner }
    }

    /// Feed this dispatcher from a store's event subscription.
    ///
    /// May be called multiple times to connect several stores.
    pub fn connect(&self, mut receiver: broadcast::Receiver<Arc<StoreEvent>>) {
        let inner = Arc::clone(&self.inner);
        let task = tokio::spawn(async move {
            loop {
                match receiver.recv().await {
                    Ok(event) => inner.enqueue(event),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "event forwarder lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
        self.inner
            .forwarders
            .lock()
            .expect("dispatcher state poisoned")
            .push(task);
    }

    /// Register a handler for events matching `filter`.
    ///
    /// For one event, matching handlers run sequentially in registration
    /// order.
    pub fn register<F, Fut>(&self, filter: EventFilter, handler: F) -> HandlerId
    where
        F: Fn(Arc<StoreEvent>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::SeqCst);
        let entry = HandlerEntry {
            id,
            filter,
            handler: Arc::new(move |event| Box::pin(handler(event)) as HandlerFuture),
        };
        self.inner
            .handlers
            .lock()
            .expect("dispatcher state poisoned")
            .push(entry);
        HandlerId(id)
    }

    /// Remove a handler. Its statistics are forgotten.
    pub fn deregister(&self, id: HandlerId) {
        self.inner
            .handlers
            .lock()
            .expect("dispatcher state poisoned")
            .retain(|entry| entry.id != id.0);
        self.inner
            .stats
            .lock()
            .expect("dispatcher state poisoned")
            .forget_handler(id.0);
    }

    /// Number of registered handlers.
    #[must_use]
    pub fn handler_count(&self) -> usize {
        self.inner.handlers.lock().expect("dispatcher state poisoned").len()
    }

    /// Install a priority function; lower values dispatch first.
    pub fn set_determine_priority(&self, f: impl Fn(&StoreEvent) -> u32 + Send + Sync + 'static) {
        *self.inner.priority_fn.lock().expect("dispatcher state poisoned") = Some(Arc::new(f));
    }

    /// Install the error callback handler failures are routed to.
    pub fn set_on_error(&self, f: impl Fn(&OneError) + Send + Sync + 'static) {
        *self.inner.on_error.lock().expect("dispatcher state poisoned") = Some(Arc::new(f));
    }

    /// Enqueue an event directly (the forwarders call this too).
    pub fn enqueue(&self, event: Arc<StoreEvent>) {
        self.inner.enqueue(event);
    }

    /// Gate dispatch after the next dequeue. Events keep arriving and
    /// enqueueing while paused.
    ///
    /// # Errors
    ///
    /// `OED-PAUSE1` when already paused — pause is not re-entrant.
    pub fn pause(&self) -> Result<()> {
        let mut paused = self.inner.paused.lock().expect("dispatcher state poisoned");
        if *paused {
            return Err(OneError::new(
                ErrorKind::Queue,
                codes::OED_PAUSE1,
                "dispatcher is already paused",
            ));
        }
        *paused = true;
        debug!("dispatcher paused");
        Ok(())
    }

    /// Lift a pause. A no-op when not paused.
    pub fn resume(&self) {
        *self.inner.paused.lock().expect("dispatcher state poisoned") = false;
        self.inner.resume.notify_waiters();
    }

    /// Whether the dispatcher is paused.
    #[must_use]
    pub fn is_paused(&self) -> bool {
        *self.inner.paused.lock().expect("dispatcher state poisoned")
    }

    /// Snapshot of the statistics.
    #[must_use]
    pub fn stats(&self) -> DispatcherStats {
        self.inner
            .stats
            .lock()
            .expect("dispatcher state poisoned")
            .snapshot(self.inner.queue.len())
    }

    /// Stop the dispatcher: disconnect event sources, cancel the queue
    /// waiter, lift any pause, and await the in-flight dispatch.
    pub async fn shutdown(&self) {
        self.inner.stopped.store(true, Ordering::SeqCst);
        let forwarders: Vec<JoinHandle<()>> = std::mem::take(
            &mut *self.inner.forwarders.lock().expect("dispatcher state poisoned"),
        );
        for task in forwarders {
            task.abort();
        }
        self.resume();
        self.inner.queue.cancel_pending_promises();
        let task = self
            .inner
            .dispatch_task
            .lock()
            .expect("dispatcher state poisoned")
            .take();
        if let Some(task) = task {
            let _ = task.await;
        }
        debug!("dispatcher shut down");
    }
}

impl Inner {
    fn enqueue(&self, event: Arc<StoreEvent>) {
        if self.stopped.load(Ordering::SeqCst) {
            return;
        }
        if self.options.enable_enqueue_filtering {
            let handlers = self.handlers.lock().expect("dispatcher state poisoned");
            if !handlers.iter().any(|entry| entry.filter.matches(&event)) {
                drop(handlers);
                self.stats
                    .lock()
                    .expect("dispatcher state poisoned")
                    .total_dropped += 1;
                return;
            }
        }
        let priority = {
            let priority_fn = self.priority_fn.lock().expect("dispatcher state poisoned");
            priority_fn
                .as_ref()
                .map_or(self.options.default_priority, |f| f(&event))
        };
        if let Err(e) = self.queue.add(event, priority) {
            self.emit_error(&e);
        }
    }

    fn emit_error(&self, err: &OneError) {
        let callback = self
            .on_error
            .lock()
            .expect("dispatcher state poisoned")
            .clone();
        match callback {
            Some(f) => f(err),
            None => warn!(code = err.code(), "unhandled dispatcher error: {err}"),
        }
    }

    async fn wait_if_paused(&self) {
        loop {
            let notified = self.resume.notified();
            if !*self.paused.lock().expect("dispatcher state poisoned") {
                return;
            }
            notified.await;
        }
    }
}

async fn dispatch_loop(inner: Arc<Inner>) {
    loop {
        if inner.stopped.load(Ordering::SeqCst) {
            break;
        }
        let event = match inner.queue.remove(None).await {
            Ok(event) => event,
            // Cancelled at shutdown.
            Err(_) => break,
        };
        inner.wait_if_paused().await;
        if inner.stopped.load(Ordering::SeqCst) {
            break;
        }

        let matching: Vec<HandlerEntry> = {
            let handlers = inner.handlers.lock().expect("dispatcher state poisoned");
            handlers
                .iter()
                .filter(|entry| entry.filter.matches(&event))
                .cloned()
                .collect()
        };
        for entry in matching {
            let started_ms = Utc::now().timestamp_millis();
            let result = (entry.handler)(Arc::clone(&event)).await;
            let finished_ms = Utc::now().timestamp_millis();
            let failed = result.is_err();
            if let Err(e) = result {
                inner.emit_error(&e);
            }
            inner.stats.lock().expect("dispatcher state poisoned").record_sample(
                entry.id,
                ExecutionSample {
                    started_ms,
                    finished_ms,
                    failed,
                },
                inner.options.max_execution_statistics_per_handler,
            );
        }
        inner.stats.lock().expect("dispatcher state poisoned").record_processed(
            ProcessedEvent {
                kind: event.kind,
                hash: event.hash,
                finished_ms: Utc::now().timestamp_millis(),
            },
            inner.options.max_processed_object_count,
        );
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
