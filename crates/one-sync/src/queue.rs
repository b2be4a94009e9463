// SPDX-License-Identifier: MIT OR Apache-2.0
//! Blocking, bounded, priority-ordered queue.
//!
//! Removal order is a stable sort by `(priority, insertion order)` — lower
//! priority values first, FIFO within a level. `remove` suspends until an
//! item arrives, the optional timeout elapses, or the waiter is cancelled
//! in bulk via [`BlockingPriorityQueue::cancel_pending_promises`].

use one_error::{ErrorKind, OneError, Result, codes};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::sync::Notify;

/// Capacity limits. Both default to unbounded.
#[derive(Debug, Clone, Copy)]
pub struct QueueOptions {
    /// Maximum number of queued items before `add` fails.
    pub max_queue_length: usize,
    /// Maximum number of concurrent `remove` waiters.
    pub max_pending_promises: usize,
}

impl Default for QueueOptions {
    fn default() -> Self {
        Self {
            max_queue_length: usize::MAX,
            max_pending_promises: usize::MAX,
        }
    }
}

/// A blocking priority queue.
///
/// Cloning is cheap; all clones share the same queue.
pub struct BlockingPriorityQueue<T> {
    inner: Arc<QueueInner<T>>,
}

impl<T> Clone for BlockingPriorityQueue<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct QueueInner<T> {
    state: StdMutex<QueueState<T>>,
    notify: Notify,
    options: QueueOptions,
}

struct QueueState<T> {
    items: VecDeque<Entry<T>>,
    pending: usize,
    cancel_epoch: u64,
}

struct Entry<T> {
    priority: u32,
    item: T,
}

impl<T> Default for BlockingPriorityQueue<T> {
    fn default() -> Self {
        Self::new(QueueOptions::default())
    }
}

impl<T> BlockingPriorityQueue<T> {
    /// Create a queue with the given capacity limits.
    #[must_use]
    pub fn new(options: QueueOptions) -> Self {
        Self {
            inner: Arc::new(QueueInner {
                state: StdMutex::new(QueueState {
                    items: VecDeque::new(),
                    pending: 0,
                    cancel_epoch: 0,
                }),
                notify: Notify::new(),
                options,
            }),
        }
    }

    /// Enqueue an item. Lower `priority` values are removed first.
    ///
    /// # Errors
    ///
    /// `USS-QUEUE1` when `max_queue_length` is reached.
    pub fn add(&self, item: T, priority: u32) -> Result<()> {
        let mut state = self.inner.state.lock().expect("queue state poisoned");
        if state.items.len() >= self.inner.options.max_queue_length {
            return Err(OneError::new(
                ErrorKind::Queue,
                codes::USS_QUEUE1,
                format!("queue is full ({} items)", state.items.len()),
            ));
        }
        // Stable: insert before the first strictly-larger priority, after
        // all equal ones.
        let pos = state
            .items
            .iter()
            .position(|e| e.priority > priority)
            .unwrap_or(state.items.len());
        state.items.insert(pos, Entry { priority, item });
        drop(state);
        self.inner.notify.notify_one();
        Ok(())
    }

    /// Remove the front item, waiting for one if the queue is empty.
    ///
    /// `wait` limits the suspension; `None` waits forever.
    ///
    /// # Errors
    ///
    /// `USS-QUEUE2` when `max_pending_promises` waiters already exist,
    /// `USS-QUEUE3` when cancelled, `USS-TO2` when the wait elapses.
    pub async fn remove(&self, wait: Option<Duration>) -> Result<T> {
        let epoch = {
            let mut state = self.inner.state.lock().expect("queue state poisoned");
            if state.pending >= self.inner.options.max_pending_promises {
                return Err(OneError::new(
                    ErrorKind::Queue,
                    codes::USS_QUEUE2,
                    format!("too many pending removals ({})", state.pending),
                ));
            }
            state.pending += 1;
            state.cancel_epoch
        };
        let _pending = PendingGuard {
            inner: Arc::clone(&self.inner),
        };

        let deadline = wait.map(|d| tokio::time::Instant::now() + d);
        loop {
            let notified = self.inner.notify.notified();
            {
                let mut state = self.inner.state.lock().expect("queue state poisoned");
                if state.cancel_epoch != epoch {
                    return Err(OneError::new(
                        ErrorKind::Queue,
                        codes::USS_QUEUE3,
                        "pending removal cancelled",
                    ));
                }
                if let Some(entry) = state.items.pop_front() {
                    if !state.items.is_empty() {
                        // Hand the wake-up on to the next waiter.
                        self.inner.notify.notify_one();
                    }
                    return Ok(entry.item);
                }
            }
            match deadline {
                None => notified.await,
                Some(deadline) => {
                    if tokio::time::timeout_at(deadline, notified).await.is_err() {
                        return Err(OneError::new(
                            ErrorKind::Timeout,
                            codes::USS_TO2,
                            "queue removal timed out",
                        ));
                    }
                }
            }
        }
    }

    /// Reject every pending `remove` with `USS-QUEUE3`. Queued items stay.
    pub fn cancel_pending_promises(&self) {
        {
            let mut state = self.inner.state.lock().expect("queue state poisoned");
            state.cancel_epoch += 1;
        }
        self.inner.notify.notify_waiters();
    }

    /// Number of queued items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.state.lock().expect("queue state poisoned").items.len()
    }

    /// Whether the queue holds no items.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of suspended `remove` calls.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.inner.state.lock().expect("queue state poisoned").pending
    }
}

struct PendingGuard<T> {
    inner: Arc<QueueInner<T>>,
}

impl<T> Drop for PendingGuard<T> {
    fn drop(&mut self) {
        let mut state = self.inner.state.lock().expect("queue state poisoned");
        state.pending -= 1;
    }
}

impl<T> std::fmt::Debug for BlockingPriorityQueue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockingPriorityQueue")
            .field("len", &self.len())
            .field("pending", &self.pending_count())
            .finish()
    }
}
