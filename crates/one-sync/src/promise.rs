// SPDX-License-Identifier: MIT OR Apache-2.0
//! Shareable settle-once promise handles.
//!
//! A [`TrackingPromise`] is a future value plus `resolve`/`reject` exposed
//! to external producers. Any number of consumers may await the same
//! handle; the first settle wins and later settles are no-ops. A rejection
//! nobody awaits is simply dropped with the handle — there is no ambient
//! unhandled-rejection machinery to feed.

use one_error::{OneError, Result};
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::Notify;

/// A settle-once value shared between producer and consumers.
pub struct TrackingPromise<T> {
    inner: Arc<PromiseInner<T>>,
}

struct PromiseInner<T> {
    state: StdMutex<Option<Result<T>>>,
    notify: Notify,
}

impl<T> Clone for TrackingPromise<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Default for TrackingPromise<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> TrackingPromise<T> {
    /// Create an unsettled promise.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(PromiseInner {
                state: StdMutex::new(None),
                notify: Notify::new(),
            }),
        }
    }

    /// Settle with a value. Returns `false` if already settled.
    pub fn resolve(&self, value: T) -> bool {
        self.settle(Ok(value))
    }

    /// Settle with an error. Returns `false` if already settled.
    pub fn reject(&self, err: OneError) -> bool {
        self.settle(Err(err))
    }

    fn settle(&self, outcome: Result<T>) -> bool {
        let mut state = self.inner.state.lock().expect("promise state poisoned");
        if state.is_some() {
            return false;
        }
        *state = Some(outcome);
        drop(state);
        self.inner.notify.notify_waiters();
        true
    }

    /// Whether the promise has been settled.
    #[must_use]
    pub fn is_settled(&self) -> bool {
        self.inner
            .state
            .lock()
            .expect("promise state poisoned")
            .is_some()
    }
}

impl<T: Clone> TrackingPromise<T> {
    /// Await the settled outcome. Resolves immediately if already settled.
    pub async fn wait(&self) -> Result<T> {
        loop {
            let notified = self.inner.notify.notified();
            {
                let state = self.inner.state.lock().expect("promise state poisoned");
                if let Some(outcome) = state.as_ref() {
                    return outcome.clone();
                }
            }
            notified.await;
        }
    }
}

impl<T> std::fmt::Debug for TrackingPromise<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrackingPromise")
            .field("settled", &self.is_settled())
            .finish()
    }
}
