// SPDX-License-Identifier: MIT OR Apache-2.0
//! Per-name FIFO execution chains.
//!
//! `run_serial("write:<hash>", fut)` guarantees that for a given name at
//! most one future runs at a time, in enqueue order. A failing future does
//! not abort queued followers — each caller gets its own future's output.
//! The chain map is garbage-collected as soon as a name has no users left.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::Mutex;

/// Coordinates at-most-one concurrent execution per string name.
///
/// Cloning is cheap; all clones share the same chain map.
#[derive(Clone, Default)]
pub struct NamedSerializer {
    chains: Arc<StdMutex<HashMap<String, ChainEntry>>>,
}

struct ChainEntry {
    lock: Arc<Mutex<()>>,
    users: usize,
}

impl NamedSerializer {
    /// Create an empty serializer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `fut` exclusively under `name`.
    ///
    /// Futures queued under the same name run in FIFO order (the underlying
    /// lock is fair); futures under different names run independently.
    pub async fn run_serial<T>(&self, name: &str, fut: impl Future<Output = T>) -> T {
        let lock = {
            let mut chains = self.chains.lock().expect("serializer chain map poisoned");
            let entry = chains.entry(name.to_string()).or_insert_with(|| ChainEntry {
                lock: Arc::new(Mutex::new(())),
                users: 0,
            });
            entry.users += 1;
            Arc::clone(&entry.lock)
        };
        // Releases the chain slot even if `fut` panics or the caller is
        // cancelled while waiting for the lock.
        let _release = ChainUser {
            chains: Arc::clone(&self.chains),
            name: name.to_string(),
        };

        let _guard = lock.lock().await;
        fut.await
    }

    /// Number of names with live chains. Empty chains are removed, so this
    /// drops back to zero once all serialized work completes.
    #[must_use]
    pub fn chain_count(&self) -> usize {
        self.chains.lock().expect("serializer chain map poisoned").len()
    }
}

struct ChainUser {
    chains: Arc<StdMutex<HashMap<String, ChainEntry>>>,
    name: String,
}

impl Drop for ChainUser {
    fn drop(&mut self) {
        let mut chains = self.chains.lock().expect("serializer chain map poisoned");
        if let Some(entry) = chains.get_mut(&self.name) {
            entry.users -= 1;
            if entry.users == 0 {
                chains.remove(&self.name);
            }
        }
    }
}

impl std::fmt::Debug for NamedSerializer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NamedSerializer")
            .field("chains", &self.chain_count())
            .finish()
    }
}
