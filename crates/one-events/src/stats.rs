// SPDX-License-Identifier: MIT OR Apache-2.0
//! Bounded execution statistics.

use one_core::Hash;
use one_versioned::StoreEventKind;
use std::collections::{BTreeMap, VecDeque};

/// One handler invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionSample {
    /// Invocation start, epoch milliseconds.
    pub started_ms: i64,
    /// Invocation end, epoch milliseconds.
    pub finished_ms: i64,
    /// Whether the handler returned an error.
    pub failed: bool,
}

/// One fully dispatched event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessedEvent {
    /// The event's kind.
    pub kind: StoreEventKind,
    /// The stored file's content hash.
    pub hash: Hash,
    /// When dispatch finished, epoch milliseconds.
    pub finished_ms: i64,
}

/// Snapshot of dispatcher statistics.
#[derive(Debug, Clone, Default)]
pub struct DispatcherStats {
    /// Events fully dispatched.
    pub total_processed: u64,
    /// Events dropped by enqueue filtering.
    pub total_dropped: u64,
    /// Events currently waiting in the queue.
    pub queue_length: usize,
    /// Bounded recent samples per handler ID.
    pub per_handler: BTreeMap<u64, Vec<ExecutionSample>>,
    /// Bounded history of processed events, oldest first.
    pub recent: Vec<ProcessedEvent>,
}

/// Mutable statistics state behind the dispatcher's lock.
#[derive(Debug, Default)]
pub(crate) struct StatsState {
    pub total_processed: u64,
    pub total_dropped: u64,
    per_handler: BTreeMap<u64, VecDeque<ExecutionSample>>,
    recent: VecDeque<ProcessedEvent>,
}

impl StatsState {
    /// Record a handler invocation, keeping at most `max` samples
    /// (`-1` keeps everything).
    pub fn record_sample(&mut self, handler: u64, sample: ExecutionSample, max: i64) {
        let samples = self.per_handler.entry(handler).or_default();
        samples.push_back(sample);
        if max >= 0 {
            while samples.len() > max as usize {
                samples.pop_front();
            }
        }
    }

    /// Record a fully dispatched event, keeping at most `max` entries
    /// (`-1` keeps everything).
    pub fn record_processed(&mut self, event: ProcessedEvent, max: i64) {
        self.total_processed += 1;
        self.recent.push_back(event);
        if max >= 0 {
            while self.recent.len() > max as usize {
                self.recent.pop_front();
            }
        }
    }

    /// Remove a deregistered handler's samples.
    pub fn forget_handler(&mut self, handler: u64) {
        self.per_handler.remove(&handler);
    }

    pub fn snapshot(&self, queue_length: usize) -> DispatcherStats {
        DispatcherStats {
            total_processed: self.total_processed,
            total_dropped: self.total_dropped,
            queue_length,
            per_handler: self
                .per_handler
                .iter()
                .map(|(id, samples)| (*id, samples.iter().copied().collect()))
                .collect(),
            recent: self.recent.iter().copied().collect(),
        }
    }
}
