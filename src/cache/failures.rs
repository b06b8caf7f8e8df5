//! Failed Flush Log
//!
//! Durable writes that were rejected are kept here so they can be inspected
//! after the fact instead of disappearing with the timer that issued them.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;

use crate::entity::EntityKey;

/// What triggered the durable write that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FlushTrigger {
    /// The flush timer fired
    Timer,
    /// A caller asked for an immediate flush
    Explicit,
    /// The entry was about to be evicted or re-read with a write outstanding
    WriteThrough,
    /// Pending writes were drained, usually at shutdown
    Drain,
}

/// One rejected durable write.
#[derive(Debug, Clone, Serialize)]
pub struct FailedFlush {
    pub key: EntityKey,
    pub statement: String,
    pub error: String,
    pub trigger: FlushTrigger,
    pub failed_at: DateTime<Utc>,
}

/// Bounded log of failed flushes; the oldest record is dropped once full.
#[derive(Debug)]
pub struct FailedFlushLog {
    entries: Mutex<VecDeque<FailedFlush>>,
    capacity: usize,
}

impl FailedFlushLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
            capacity: capacity.max(1),
        }
    }

    pub fn record(&self, failure: FailedFlush) {
        let mut entries = self.entries.lock();
        if entries.len() == self.capacity {
            entries.pop_front();
        }
        entries.push_back(failure);
    }

    /// Returns the retained failures, oldest first.
    pub fn snapshot(&self) -> Vec<FailedFlush> {
        self.entries.lock().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
