//! Access order for the bounded in-memory cache store.
//!
//! Every touch stamps the key with a fresh tick; the smallest tick is the
//! least recently used entry.

use std::collections::{BTreeMap, HashMap};

use crate::entity::EntityKey;

#[derive(Debug, Default)]
pub struct LruTracker {
    ticks: HashMap<EntityKey, u64>,
    by_tick: BTreeMap<u64, EntityKey>,
    clock: u64,
}

impl LruTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks `key` as most recently used, tracking it if unknown.
    pub fn touch(&mut self, key: &EntityKey) {
        self.clock += 1;
        if let Some(previous) = self.ticks.insert(key.clone(), self.clock) {
            self.by_tick.remove(&previous);
        }
        self.by_tick.insert(self.clock, key.clone());
    }

    pub fn remove(&mut self, key: &EntityKey) {
        if let Some(tick) = self.ticks.remove(key) {
            self.by_tick.remove(&tick);
        }
    }

    /// Stops tracking the least recently used key and returns it.
    pub fn evict_oldest(&mut self) -> Option<EntityKey> {
        let (_, key) = self.by_tick.pop_first()?;
        self.ticks.remove(&key);
        Some(key)
    }

    pub fn len(&self) -> usize {
        self.ticks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ticks.is_empty()
    }
}
