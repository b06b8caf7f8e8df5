//! Cache Statistics Module
//!
//! Counters describing how the write-back cache is being exercised.

use serde::Serialize;

// == Cache Stats ==
/// Snapshot of cache manager counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Reads answered from the cache store
    pub hits: u64,
    /// Reads that had to go to the durable store
    pub misses: u64,
    /// Entries removed by an eviction timer
    pub evictions: u64,
    /// Statements executed successfully against the durable store
    pub flushes: u64,
    /// Statements the durable store rejected
    pub flush_failures: u64,
    /// Soft failures reported by the cache store
    pub cache_errors: u64,
    /// Keys with at least one armed timer (filled in on snapshot)
    pub tracked_keys: usize,
    /// Keys with an armed flush timer (filled in on snapshot)
    pub pending_flushes: usize,
}

impl CacheStats {
    // == Constructor ==
    pub fn new() -> Self {
        Self::default()
    }

    // == Hit Rate ==
    /// Returns hits / (hits + misses), or 0.0 if no reads have been made.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    pub fn record_hit(&mut self) {
        self.hits += 1;
    }

    pub fn record_miss(&mut self) {
        self.misses += 1;
    }

    pub fn record_eviction(&mut self) {
        self.evictions += 1;
    }

    pub fn record_flush(&mut self) {
        self.flushes += 1;
    }

    pub fn record_flush_failure(&mut self) {
        self.flush_failures += 1;
    }

    pub fn record_cache_error(&mut self) {
        self.cache_errors += 1;
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_new() {
        let stats = CacheStats::new();
        assert_eq!(stats, CacheStats::default());
        assert_eq!(stats.hit_rate(), 0.0);
    }

    #[test]
    fn test_hit_rate_mixed() {
        let mut stats = CacheStats::new();
        stats.record_hit();
        stats.record_hit();
        stats.record_hit();
        stats.record_miss();
        assert_eq!(stats.hit_rate(), 0.75);
    }

    #[test]
    fn test_flush_counters_are_independent() {
        let mut stats = CacheStats::new();
        stats.record_flush();
        stats.record_flush_failure();
        stats.record_flush_failure();
        stats.record_cache_error();
        stats.record_eviction();

        assert_eq!(stats.flushes, 1);
        assert_eq!(stats.flush_failures, 2);
        assert_eq!(stats.cache_errors, 1);
        assert_eq!(stats.evictions, 1);
    }
}
