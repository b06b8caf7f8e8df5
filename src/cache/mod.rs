//! Cache Module
//!
//! Write-back caching of entities: read-through loading, deferred flushes
//! and timed eviction, coordinated per key.

mod failures;
mod manager;
mod stats;
mod timers;


// Re-export public types
pub use failures::{FailedFlush, FailedFlushLog, FlushTrigger};
pub use manager::{CacheSettings, WriteBackCache};
pub use stats::CacheStats;
pub use timers::{TimerChannel, TimerKind, TimerRecord, TimerRegistry};
