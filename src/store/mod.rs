//! Store Adapters
//!
//! The two narrow interfaces the cache manager talks to, and the adapters
//! shipped with the crate.
//!
//! # Adapters
//! - [`MemoryCacheStore`] - in-process hash-per-collection fast path with an LRU bound
//! - [`MemoryDatabase`] - in-process durable store that records executed statements
//! - [`SqliteStore`] - sqlx-backed SQLite durable store

use async_trait::async_trait;

use crate::entity::Row;
use crate::error::Result;

mod lru;
mod memory;
mod sqlite;

pub use lru::LruTracker;
pub use memory::{MemoryCacheStore, MemoryDatabase};
pub use sqlite::SqliteStore;

// == Cache Store ==
/// Fast-path key-value store, modelled as one hash table per collection.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Returns the payload cached for `(collection, id)`, or `None` on a miss.
    async fn hash_get(&self, collection: &str, id: i64) -> Result<Option<Vec<u8>>>;

    /// Stores `payload` under `(collection, id)`, replacing any previous value.
    async fn hash_set(&self, collection: &str, id: i64, payload: Vec<u8>) -> Result<()>;

    /// Removes the payload for `(collection, id)`. Removing a missing entry is not an error.
    async fn hash_delete(&self, collection: &str, id: i64) -> Result<()>;
}

// == Durable Store ==
/// System of record.
#[async_trait]
pub trait DurableStore: Send + Sync {
    /// Reads the row with primary key `id` from `collection`.
    async fn query_by_id(&self, collection: &str, id: i64) -> Result<Row>;

    /// Executes a complete statement produced by an entity codec.
    async fn execute(&self, statement: &str) -> Result<()>;
}
