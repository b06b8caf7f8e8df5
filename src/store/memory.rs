//! In-Memory Store Adapters
//!
//! `MemoryCacheStore` is the default fast path: one hash table per
//! collection, bounded by an LRU capacity. `MemoryDatabase` is an in-process
//! system of record that keeps JSON rows and records every executed
//! statement, which makes it the natural test double for durable writes.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::debug;

use crate::entity::{EntityKey, Row};
use crate::error::{CacheError, Result};
use crate::store::{CacheStore, DurableStore, LruTracker};

// == Memory Cache Store ==
#[derive(Debug, Default)]
struct Tables {
    /// collection -> id -> payload
    tables: HashMap<String, HashMap<i64, Vec<u8>>>,
    lru: LruTracker,
    len: usize,
}

impl Tables {
    fn remove(&mut self, key: &EntityKey) -> bool {
        let removed = self
            .tables
            .get_mut(&key.collection)
            .and_then(|table| table.remove(&key.id))
            .is_some();
        if removed {
            self.len -= 1;
            self.lru.remove(key);
            if self
                .tables
                .get(&key.collection)
                .is_some_and(|table| table.is_empty())
            {
                self.tables.remove(&key.collection);
            }
        }
        removed
    }
}

/// Hash-table-per-collection cache store held in process memory.
///
/// When `max_entries` is reached the least recently used payload is dropped
/// to make room; timers owned by the cache manager are unaffected.
#[derive(Debug)]
pub struct MemoryCacheStore {
    inner: Mutex<Tables>,
    max_entries: usize,
    sets: AtomicUsize,
    lru_evictions: AtomicUsize,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

impl MemoryCacheStore {
    // == Constructor ==
    /// Creates an empty store holding at most `max_entries` payloads.
    pub fn new(max_entries: usize) -> Self {
        Self {
            inner: Mutex::new(Tables::default()),
            max_entries: max_entries.max(1),
            sets: AtomicUsize::new(0),
            lru_evictions: AtomicUsize::new(0),
            fail_reads: AtomicBool::new(false),
            fail_writes: AtomicBool::new(false),
        }
    }

    /// Number of payloads currently held.
    pub fn len(&self) -> usize {
        self.inner.lock().len
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, collection: &str, id: i64) -> bool {
        self.inner
            .lock()
            .tables
            .get(collection)
            .is_some_and(|table| table.contains_key(&id))
    }

    /// Total successful `hash_set` calls since creation.
    pub fn set_count(&self) -> usize {
        self.sets.load(Ordering::Relaxed)
    }

    /// Payloads dropped because the store was full.
    pub fn lru_evictions(&self) -> usize {
        self.lru_evictions.load(Ordering::Relaxed)
    }

    /// Makes every subsequent read fail, simulating an unreachable cache.
    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::Relaxed);
    }

    /// Makes every subsequent write fail, simulating an unreachable cache.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::Relaxed);
    }
}

impl Default for MemoryCacheStore {
    fn default() -> Self {
        Self::new(10_000)
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn hash_get(&self, collection: &str, id: i64) -> Result<Option<Vec<u8>>> {
        if self.fail_reads.load(Ordering::Relaxed) {
            return Err(CacheError::CacheStore(format!("HGET {} {} refused", collection, id)));
        }

        let mut inner = self.inner.lock();
        let payload = inner
            .tables
            .get(collection)
            .and_then(|table| table.get(&id))
            .cloned();
        if payload.is_some() {
            inner.lru.touch(&EntityKey::new(collection, id));
        }
        Ok(payload)
    }

    async fn hash_set(&self, collection: &str, id: i64, payload: Vec<u8>) -> Result<()> {
        if self.fail_writes.load(Ordering::Relaxed) {
            return Err(CacheError::CacheStore(format!("HSET {} {} refused", collection, id)));
        }

        let key = EntityKey::new(collection, id);
        let mut inner = self.inner.lock();
        let is_overwrite = inner
            .tables
            .get(collection)
            .is_some_and(|table| table.contains_key(&id));

        if !is_overwrite && inner.len >= self.max_entries {
            if let Some(oldest) = inner.lru.evict_oldest() {
                inner.remove(&oldest);
                self.lru_evictions.fetch_add(1, Ordering::Relaxed);
                debug!(key = %oldest, "cache store full, dropped least recently used entry");
            }
        }

        let previous = inner
            .tables
            .entry(collection.to_string())
            .or_default()
            .insert(id, payload);
        if previous.is_none() {
            inner.len += 1;
        }
        inner.lru.touch(&key);
        self.sets.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn hash_delete(&self, collection: &str, id: i64) -> Result<()> {
        if self.fail_writes.load(Ordering::Relaxed) {
            return Err(CacheError::CacheStore(format!("HDEL {} {} refused", collection, id)));
        }

        self.inner.lock().remove(&EntityKey::new(collection, id));
        Ok(())
    }
}

// == Memory Database ==
/// Durable store double holding rows per collection in memory.
///
/// Statements are recorded, not interpreted: `executed()` returns them in
/// the order they ran.
#[derive(Debug, Default)]
pub struct MemoryDatabase {
    rows: Mutex<HashMap<String, HashMap<i64, Row>>>,
    executed: Mutex<Vec<String>>,
    queries: AtomicUsize,
    query_delay: Mutex<Option<Duration>>,
    fail_queries: AtomicBool,
    fail_executes: AtomicBool,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a row. The row must carry an integer `id` column.
    pub fn insert_row(&self, collection: &str, row: Row) -> Result<()> {
        let id = row
            .get("id")
            .and_then(|v| v.as_i64())
            .ok_or_else(|| CacheError::InvalidRequest("row is missing an integer id".to_string()))?;
        self.rows
            .lock()
            .entry(collection.to_string())
            .or_default()
            .insert(id, row);
        Ok(())
    }

    /// Number of `query_by_id` calls received, failed ones included.
    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::Relaxed)
    }

    /// Successfully executed statements, oldest first.
    pub fn executed(&self) -> Vec<String> {
        self.executed.lock().clone()
    }

    /// Delays every query, letting concurrent callers overlap.
    pub fn set_query_delay(&self, delay: Option<Duration>) {
        *self.query_delay.lock() = delay;
    }

    pub fn set_fail_queries(&self, fail: bool) {
        self.fail_queries.store(fail, Ordering::Relaxed);
    }

    pub fn set_fail_executes(&self, fail: bool) {
        self.fail_executes.store(fail, Ordering::Relaxed);
    }
}

#[async_trait]
impl DurableStore for MemoryDatabase {
    async fn query_by_id(&self, collection: &str, id: i64) -> Result<Row> {
        self.queries.fetch_add(1, Ordering::Relaxed);

        let delay = *self.query_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if self.fail_queries.load(Ordering::Relaxed) {
            return Err(CacheError::Durable("connection refused".to_string()));
        }

        self.rows
            .lock()
            .get(collection)
            .and_then(|table| table.get(&id))
            .cloned()
            .ok_or_else(|| CacheError::NotFound(EntityKey::new(collection, id).to_string()))
    }

    async fn execute(&self, statement: &str) -> Result<()> {
        if self.fail_executes.load(Ordering::Relaxed) {
            return Err(CacheError::Durable("connection refused".to_string()));
        }
        self.executed.lock().push(statement.to_string());
        Ok(())
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio_test::{assert_err, assert_ok};

    fn row(id: i64, name: &str) -> Row {
        json!({ "id": id, "name": name })
            .as_object()
            .cloned()
            .unwrap()
    }

    #[tokio::test]
    async fn test_cache_set_get_delete() {
        let store = MemoryCacheStore::new(10);

        store.hash_set("users", 1, b"one".to_vec()).await.unwrap();
        assert_eq!(store.hash_get("users", 1).await.unwrap(), Some(b"one".to_vec()));
        assert_eq!(store.hash_get("orders", 1).await.unwrap(), None);

        store.hash_delete("users", 1).await.unwrap();
        assert_eq!(store.hash_get("users", 1).await.unwrap(), None);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_cache_delete_missing_is_ok() {
        let store = MemoryCacheStore::new(10);
        assert_ok!(store.hash_delete("users", 99).await);
    }

    #[tokio::test]
    async fn test_cache_overwrite_keeps_one_entry() {
        let store = MemoryCacheStore::new(10);
        store.hash_set("users", 1, b"a".to_vec()).await.unwrap();
        store.hash_set("users", 1, b"b".to_vec()).await.unwrap();

        assert_eq!(store.len(), 1);
        assert_eq!(store.set_count(), 2);
        assert_eq!(store.hash_get("users", 1).await.unwrap(), Some(b"b".to_vec()));
    }

    #[tokio::test]
    async fn test_cache_lru_bound() {
        let store = MemoryCacheStore::new(2);
        store.hash_set("users", 1, b"1".to_vec()).await.unwrap();
        store.hash_set("users", 2, b"2".to_vec()).await.unwrap();
        // touch 1 so 2 becomes the oldest
        store.hash_get("users", 1).await.unwrap();
        store.hash_set("users", 3, b"3".to_vec()).await.unwrap();

        assert_eq!(store.len(), 2);
        assert!(store.contains("users", 1));
        assert!(!store.contains("users", 2));
        assert!(store.contains("users", 3));
        assert_eq!(store.lru_evictions(), 1);
    }

    #[tokio::test]
    async fn test_cache_failure_injection() {
        let store = MemoryCacheStore::new(10);
        store.set_fail_writes(true);
        let result = store.hash_set("users", 1, b"x".to_vec()).await;
        assert!(matches!(result, Err(CacheError::CacheStore(_))));

        store.set_fail_reads(true);
        assert_err!(store.hash_get("users", 1).await);
    }

    #[tokio::test]
    async fn test_database_query_and_execute() {
        let db = MemoryDatabase::new();
        db.insert_row("users", row(1, "a")).unwrap();

        let found = assert_ok!(db.query_by_id("users", 1).await);
        assert_eq!(found["name"], "a");
        assert_eq!(db.query_count(), 1);

        let missing = db.query_by_id("users", 2).await;
        assert!(matches!(missing, Err(CacheError::NotFound(_))));
        assert_eq!(db.query_count(), 2);

        db.execute("UPDATE users SET name='b' WHERE id=1").await.unwrap();
        assert_eq!(db.executed(), vec!["UPDATE users SET name='b' WHERE id=1".to_string()]);
    }

    #[tokio::test]
    async fn test_database_failure_injection() {
        let db = MemoryDatabase::new();
        db.insert_row("users", row(1, "a")).unwrap();
        db.set_fail_queries(true);
        db.set_fail_executes(true);

        assert!(matches!(db.query_by_id("users", 1).await, Err(CacheError::Durable(_))));
        assert_err!(db.execute("UPDATE users SET name='b' WHERE id=1").await);
        assert!(db.executed().is_empty());
    }

    #[test]
    fn test_database_rejects_row_without_id() {
        let db = MemoryDatabase::new();
        let row = json!({ "name": "a" }).as_object().cloned().unwrap();
        assert!(db.insert_row("users", row).is_err());
    }
}
