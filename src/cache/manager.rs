//! Cache Manager Module
//!
//! Orchestrates the cache store, the durable store and the timer registry:
//! read-through on `get`, write-back on `set`, write-through on `flush`.
//!
//! Every operation on a key runs while holding that key's record lock, from
//! the first store call to the last timer change. Timer callbacks take the
//! same lock, so they never interleave with a caller working on the same key.
//! Different keys never wait on each other.

use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::cache::failures::{FailedFlush, FailedFlushLog, FlushTrigger};
use crate::cache::stats::CacheStats;
use crate::cache::timers::{
    wait_for_deadline, TimerKind, TimerRecord, TimerRegistry, MAX_INTERVAL,
};
use crate::config::Config;
use crate::entity::{Entity, EntityKey};
use crate::error::Result;
use crate::store::{CacheStore, DurableStore};

/// Interval used when a caller passes a non-positive timeout. Positive
/// timeouts are clamped to [`MAX_INTERVAL`].
fn interval_or(seconds: i64, default: Duration) -> Duration {
    if seconds <= 0 {
        default
    } else {
        Duration::from_secs(seconds.unsigned_abs()).min(MAX_INTERVAL)
    }
}

// == Settings ==
/// Defaults applied by the cache manager.
#[derive(Debug, Clone)]
pub struct CacheSettings {
    /// Eviction interval used when `get` receives a timeout `<= 0`
    pub default_evict: Duration,
    /// Flush interval used when `set` receives a timeout `<= 0`
    pub default_flush: Duration,
    /// How many failed flushes are retained for inspection
    pub failed_flush_capacity: usize,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            default_evict: Duration::from_secs(300),
            default_flush: Duration::from_secs(60),
            failed_flush_capacity: 256,
        }
    }
}

impl From<&Config> for CacheSettings {
    fn from(config: &Config) -> Self {
        Self {
            default_evict: Duration::from_secs(config.default_evict_secs).min(MAX_INTERVAL),
            default_flush: Duration::from_secs(config.default_flush_secs).min(MAX_INTERVAL),
            failed_flush_capacity: config.failed_flush_capacity,
        }
    }
}

/// Outcome of a timer task waking up with the record lock.
enum Wakeup {
    Done,
    Rescheduled,
}

// == Shared State ==
struct Inner {
    cache: Arc<dyn CacheStore>,
    durable: Arc<dyn DurableStore>,
    registry: TimerRegistry,
    stats: Mutex<CacheStats>,
    failures: FailedFlushLog,
    settings: CacheSettings,
}

impl Inner {
    /// Runs `statement` against the durable store, recording the outcome.
    async fn write_through(&self, key: &EntityKey, statement: String, trigger: FlushTrigger) -> bool {
        match self.durable.execute(&statement).await {
            Ok(()) => {
                self.stats.lock().record_flush();
                debug!(key = %key, ?trigger, "flushed to durable store");
                true
            }
            Err(err) => {
                self.stats.lock().record_flush_failure();
                error!(key = %key, ?trigger, error = %err, "durable write failed");
                self.failures.record(FailedFlush {
                    key: key.clone(),
                    statement,
                    error: err.to_string(),
                    trigger,
                    failed_at: Utc::now(),
                });
                false
            }
        }
    }

    /// Executes the write waiting for the flush timer, if any, and disarms it.
    async fn drain_pending(&self, key: &EntityKey, record: &mut TimerRecord, trigger: FlushTrigger) -> bool {
        self.cancel_flush(record);
        match record.pending_statement.take() {
            Some(statement) => self.write_through(key, statement, trigger).await,
            None => false,
        }
    }

    /// Disarms the flush channel, keeping the armed-flush gauge in step.
    fn cancel_flush(&self, record: &mut TimerRecord) -> bool {
        let cancelled = record.flush.cancel();
        if cancelled {
            self.registry.flush_disarmed();
        }
        cancelled
    }

    fn schedule(self: &Arc<Self>, key: &EntityKey, record: &mut TimerRecord, kind: TimerKind, interval: Duration) {
        if kind == TimerKind::Flush && !record.flush.is_armed() {
            self.registry.flush_armed();
        }
        let generation = self.registry.next_generation();
        let weak = Arc::downgrade(self);
        let rescheduled = record.channel_mut(kind).schedule(interval, generation, |generation, rx| {
            spawn_timer(weak, key.clone(), kind, generation, rx)
        });
        debug!(
            key = %key,
            timer = kind.as_str(),
            interval_secs = interval.as_secs(),
            rescheduled,
            "timer armed"
        );
    }

    /// Body of a timer whose deadline passed.
    async fn fire(
        self: &Arc<Self>,
        key: &EntityKey,
        kind: TimerKind,
        generation: u64,
        deadline: &watch::Receiver<Instant>,
    ) -> Wakeup {
        let Some(slot) = self.registry.existing(key) else {
            return Wakeup::Done;
        };
        let mut record = slot.lock().await;

        if !record.channel(kind).is_current(generation) {
            // cancelled or replaced while waiting for the lock
            return Wakeup::Done;
        }
        if Instant::now() < *deadline.borrow() {
            return Wakeup::Rescheduled;
        }
        record.channel_mut(kind).complete();
        if kind == TimerKind::Flush {
            self.registry.flush_disarmed();
        }

        match kind {
            TimerKind::Flush => {
                if let Some(statement) = record.pending_statement.take() {
                    self.write_through(key, statement, FlushTrigger::Timer).await;
                }
            }
            TimerKind::Evict => {
                if record.pending_statement.is_some() {
                    debug!(key = %key, "writing pending update before eviction");
                    self.drain_pending(key, &mut record, FlushTrigger::WriteThrough).await;
                }
                match self.cache.hash_delete(&key.collection, key.id).await {
                    Ok(()) => {
                        self.stats.lock().record_eviction();
                        debug!(key = %key, "evicted from cache store");
                    }
                    Err(err) => {
                        self.stats.lock().record_cache_error();
                        warn!(key = %key, error = %err, "cache eviction failed");
                    }
                }
            }
        }

        self.registry.release(key, &slot, &record);
        Wakeup::Done
    }
}

fn spawn_timer(
    inner: Weak<Inner>,
    key: EntityKey,
    kind: TimerKind,
    generation: u64,
    mut deadline: watch::Receiver<Instant>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            if !wait_for_deadline(&mut deadline).await {
                return;
            }
            let Some(inner) = inner.upgrade() else {
                return;
            };
            match inner.fire(&key, kind, generation, &deadline).await {
                Wakeup::Done => return,
                Wakeup::Rescheduled => continue,
            }
        }
    })
}

// == Write-Back Cache ==
/// Write-back entity cache over a cache store and a durable store.
///
/// Cloning is cheap and every clone drives the same cache. Timers are tokio
/// tasks, so operations must run inside a tokio runtime.
#[derive(Clone)]
pub struct WriteBackCache {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for WriteBackCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriteBackCache")
            .field("tracked_keys", &self.inner.registry.len())
            .field("settings", &self.inner.settings)
            .finish()
    }
}

impl WriteBackCache {
    // == Constructors ==
    /// Creates a cache with default settings.
    pub fn new(cache: Arc<dyn CacheStore>, durable: Arc<dyn DurableStore>) -> Self {
        Self::with_settings(cache, durable, CacheSettings::default())
    }

    pub fn with_settings(
        cache: Arc<dyn CacheStore>,
        durable: Arc<dyn DurableStore>,
        settings: CacheSettings,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                cache,
                durable,
                registry: TimerRegistry::new(),
                stats: Mutex::new(CacheStats::new()),
                failures: FailedFlushLog::new(settings.failed_flush_capacity),
                settings,
            }),
        }
    }

    /// Creates a cache using the defaults loaded into `config`.
    pub fn from_config(
        cache: Arc<dyn CacheStore>,
        durable: Arc<dyn DurableStore>,
        config: &Config,
    ) -> Self {
        Self::with_settings(cache, durable, CacheSettings::from(config))
    }

    pub fn settings(&self) -> &CacheSettings {
        &self.inner.settings
    }

    // == Get ==
    /// Reads an entity, loading it from the durable store on a cache miss.
    ///
    /// A hit restarts the eviction timer. A miss queries the durable store,
    /// caches the row and arms the eviction timer. `evict_secs <= 0` uses the
    /// default eviction interval.
    ///
    /// # Errors
    /// - durable store query failures, in which case nothing is cached or armed
    /// - codec failures decoding the cached payload or the row
    pub async fn get<E: Entity>(&self, collection: &str, id: i64, evict_secs: i64) -> Result<E> {
        let key = EntityKey::new(collection, id);
        let interval = interval_or(evict_secs, self.inner.settings.default_evict);

        let slot = self.inner.registry.slot(&key);
        let mut record = slot.lock().await;
        let result = self.get_locked(&key, &mut record, interval).await;
        self.inner.registry.release(&key, &slot, &record);
        result
    }

    async fn get_locked<E: Entity>(
        &self,
        key: &EntityKey,
        record: &mut TimerRecord,
        interval: Duration,
    ) -> Result<E> {
        let inner = &self.inner;

        match inner.cache.hash_get(&key.collection, key.id).await {
            Ok(Some(payload)) => {
                let entity = E::decode(&payload)?;
                inner.stats.lock().record_hit();
                inner.schedule(key, record, TimerKind::Evict, interval);
                return Ok(entity);
            }
            Ok(None) => {}
            Err(err) => {
                inner.stats.lock().record_cache_error();
                warn!(key = %key, error = %err, "cache lookup failed, reading durable store");
            }
        }
        inner.stats.lock().record_miss();

        if record.pending_statement.is_some() {
            // the cached copy is gone but its write is not; persist it before reading back
            debug!(key = %key, "writing pending update before reload");
            inner.drain_pending(key, record, FlushTrigger::WriteThrough).await;
        }

        let row = inner.durable.query_by_id(&key.collection, key.id).await?;
        let entity = E::from_row(row)?;

        let populated = match entity.encode() {
            Ok(payload) => match inner.cache.hash_set(&key.collection, key.id, payload).await {
                Ok(()) => true,
                Err(err) => {
                    inner.stats.lock().record_cache_error();
                    warn!(key = %key, error = %err, "cache population failed");
                    false
                }
            },
            Err(err) => {
                warn!(key = %key, error = %err, "could not encode entity for caching");
                false
            }
        };

        if populated {
            inner.schedule(key, record, TimerKind::Evict, interval);
        }
        Ok(entity)
    }

    // == Set ==
    /// Writes an entity to the cache now and to the durable store later.
    ///
    /// The flush timer is armed, or moved, to `flush_secs` from now
    /// (`<= 0` uses the default); when it fires the latest statement for the
    /// key is executed once. A failed cache write is logged and skips the
    /// timer. An entity that cannot build its statement is cached without
    /// scheduling a flush.
    ///
    /// # Errors
    /// Only when the entity cannot be encoded.
    pub async fn set<E: Entity>(&self, entity: &E, collection: &str, id: i64, flush_secs: i64) -> Result<()> {
        let key = EntityKey::new(collection, id);
        let interval = interval_or(flush_secs, self.inner.settings.default_flush);
        let payload = entity.encode()?;
        let statement = match entity.update_statement() {
            Ok(statement) => Some(statement),
            Err(err) => {
                debug!(key = %key, error = %err, "no update statement, flush not scheduled");
                None
            }
        };

        let inner = &self.inner;
        let slot = inner.registry.slot(&key);
        let mut record = slot.lock().await;

        match inner.cache.hash_set(&key.collection, key.id, payload).await {
            Ok(()) => {
                if let Some(statement) = statement {
                    record.pending_statement = Some(statement);
                    inner.schedule(&key, &mut record, TimerKind::Flush, interval);
                }
            }
            Err(err) => {
                inner.stats.lock().record_cache_error();
                warn!(key = %key, error = %err, "cache write failed, flush not scheduled");
            }
        }

        inner.registry.release(&key, &slot, &record);
        Ok(())
    }

    // == Flush ==
    /// Writes an entity to the durable store immediately and cancels the
    /// pending flush timer for its key. Eviction and the cached copy are
    /// left alone.
    ///
    /// A rejected write is logged and kept in [`WriteBackCache::failed_flushes`];
    /// it is not returned as an error.
    pub async fn flush<E: Entity>(&self, entity: &E, collection: &str, id: i64) -> Result<()> {
        let key = EntityKey::new(collection, id);
        let statement = entity.update_statement();

        let inner = &self.inner;
        let slot = inner.registry.slot(&key);
        let mut record = slot.lock().await;

        match statement {
            Ok(statement) => {
                inner.write_through(&key, statement, FlushTrigger::Explicit).await;
            }
            Err(err) => {
                debug!(key = %key, error = %err, "no update statement, nothing flushed");
            }
        }
        if inner.cancel_flush(&mut record) {
            debug!(key = %key, "pending flush cancelled");
        }
        record.pending_statement = None;

        inner.registry.release(&key, &slot, &record);
        Ok(())
    }

    // == Invalidate ==
    /// Drops a key: cancels both timers, discards any pending write and
    /// deletes the cached payload.
    pub async fn invalidate(&self, collection: &str, id: i64) -> Result<()> {
        let key = EntityKey::new(collection, id);
        let inner = &self.inner;
        let slot = inner.registry.slot(&key);
        let mut record = slot.lock().await;

        inner.cancel_flush(&mut record);
        record.evict.cancel();
        if record.pending_statement.take().is_some() {
            warn!(key = %key, "invalidated with an unflushed write");
        }
        let result = inner.cache.hash_delete(&key.collection, key.id).await;

        inner.registry.release(&key, &slot, &record);
        result
    }

    // == Flush Pending ==
    /// Executes every write still waiting for its flush timer and disarms
    /// those timers. Returns how many statements the durable store accepted.
    pub async fn flush_pending(&self) -> usize {
        let inner = &self.inner;
        let mut flushed = 0;

        for key in inner.registry.keys() {
            let Some(slot) = inner.registry.existing(&key) else {
                continue;
            };
            let mut record = slot.lock().await;
            if inner.drain_pending(&key, &mut record, FlushTrigger::Drain).await {
                flushed += 1;
            }
            inner.registry.release(&key, &slot, &record);
        }

        info!(flushed, "pending writes drained");
        flushed
    }

    // == Peek ==
    /// Reads the cached payload without touching timers or the durable store.
    pub async fn peek<E: Entity>(&self, collection: &str, id: i64) -> Result<Option<E>> {
        match self.inner.cache.hash_get(collection, id).await? {
            Some(payload) => Ok(Some(E::decode(&payload)?)),
            None => Ok(None),
        }
    }

    // == Introspection ==
    /// Counter snapshot, including the number of tracked keys and of keys
    /// with an armed flush timer.
    pub fn stats(&self) -> CacheStats {
        let mut stats = self.inner.stats.lock().clone();
        stats.tracked_keys = self.inner.registry.len();
        stats.pending_flushes = self.pending_flushes();
        stats
    }

    /// Number of keys whose flush timer is armed. Never waits on a key lock.
    pub fn pending_flushes(&self) -> usize {
        self.inner.registry.armed_flushes()
    }

    /// Whether `(collection, id)` currently has a timer record.
    pub fn is_tracked(&self, collection: &str, id: i64) -> bool {
        self.inner
            .registry
            .existing(&EntityKey::new(collection, id))
            .is_some()
    }

    /// Deadline of one of the key's timers, if armed.
    pub async fn deadline(&self, collection: &str, id: i64, kind: TimerKind) -> Option<Instant> {
        let slot = self.inner.registry.existing(&EntityKey::new(collection, id))?;
        let record = slot.lock().await;
        record.channel(kind).deadline()
    }

    /// Durable writes that were rejected, oldest first.
    pub fn failed_flushes(&self) -> Vec<FailedFlush> {
        self.inner.failures.snapshot()
    }
}
