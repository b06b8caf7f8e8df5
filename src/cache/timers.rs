//! Timer Registry
//!
//! Per-key bookkeeping of the flush and evict deadlines. Each key owns a
//! [`TimerRecord`] holding two independent [`TimerChannel`]s; a channel is
//! either unarmed or backed by one spawned tokio task that sleeps until the
//! channel's deadline. Rescheduling pushes a new deadline to the running
//! task through a watch channel, so an armed channel never has more than one
//! task behind it.
//!
//! Records sit behind a per-key async mutex. Holding that mutex is what
//! serializes operations (and timer callbacks) on the same key.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{watch, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};

use crate::entity::EntityKey;

/// Longest interval a timer is armed for. Larger requests are clamped so the
/// deadline stays representable.
pub const MAX_INTERVAL: Duration = Duration::from_secs(86_400 * 365 * 30);

/// Which of the two timers of a key is meant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    Flush,
    Evict,
}

impl TimerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimerKind::Flush => "flush",
            TimerKind::Evict => "evict",
        }
    }
}

// == Timer Channel ==
#[derive(Debug)]
struct ArmedTimer {
    generation: u64,
    deadline: watch::Sender<Instant>,
    task: JoinHandle<()>,
}

/// One deadline of a key: unarmed, or armed with a single scheduled task.
#[derive(Debug, Default)]
pub struct TimerChannel {
    interval: Duration,
    armed: Option<ArmedTimer>,
}

impl TimerChannel {
    pub fn is_armed(&self) -> bool {
        self.armed.is_some()
    }

    /// Interval used by the most recent arming.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Whether `generation` identifies the task currently backing this channel.
    pub fn is_current(&self, generation: u64) -> bool {
        self.armed
            .as_ref()
            .is_some_and(|armed| armed.generation == generation)
    }

    /// Current deadline, if armed.
    pub fn deadline(&self) -> Option<Instant> {
        self.armed.as_ref().map(|armed| *armed.deadline.borrow())
    }

    /// Arms the channel `interval` from now, or moves the deadline of the
    /// task already backing it. `spawn` is only called when a new task is
    /// needed and receives the new generation and deadline receiver.
    ///
    /// Returns `true` when an existing task was rescheduled.
    pub fn schedule<F>(&mut self, interval: Duration, generation: u64, spawn: F) -> bool
    where
        F: FnOnce(u64, watch::Receiver<Instant>) -> JoinHandle<()>,
    {
        let interval = interval.min(MAX_INTERVAL);
        self.interval = interval;
        let deadline = Instant::now() + interval;

        if let Some(armed) = &self.armed {
            if armed.deadline.send(deadline).is_ok() {
                return true;
            }
            // backing task is gone; replace it below
            armed.task.abort();
        }

        let (tx, rx) = watch::channel(deadline);
        self.armed = Some(ArmedTimer {
            generation,
            deadline: tx,
            task: spawn(generation, rx),
        });
        false
    }

    /// Stops the backing task. Must not be called from that task itself.
    pub fn cancel(&mut self) -> bool {
        match self.armed.take() {
            Some(armed) => {
                armed.task.abort();
                true
            }
            None => false,
        }
    }

    /// Marks the channel as fired. Called by the backing task once it owns
    /// the record lock; the task is left to finish on its own.
    pub fn complete(&mut self) {
        self.armed = None;
    }
}

// == Timer Record ==
/// Both timers of one key, plus the write waiting for the flush timer.
#[derive(Debug, Default)]
pub struct TimerRecord {
    pub flush: TimerChannel,
    pub evict: TimerChannel,
    /// Latest statement handed over by a write; executed when flush fires.
    pub pending_statement: Option<String>,
}

impl TimerRecord {
    pub fn channel(&self, kind: TimerKind) -> &TimerChannel {
        match kind {
            TimerKind::Flush => &self.flush,
            TimerKind::Evict => &self.evict,
        }
    }

    pub fn channel_mut(&mut self, kind: TimerKind) -> &mut TimerChannel {
        match kind {
            TimerKind::Flush => &mut self.flush,
            TimerKind::Evict => &mut self.evict,
        }
    }

    /// No armed timer and nothing left to write.
    pub fn is_idle(&self) -> bool {
        !self.flush.is_armed() && !self.evict.is_armed() && self.pending_statement.is_none()
    }
}

/// Shared handle to a key's record; locking it is the per-key lock.
pub type Slot = Arc<AsyncMutex<TimerRecord>>;

// == Timer Registry ==
/// Map from entity key to its timer record.
#[derive(Debug, Default)]
pub struct TimerRegistry {
    slots: Mutex<HashMap<EntityKey, Slot>>,
    generations: AtomicU64,
    armed_flushes: AtomicUsize,
}

impl TimerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the slot for `key`, creating an idle record if absent.
    pub fn slot(&self, key: &EntityKey) -> Slot {
        self.slots
            .lock()
            .entry(key.clone())
            .or_insert_with(Slot::default)
            .clone()
    }

    /// Returns the slot for `key` without creating one.
    pub fn existing(&self, key: &EntityKey) -> Option<Slot> {
        self.slots.lock().get(key).cloned()
    }

    /// Drops the record of `key` once it is idle and nobody else holds or
    /// waits for it. Must be called while `record` (the locked content of
    /// `slot`) is still held, so no timer can be armed in between.
    pub fn release(&self, key: &EntityKey, slot: &Slot, record: &TimerRecord) {
        if !record.is_idle() {
            return;
        }
        let mut slots = self.slots.lock();
        // one reference in the map, one held by the caller
        if Arc::strong_count(slot) == 2
            && slots.get(key).is_some_and(|current| Arc::ptr_eq(current, slot))
        {
            slots.remove(key);
        }
    }

    /// Keys currently holding a record.
    pub fn keys(&self) -> Vec<EntityKey> {
        self.slots.lock().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn next_generation(&self) -> u64 {
        self.generations.fetch_add(1, Ordering::Relaxed) + 1
    }

    // == Armed Flush Gauge ==
    /// Number of keys whose flush channel is armed. Maintained by the callers
    /// that arm and disarm flush channels, so reading it takes no record lock.
    pub fn armed_flushes(&self) -> usize {
        self.armed_flushes.load(Ordering::Acquire)
    }

    pub fn flush_armed(&self) {
        self.armed_flushes.fetch_add(1, Ordering::AcqRel);
    }

    pub fn flush_disarmed(&self) {
        let _ = self
            .armed_flushes
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
    }
}

/// Sleeps until the deadline published on `deadline` passes, following any
/// reschedule. Returns `false` if the channel was dropped (timer cancelled).
pub async fn wait_for_deadline(deadline: &mut watch::Receiver<Instant>) -> bool {
    loop {
        let target = *deadline.borrow_and_update();
        tokio::select! {
            _ = sleep_until(target) => return true,
            changed = deadline.changed() => {
                if changed.is_err() {
                    return false;
                }
            }
        }
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    fn counting_task(
        fired: Arc<AtomicUsize>,
    ) -> impl FnOnce(u64, watch::Receiver<Instant>) -> JoinHandle<()> {
        move |_: u64, mut rx: watch::Receiver<Instant>| {
            tokio::spawn(async move {
                if wait_for_deadline(&mut rx).await {
                    fired.fetch_add(1, Ordering::SeqCst);
                }
            })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_channel_fires_once_after_interval() {
        let fired = Arc::new(AtomicUsize::new(0));
        let mut channel = TimerChannel::default();

        let rescheduled = channel.schedule(Duration::from_secs(2), 1, counting_task(fired.clone()));
        assert!(!rescheduled);
        assert!(channel.is_armed());
        assert!(channel.is_current(1));

        tokio::time::sleep(Duration::from_millis(1900)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reschedule_moves_deadline_without_new_task() {
        let fired = Arc::new(AtomicUsize::new(0));
        let mut channel = TimerChannel::default();

        channel.schedule(Duration::from_secs(2), 1, counting_task(fired.clone()));
        tokio::time::sleep(Duration::from_secs(1)).await;

        let rescheduled = channel.schedule(Duration::from_secs(2), 2, |_, _| {
            panic!("an armed channel must be rescheduled in place")
        });
        assert!(rescheduled);
        assert!(channel.is_current(1));

        // original deadline passes without firing
        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reschedule_can_shorten_deadline() {
        let fired = Arc::new(AtomicUsize::new(0));
        let mut channel = TimerChannel::default();

        channel.schedule(Duration::from_secs(10), 1, counting_task(fired.clone()));
        channel.schedule(Duration::from_secs(1), 2, |_, _| unreachable!());
        assert_eq!(channel.interval(), Duration::from_secs(1));

        tokio::time::sleep(Duration::from_millis(1100)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_prevents_firing() {
        let fired = Arc::new(AtomicUsize::new(0));
        let mut channel = TimerChannel::default();

        channel.schedule(Duration::from_secs(1), 1, counting_task(fired.clone()));
        assert!(channel.cancel());
        assert!(!channel.is_armed());
        assert!(!channel.cancel());

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_registry_release_removes_idle_record() {
        let registry = TimerRegistry::new();
        let key = EntityKey::new("users", 1);

        let slot = registry.slot(&key);
        assert_eq!(registry.len(), 1);
        {
            let record = slot.lock().await;
            registry.release(&key, &slot, &record);
        }
        assert!(registry.is_empty());
        assert!(registry.existing(&key).is_none());
    }

    #[tokio::test]
    async fn test_registry_keeps_record_with_pending_write() {
        let registry = TimerRegistry::new();
        let key = EntityKey::new("users", 1);

        let slot = registry.slot(&key);
        {
            let mut record = slot.lock().await;
            record.pending_statement = Some("UPDATE users SET name='a' WHERE id=1".into());
            registry.release(&key, &slot, &record);
        }
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_registry_keeps_record_while_shared() {
        let registry = TimerRegistry::new();
        let key = EntityKey::new("users", 1);

        let slot = registry.slot(&key);
        let waiter = registry.slot(&key);
        assert!(Arc::ptr_eq(&slot, &waiter));
        {
            let record = slot.lock().await;
            registry.release(&key, &slot, &record);
        }
        assert_eq!(registry.len(), 1);

        drop(slot);
        {
            let record = waiter.lock().await;
            registry.release(&key, &waiter, &record);
        }
        assert!(registry.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_huge_interval_is_clamped() {
        let fired = Arc::new(AtomicUsize::new(0));
        let mut channel = TimerChannel::default();
        let start = Instant::now();

        channel.schedule(Duration::from_secs(u64::MAX), 1, counting_task(fired.clone()));
        assert_eq!(channel.interval(), MAX_INTERVAL);
        assert_eq!(channel.deadline(), Some(start + MAX_INTERVAL));

        // rescheduling in place clamps too
        channel.schedule(Duration::MAX, 2, |_, _| unreachable!());
        assert_eq!(channel.interval(), MAX_INTERVAL);

        tokio::time::sleep(Duration::from_secs(3600)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert!(channel.cancel());
    }

    #[test]
    fn test_armed_flush_gauge_never_underflows() {
        let registry = TimerRegistry::new();
        registry.flush_armed();
        registry.flush_armed();
        registry.flush_disarmed();
        assert_eq!(registry.armed_flushes(), 1);

        registry.flush_disarmed();
        registry.flush_disarmed();
        assert_eq!(registry.armed_flushes(), 0);
    }

    #[test]
    fn test_generations_increase() {
        let registry = TimerRegistry::new();
        let first = registry.next_generation();
        let second = registry.next_generation();
        assert!(second > first);
    }
}
