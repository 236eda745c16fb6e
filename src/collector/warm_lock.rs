//! Reader/writer coordination over the warm directory.
//!
//! The rotator takes the shared side around each hot→warm promotion; the
//! reducer takes the exclusive side for its enumerate-and-archive phase, so
//! the set of warm files cannot change underneath it. The underlying
//! `tokio::sync::RwLock` queues acquisitions fairly, so a waiting reducer
//! is never starved by a steady stream of rotations.
//!
//! The lock protects only warm-directory membership. Hot-file writes are
//! serialised by the rotator's own mutex and the remote push runs unlocked.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tokio::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

const SLOW_ACQUIRE: Duration = Duration::from_millis(10);

#[derive(Debug, Default)]
struct MetricsInner {
    exclusive_lock_count: i64,
    total_exclusive_wait: Duration,
    total_exclusive_hold: Duration,
    read_lock_count: i64,
}

/// Snapshot of the lock's contention counters.
#[derive(Debug, Clone, Default)]
pub struct WarmLockMetrics {
    pub exclusive_lock_count: i64,
    pub total_exclusive_wait: Duration,
    pub total_exclusive_hold: Duration,
    pub read_lock_count: i64,
    pub active_read_locks: i64,
}

pub struct WarmLock {
    inner: RwLock<()>,
    metrics: Mutex<MetricsInner>,
    active_readers: AtomicI64,
}

/// Shared guard held by the rotator across one warm insert.
pub struct WarmReadGuard<'a> {
    _guard: RwLockReadGuard<'a, ()>,
    lock: &'a WarmLock,
}

impl Drop for WarmReadGuard<'_> {
    fn drop(&mut self) {
        self.lock.active_readers.fetch_sub(1, Ordering::Relaxed);
    }
}

/// Exclusive guard held by the reducer; hold time is recorded on drop.
pub struct WarmWriteGuard<'a> {
    _guard: RwLockWriteGuard<'a, ()>,
    lock: &'a WarmLock,
    acquired_at: Instant,
}

impl Drop for WarmWriteGuard<'_> {
    fn drop(&mut self) {
        let held = self.acquired_at.elapsed();
        let mut m = self.lock.metrics.lock().unwrap();
        m.total_exclusive_hold += held;
        drop(m);
        log::debug!("🔓 Warm lock released (held {:?})", held);
    }
}

impl WarmLock {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(()),
            metrics: Mutex::new(MetricsInner::default()),
            active_readers: AtomicI64::new(0),
        }
    }

    /// Acquire the shared side. Multiple rotations may hold this at once.
    pub async fn read(&self) -> WarmReadGuard<'_> {
        let start = Instant::now();
        let guard = self.inner.read().await;
        let waited = start.elapsed();

        self.metrics.lock().unwrap().read_lock_count += 1;
        self.active_readers.fetch_add(1, Ordering::Relaxed);

        if waited > SLOW_ACQUIRE {
            log::debug!("⏳ Warm read lock acquired after waiting {:?}", waited);
        }

        WarmReadGuard {
            _guard: guard,
            lock: self,
        }
    }

    /// Acquire the exclusive side. Blocks until all rotations in flight have
    /// finished; new rotations queue behind this acquisition.
    pub async fn write(&self) -> WarmWriteGuard<'_> {
        let start = Instant::now();
        let guard = self.inner.write().await;
        let waited = start.elapsed();

        {
            let mut m = self.metrics.lock().unwrap();
            m.exclusive_lock_count += 1;
            m.total_exclusive_wait += waited;
        }

        if waited > SLOW_ACQUIRE {
            log::warn!("⏳ Warm exclusive lock acquired after waiting {:?}", waited);
        } else {
            log::debug!("🔒 Warm exclusive lock acquired");
        }

        WarmWriteGuard {
            _guard: guard,
            lock: self,
            acquired_at: Instant::now(),
        }
    }

    pub fn metrics(&self) -> WarmLockMetrics {
        let m = self.metrics.lock().unwrap();
        WarmLockMetrics {
            exclusive_lock_count: m.exclusive_lock_count,
            total_exclusive_wait: m.total_exclusive_wait,
            total_exclusive_hold: m.total_exclusive_hold,
            read_lock_count: m.read_lock_count,
            active_read_locks: self.active_readers.load(Ordering::Relaxed),
        }
    }

    pub fn reset_metrics(&self) {
        *self.metrics.lock().unwrap() = MetricsInner::default();
    }
}

impl Default for WarmLock {
    fn default() -> Self {
        Self::new()
    }
}
