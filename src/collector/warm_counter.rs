//! Counter of completed warm rotations with a single-shot threshold
//! callback.
//!
//! The count itself is a plain atomic; the decision to fire is
//! double-checked under a mutex so that with many increments straddling the
//! threshold exactly one of them runs the callback per reset cycle.

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Mutex;

pub struct WarmFileCounter {
    count: AtomicI64,
    threshold: i64,
    fired: AtomicBool,
    fire_mu: Mutex<()>,
    callback: Box<dyn Fn() + Send + Sync>,
}

impl WarmFileCounter {
    /// `callback` runs the first time the count reaches `threshold` after a
    /// reset.
    pub fn new(threshold: i64, callback: impl Fn() + Send + Sync + 'static) -> Self {
        Self {
            count: AtomicI64::new(0),
            threshold: threshold.max(1),
            fired: AtomicBool::new(false),
            fire_mu: Mutex::new(()),
            callback: Box::new(callback),
        }
    }

    /// Atomically adds 1. Fires the callback when the post-increment value
    /// meets the threshold and it has not fired since the last reset.
    pub fn increment(&self) {
        let new_count = self.count.fetch_add(1, Ordering::SeqCst) + 1;

        if new_count >= self.threshold && !self.fired.load(Ordering::SeqCst) {
            let _guard = self.fire_mu.lock().unwrap();
            if !self.fired.load(Ordering::SeqCst) {
                self.fired.store(true, Ordering::SeqCst);
                (self.callback)();
            }
        }
    }

    pub fn count(&self) -> i64 {
        self.count.load(Ordering::SeqCst)
    }

    /// Zeroes the count and re-arms the callback.
    pub fn reset(&self) {
        let _guard = self.fire_mu.lock().unwrap();
        self.count.store(0, Ordering::SeqCst);
        self.fired.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    #[test]
    fn test_fires_exactly_at_threshold() {
        let fires = Arc::new(AtomicUsize::new(0));
        let fires_cb = fires.clone();
        let counter = WarmFileCounter::new(10, move || {
            fires_cb.fetch_add(1, Ordering::SeqCst);
        });

        for _ in 0..9 {
            counter.increment();
        }
        assert_eq!(fires.load(Ordering::SeqCst), 0, "must not fire below threshold");

        counter.increment();
        assert_eq!(fires.load(Ordering::SeqCst), 1);
        assert_eq!(counter.count(), 10);
    }

    #[test]
    fn test_fires_once_per_reset_cycle() {
        let fires = Arc::new(AtomicUsize::new(0));
        let fires_cb = fires.clone();
        let counter = WarmFileCounter::new(3, move || {
            fires_cb.fetch_add(1, Ordering::SeqCst);
        });

        for _ in 0..10 {
            counter.increment();
        }
        assert_eq!(fires.load(Ordering::SeqCst), 1, "past-threshold increments must not re-fire");

        counter.reset();
        assert_eq!(counter.count(), 0);

        for _ in 0..3 {
            counter.increment();
        }
        assert_eq!(fires.load(Ordering::SeqCst), 2, "reset re-arms the callback");
    }

    #[test]
    fn test_concurrent_increments_fire_once() {
        let fires = Arc::new(AtomicUsize::new(0));
        let fires_cb = fires.clone();
        let counter = Arc::new(WarmFileCounter::new(50, move || {
            fires_cb.fetch_add(1, Ordering::SeqCst);
        }));

        let handles: Vec<_> = (0..10)
            .map(|_| {
                let counter = counter.clone();
                std::thread::spawn(move || {
                    for _ in 0..20 {
                        counter.increment();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(counter.count(), 200);
        assert_eq!(fires.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_threshold_of_one() {
        let fires = Arc::new(AtomicUsize::new(0));
        let fires_cb = fires.clone();
        let counter = WarmFileCounter::new(1, move || {
            fires_cb.fetch_add(1, Ordering::SeqCst);
        });

        counter.increment();
        assert_eq!(fires.load(Ordering::SeqCst), 1);
    }
}
