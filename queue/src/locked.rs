//! Mutex-and-condvar queue variant

use crate::Queue;
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::time::Duration;

/// Bounded FIFO behind a mutex, with a condition variable for consumers
/// that prefer to block instead of spinning. Any number of producers and
/// consumers.
pub struct LockedQueue<T> {
    inner: Mutex<VecDeque<T>>,
    capacity: usize,
    available: Condvar,
}

impl<T> LockedQueue<T> {
    /// Create a queue holding at most `capacity` items.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "queue capacity must be non-zero");
        Self {
            inner: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            available: Condvar::new(),
        }
    }

    /// Block until an item is available.
    pub fn dequeue_blocking(&self) -> T {
        let mut inner = self.inner.lock();
        while inner.is_empty() {
            self.available.wait(&mut inner);
        }
        inner.pop_front().expect("non-empty after wait")
    }

    /// Block until an item is available or the timeout elapses.
    pub fn dequeue_timeout(&self, timeout: Duration) -> Option<T> {
        let mut inner = self.inner.lock();
        if inner.is_empty() {
            let _ = self.available.wait_for(&mut inner, timeout);
        }
        inner.pop_front()
    }

    /// Number of queued items.
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    /// True when nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}

impl<T: Send> Queue<T> for LockedQueue<T> {
    fn enqueue(&self, item: T) -> Result<(), T> {
        let mut inner = self.inner.lock();
        if inner.len() == self.capacity {
            return Err(item);
        }
        inner.push_back(item);
        drop(inner);
        self.available.notify_one();
        Ok(())
    }

    fn dequeue(&self) -> Option<T> {
        self.inner.lock().pop_front()
    }
}
