//! Lock-free single-producer single-consumer ring

use crate::Queue;
use crossbeam_utils::CachePadded;
use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Wait-free bounded ring for exactly one producer thread and one
/// consumer thread.
///
/// The producer owns `tail` (release store after writing the slot), the
/// consumer owns `head` (release store after reading it); each only ever
/// acquires the other's cursor. Cursors grow without wrapping, the slot
/// index is cursor-and-mask, so full is `tail - head == capacity` and
/// empty is `head == tail`. The cursors live on separate cache lines to
/// keep the two threads from false sharing.
///
/// Calling `enqueue` from more than one thread, or `dequeue` from more
/// than one thread, breaks the ownership argument; use
/// [`crate::MpmcRing`] there instead.
pub struct SpscRing<T> {
    buffer: Box<[UnsafeCell<MaybeUninit<T>>]>,
    mask: usize,
    head: CachePadded<AtomicUsize>,
    tail: CachePadded<AtomicUsize>,
}

unsafe impl<T: Send> Send for SpscRing<T> {}
unsafe impl<T: Send> Sync for SpscRing<T> {}

impl<T> SpscRing<T> {
    /// Create a ring with the given power-of-two capacity.
    pub fn new(capacity: usize) -> Self {
        assert!(
            capacity.is_power_of_two(),
            "ring capacity must be a power of two"
        );
        let buffer: Box<[UnsafeCell<MaybeUninit<T>>]> = (0..capacity)
            .map(|_| UnsafeCell::new(MaybeUninit::uninit()))
            .collect();
        Self {
            buffer,
            mask: capacity - 1,
            head: CachePadded::new(AtomicUsize::new(0)),
            tail: CachePadded::new(AtomicUsize::new(0)),
        }
    }

    /// Fixed capacity chosen at construction.
    pub fn capacity(&self) -> usize {
        self.mask + 1
    }

    /// True when nothing is queued. Advisory under concurrency.
    pub fn is_empty(&self) -> bool {
        self.head.load(Ordering::Relaxed) == self.tail.load(Ordering::Relaxed)
    }
}

impl<T: Send> Queue<T> for SpscRing<T> {
    fn enqueue(&self, item: T) -> Result<(), T> {
        let tail = self.tail.load(Ordering::Relaxed);
        let head = self.head.load(Ordering::Acquire);
        if tail.wrapping_sub(head) == self.capacity() {
            return Err(item);
        }
        unsafe {
            (*self.buffer[tail & self.mask].get()).write(item);
        }
        self.tail.store(tail.wrapping_add(1), Ordering::Release);
        Ok(())
    }

    fn dequeue(&self) -> Option<T> {
        let head = self.head.load(Ordering::Relaxed);
        let tail = self.tail.load(Ordering::Acquire);
        if head == tail {
            return None;
        }
        let item = unsafe { (*self.buffer[head & self.mask].get()).assume_init_read() };
        self.head.store(head.wrapping_add(1), Ordering::Release);
        Some(item)
    }
}

impl<T> Drop for SpscRing<T> {
    fn drop(&mut self) {
        // Undelivered items still own their payloads.
        let mut head = *self.head.get_mut();
        let tail = *self.tail.get_mut();
        while head != tail {
            unsafe {
                (*self.buffer[head & self.mask].get()).assume_init_drop();
            }
            head = head.wrapping_add(1);
        }
    }
}
