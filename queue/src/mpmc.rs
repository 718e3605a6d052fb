//! Lock-free bounded MPMC ring (Vyukov-style)

use crate::Queue;
use crossbeam_utils::CachePadded;
use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicUsize, Ordering};

struct Slot<T> {
    sequence: AtomicUsize,
    value: UnsafeCell<MaybeUninit<T>>,
}

/// Bounded ring safe for any number of producers and consumers.
///
/// Every slot carries a sequence counter initialized to its index. A
/// producer claims slot `tail & mask` when `slot.sequence == tail` by
/// CASing the tail forward, writes the value, then publishes
/// `sequence = tail + 1`. A consumer claims slot `head & mask` when
/// `slot.sequence == head + 1`, reads the value, then publishes
/// `sequence = head + capacity` to hand the slot to the producer of the
/// next lap. Each step is wait-free once the CAS wins; full and empty
/// fail fast via the sequence comparison. FIFO order is strict.
pub struct MpmcRing<T> {
    buffer: Box<[Slot<T>]>,
    mask: usize,
    tail: CachePadded<AtomicUsize>,
    head: CachePadded<AtomicUsize>,
}

unsafe impl<T: Send> Send for MpmcRing<T> {}
unsafe impl<T: Send> Sync for MpmcRing<T> {}

impl<T> MpmcRing<T> {
    /// Create a ring with the given power-of-two capacity.
    pub fn new(capacity: usize) -> Self {
        assert!(
            capacity.is_power_of_two(),
            "ring capacity must be a power of two"
        );
        let buffer: Box<[Slot<T>]> = (0..capacity)
            .map(|i| Slot {
                sequence: AtomicUsize::new(i),
                value: UnsafeCell::new(MaybeUninit::uninit()),
            })
            .collect();
        Self {
            buffer,
            mask: capacity - 1,
            tail: CachePadded::new(AtomicUsize::new(0)),
            head: CachePadded::new(AtomicUsize::new(0)),
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

impl<T: Send> Queue<T> for MpmcRing<T> {
    fn enqueue(&self, item: T) -> Result<(), T> {
        let mut pos = self.tail.load(Ordering::Relaxed);
        loop {
            let slot = &self.buffer[pos & self.mask];
            let sequence = slot.sequence.load(Ordering::Acquire);
            let diff = sequence as isize - pos as isize;
            match diff.cmp(&0) {
                std::cmp::Ordering::Equal => {
                    match self.tail.compare_exchange_weak(
                        pos,
                        pos.wrapping_add(1),
                        Ordering::Relaxed,
                        Ordering::Relaxed,
                    ) {
                        Ok(_) => {
                            unsafe {
                                (*slot.value.get()).write(item);
                            }
                            slot.sequence.store(pos.wrapping_add(1), Ordering::Release);
                            return Ok(());
                        }
                        Err(current) => pos = current,
                    }
                }
                // The slot still holds the previous lap: the ring is full.
                std::cmp::Ordering::Less => return Err(item),
                std::cmp::Ordering::Greater => {
                    pos = self.tail.load(Ordering::Relaxed);
                }
            }
        }
    }

    fn dequeue(&self) -> Option<T> {
        let mut pos = self.head.load(Ordering::Relaxed);
        loop {
            let slot = &self.buffer[pos & self.mask];
            let sequence = slot.sequence.load(Ordering::Acquire);
            let diff = sequence as isize - pos.wrapping_add(1) as isize;
            match diff.cmp(&0) {
                std::cmp::Ordering::Equal => {
                    match self.head.compare_exchange_weak(
                        pos,
                        pos.wrapping_add(1),
                        Ordering::Relaxed,
                        Ordering::Relaxed,
                    ) {
                        Ok(_) => {
                            let item = unsafe { (*slot.value.get()).assume_init_read() };
                            slot.sequence
                                .store(pos.wrapping_add(self.capacity()), Ordering::Release);
                            return Some(item);
                        }
                        Err(current) => pos = current,
                    }
                }
                std::cmp::Ordering::Less => return None,
                std::cmp::Ordering::Greater => {
                    pos = self.head.load(Ordering::Relaxed);
                }
            }
        }
    }
}

impl<T> Drop for MpmcRing<T> {
    fn drop(&mut self) {
        let mut head = *self.head.get_mut();
        let tail = *self.tail.get_mut();
        while head != tail {
            let slot = &mut self.buffer[head & self.mask];
            // Only slots whose write was published still hold a value.
            if *slot.sequence.get_mut() == head.wrapping_add(1) {
                unsafe {
                    (*slot.value.get()).assume_init_drop();
                }
            }
            head = head.wrapping_add(1);
        }
    }
}
