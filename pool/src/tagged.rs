//! Canonical lock-free MPMC pool with an ABA-defeating tagged head

use crate::lease::PoolCore;
use crossbeam_utils::CachePadded;
use std::cell::UnsafeCell;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

/// Index sentinel marking an empty free list.
const NIL: u32 = u32::MAX;

#[inline]
fn pack(index: u32, tag: u32) -> u64 {
    (u64::from(tag) << 32) | u64::from(index)
}

#[inline]
fn unpack(word: u64) -> (u32, u32) {
    (word as u32, (word >> 32) as u32)
}

/// Lock-free pool safe for concurrent allocation and release from any
/// number of threads.
///
/// The free list is threaded through `next_free`; its head lives in one
/// 64-bit atomic packing `(tag << 32) | index`. Every successful
/// transition bumps the tag, so two interleaved acquire/release pairs that
/// bring the same index back to the head still produce distinct head
/// words and a stale CAS cannot succeed.
pub struct TaggedPool<T> {
    slots: Box<[UnsafeCell<T>]>,
    next_free: Box<[AtomicU32]>,
    head: CachePadded<AtomicU64>,
}

unsafe impl<T: Send> Send for TaggedPool<T> {}
unsafe impl<T: Send> Sync for TaggedPool<T> {}

impl<T: Default> TaggedPool<T> {
    /// Pre-allocate `capacity` slots, all free.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "pool capacity must be non-zero");
        assert!(capacity < NIL as usize, "pool capacity too large");
        let slots: Box<[UnsafeCell<T>]> =
            (0..capacity).map(|_| UnsafeCell::new(T::default())).collect();
        // Slot i links to i - 1, slot 0 terminates the list; the head
        // starts at the highest index with tag zero.
        let next_free: Box<[AtomicU32]> = (0..capacity as u32)
            .map(|i| AtomicU32::new(if i == 0 { NIL } else { i - 1 }))
            .collect();
        Self {
            slots,
            next_free,
            head: CachePadded::new(AtomicU64::new(pack(capacity as u32 - 1, 0))),
        }
    }
}

impl<T: Send> PoolCore for TaggedPool<T> {
    type Item = T;

    fn acquire(&self) -> Option<u32> {
        let mut head = self.head.load(Ordering::Acquire);
        loop {
            let (index, tag) = unpack(head);
            if index == NIL {
                return None;
            }
            let next = self.next_free[index as usize].load(Ordering::Relaxed);
            let new_head = pack(next, tag.wrapping_add(1));
            match self.head.compare_exchange_weak(
                head,
                new_head,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return Some(index),
                Err(current) => head = current,
            }
        }
    }

    fn release(&self, index: u32) {
        debug_assert!((index as usize) < self.slots.len(), "foreign slot index");
        let mut head = self.head.load(Ordering::Acquire);
        loop {
            let (head_index, tag) = unpack(head);
            self.next_free[index as usize].store(head_index, Ordering::Relaxed);
            let new_head = pack(index, tag.wrapping_add(1));
            match self.head.compare_exchange_weak(
                head,
                new_head,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return,
                Err(current) => head = current,
            }
        }
    }

    fn slot(&self, index: u32) -> NonNull<T> {
        unsafe { NonNull::new_unchecked(self.slots[index as usize].get()) }
    }

    fn capacity(&self) -> usize {
        self.slots.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lease::PoolAlloc;
    use std::sync::Arc;

    #[test]
    fn test_exhaustion_returns_none() {
        let pool = Arc::new(TaggedPool::<u64>::new(3));
        let held: Vec<_> = (0..3).map(|_| pool.allocate().unwrap()).collect();
        assert!(pool.allocate().is_none());
        drop(held);
        assert!(pool.allocate().is_some());
    }

    #[test]
    fn test_acquired_indices_are_distinct() {
        let pool = TaggedPool::<u64>::new(16);
        let mut seen = Vec::new();
        while let Some(index) = pool.acquire() {
            assert!(!seen.contains(&index), "index {index} handed out twice");
            seen.push(index);
        }
        assert_eq!(seen.len(), 16);
        for index in seen {
            pool.release(index);
        }
    }

    #[test]
    fn test_tag_strictly_increases() {
        let pool = TaggedPool::<u64>::new(4);
        let mut last_tag = unpack(pool.head.load(Ordering::Acquire)).1;
        for _ in 0..100 {
            let index = pool.acquire().unwrap();
            let tag = unpack(pool.head.load(Ordering::Acquire)).1;
            assert!(tag > last_tag);
            last_tag = tag;
            pool.release(index);
            let tag = unpack(pool.head.load(Ordering::Acquire)).1;
            assert!(tag > last_tag);
            last_tag = tag;
        }
    }

    #[test]
    fn test_interleaved_pairs_produce_distinct_head_words() {
        // The ABA shape: the same index returns to the head twice; the tag
        // keeps the two head words distinct.
        let pool = TaggedPool::<u64>::new(2);
        let first = pool.head.load(Ordering::Acquire);
        let index = pool.acquire().unwrap();
        pool.release(index);
        let second = pool.head.load(Ordering::Acquire);
        assert_eq!(unpack(first).0, unpack(second).0);
        assert_ne!(first, second);
    }
}
