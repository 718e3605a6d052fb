//! Array-index lock-free pool variant

use crate::lease::PoolCore;
use crossbeam_utils::CachePadded;
use std::cell::UnsafeCell;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicI64, AtomicU32, Ordering};

/// Free-slot array with a signed atomic top-of-stack index.
///
/// Simpler than [`crate::TaggedPool`] but exposed to ABA when several
/// threads release and re-acquire the same slot between a reader's load
/// and its CAS: the untagged top can return to a prior value and let a
/// stale CAS through, handing one slot to two callers. Restrict this
/// variant to workloads where acquire and release each stay on one side
/// (one allocating thread, one releasing thread) and reach for the tagged
/// pool everywhere else.
pub struct IndexPool<T> {
    slots: Box<[UnsafeCell<T>]>,
    free: Box<[AtomicU32]>,
    top: CachePadded<AtomicI64>,
}

unsafe impl<T: Send> Send for IndexPool<T> {}
unsafe impl<T: Send> Sync for IndexPool<T> {}

impl<T: Default> IndexPool<T> {
    /// Pre-allocate `capacity` slots, all free.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "pool capacity must be non-zero");
        assert!(capacity < u32::MAX as usize, "pool capacity too large");
        let slots: Box<[UnsafeCell<T>]> =
            (0..capacity).map(|_| UnsafeCell::new(T::default())).collect();
        let free: Box<[AtomicU32]> = (0..capacity as u32).map(AtomicU32::new).collect();
        Self {
            slots,
            free,
            top: CachePadded::new(AtomicI64::new(capacity as i64 - 1)),
        }
    }
}

impl<T: Send> PoolCore for IndexPool<T> {
    type Item = T;

    fn acquire(&self) -> Option<u32> {
        let mut top = self.top.load(Ordering::Acquire);
        while top >= 0 {
            let index = self.free[top as usize].load(Ordering::Relaxed);
            match self
                .top
                .compare_exchange_weak(top, top - 1, Ordering::Acquire, Ordering::Relaxed)
            {
                Ok(_) => return Some(index),
                Err(current) => top = current,
            }
        }
        None
    }

    fn release(&self, index: u32) {
        debug_assert!((index as usize) < self.slots.len(), "foreign slot index");
        let mut top = self.top.load(Ordering::Relaxed);
        loop {
            let next = top + 1;
            debug_assert!(
                (next as usize) < self.free.len(),
                "free stack overflow: release without matching acquire"
            );
            self.free[next as usize].store(index, Ordering::Relaxed);
            match self
                .top
                .compare_exchange_weak(top, next, Ordering::Release, Ordering::Relaxed)
            {
                Ok(_) => return,
                Err(current) => top = current,
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
