//! Pool capability and the owning slot handle

use std::fmt;
use std::ops::{Deref, DerefMut};
use std::ptr::NonNull;
use std::sync::Arc;

/// Slot bookkeeping implemented by every pool variant.
///
/// `acquire`/`release` move slot indices between the free set and the
/// in-use set; `slot` maps an index to its backing storage. The two sets
/// are disjoint and together cover the pool exactly. Callers never touch
/// this trait directly; [`PoolAlloc::allocate`] wraps an acquired index in
/// a [`Lease`] which releases it on drop.
pub trait PoolCore: Send + Sync {
    /// Record type held in each slot.
    type Item;

    /// Pop a free slot index, or `None` when the pool is exhausted.
    fn acquire(&self) -> Option<u32>;

    /// Return a slot index to the free set.
    ///
    /// The index must have come from `acquire` on the same pool and must
    /// not be released twice; the `Lease` discipline guarantees both.
    fn release(&self, index: u32);

    /// Backing storage of a slot.
    fn slot(&self, index: u32) -> NonNull<Self::Item>;

    /// Fixed capacity chosen at construction.
    fn capacity(&self) -> usize;
}

/// Allocation entry point for shared pools.
pub trait PoolAlloc<P: PoolCore> {
    /// Lease a free slot, or `None` when the pool is exhausted. Callers
    /// must treat `None` as backpressure: yield, drop, or signal upstream.
    fn allocate(&self) -> Option<Lease<P>>;
}

impl<P: PoolCore> PoolAlloc<P> for Arc<P> {
    fn allocate(&self) -> Option<Lease<P>> {
        let index = self.acquire()?;
        let ptr = self.slot(index);
        Some(Lease {
            pool: Arc::clone(self),
            index,
            ptr,
        })
    }
}

/// Owning handle over one pool slot.
///
/// Moves freely between threads and through queues; dereferences to the
/// record; gives the slot back when dropped. Not clonable: a leased slot
/// has exactly one owner until release.
pub struct Lease<P: PoolCore> {
    pool: Arc<P>,
    index: u32,
    ptr: NonNull<P::Item>,
}

// A lease is the unique owner of its slot, so sending it between threads
// moves the contained Item, and sharing it shares the Item.
unsafe impl<P: PoolCore> Send for Lease<P> where P::Item: Send {}
unsafe impl<P: PoolCore> Sync for Lease<P> where P::Item: Sync {}

impl<P: PoolCore> Lease<P> {
    /// Slot index inside the owning pool.
    pub fn index(&self) -> u32 {
        self.index
    }

    /// Explicitly return the slot to the pool. Equivalent to dropping.
    pub fn release(self) {}
}

impl<P: PoolCore> Deref for Lease<P> {
    type Target = P::Item;

    #[inline]
    fn deref(&self) -> &P::Item {
        // Unique ownership of the slot is guaranteed by construction.
        unsafe { self.ptr.as_ref() }
    }
}

impl<P: PoolCore> DerefMut for Lease<P> {
    #[inline]
    fn deref_mut(&mut self) -> &mut P::Item {
        unsafe { self.ptr.as_mut() }
    }
}

impl<P: PoolCore> Drop for Lease<P> {
    fn drop(&mut self) {
        self.pool.release(self.index);
    }
}

impl<P: PoolCore> fmt::Debug for Lease<P>
where
    P::Item: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lease")
            .field("index", &self.index)
            .field("item", &**self)
            .finish()
    }
}
