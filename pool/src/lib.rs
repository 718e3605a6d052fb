//! Fixed-capacity object pool family
//!
//! All variants share one contract: `allocate` hands out an owning
//! [`Lease`] over a pre-allocated slot, or `None` when the pool is
//! exhausted; the slot returns to the free set when the lease is dropped.
//! A record therefore has exactly one owner at every instant and a
//! double release is unrepresentable.

#![deny(warnings)]
#![deny(clippy::all)]

pub mod index;
pub mod lease;
pub mod locked;
pub mod tagged;

pub use index::IndexPool;
pub use lease::{Lease, PoolAlloc, PoolCore};
pub use locked::LockedPool;
pub use tagged::TaggedPool;
