//! Hash map family
//!
//! Four implementations behind one capability so callers can swap them
//! per hot path: growable chaining, fixed-node chaining (the order book's
//! choice), open addressing with tombstones, and the `FxHashMap`
//! baseline. Bucket counts are powers of two; hashes are reduced by mask.

#![deny(warnings)]
#![deny(clippy::all)]

pub mod chain;
pub mod fixed;
pub mod fx;
pub mod probe;

pub use chain::ChainMap;
pub use fixed::FixedChainMap;
pub use fx::FxMap;
pub use probe::ProbeMap;

use common::Result;
use rustc_hash::FxHasher;
use std::hash::{Hash, Hasher};

/// Capability shared by every map implementation.
pub trait Map<K: Hash + Eq, V> {
    /// Insert or replace the value under `key`. Only the fixed-node
    /// variant can fail, with `ResourceExhausted`, when its node pool is
    /// dry.
    fn insert(&mut self, key: K, value: V) -> Result<()>;

    /// True when `key` is present.
    fn contains(&self, key: &K) -> bool;

    /// Remove `key`, reporting whether it was present.
    fn erase(&mut self, key: &K) -> bool;

    /// Borrow the value under `key`.
    fn find(&self, key: &K) -> Option<&V>;

    /// Mutably borrow the value under `key`.
    fn find_mut(&mut self, key: &K) -> Option<&mut V>;

    /// Borrow the value under `key`, inserting a default first when
    /// absent.
    fn get_or_default(&mut self, key: K) -> Result<&mut V>
    where
        V: Default;

    /// Number of live entries.
    fn len(&self) -> usize;

    /// True when no entries are live.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Reduce a key's Fx hash to a bucket index by mask.
pub(crate) fn bucket_index<K: Hash>(key: &K, mask: usize) -> usize {
    let mut hasher = FxHasher::default();
    key.hash(&mut hasher);
    hasher.finish() as usize & mask
}

pub(crate) fn assert_power_of_two(buckets: usize) {
    assert!(
        buckets > 0 && buckets.is_power_of_two(),
        "bucket count must be a non-zero power of two"
    );
}
