//! Baseline map over `rustc_hash::FxHashMap`

use crate::Map;
use common::Result;
use rustc_hash::FxHashMap;
use std::hash::Hash;

/// Reference implementation of the map capability; the custom variants
/// are benchmarked and property-tested against it.
#[derive(Default)]
pub struct FxMap<K, V> {
    inner: FxHashMap<K, V>,
}

impl<K: Hash + Eq, V> FxMap<K, V> {
    /// Create an empty map.
    pub fn new() -> Self {
        Self {
            inner: FxHashMap::default(),
        }
    }
}

impl<K: Hash + Eq, V> Map<K, V> for FxMap<K, V> {
    fn insert(&mut self, key: K, value: V) -> Result<()> {
        self.inner.insert(key, value);
        Ok(())
    }

    fn contains(&self, key: &K) -> bool {
        self.inner.contains_key(key)
    }

    fn erase(&mut self, key: &K) -> bool {
        self.inner.remove(key).is_some()
    }

    fn find(&self, key: &K) -> Option<&V> {
        self.inner.get(key)
    }

    fn find_mut(&mut self, key: &K) -> Option<&mut V> {
        self.inner.get_mut(key)
    }

    fn get_or_default(&mut self, key: K) -> Result<&mut V>
    where
        V: Default,
    {
        Ok(self.inner.entry(key).or_default())
    }

    fn len(&self) -> usize {
        self.inner.len()
    }
}
