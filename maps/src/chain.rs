//! Growable separate-chaining map

use crate::{assert_power_of_two, bucket_index, Map};
use common::Result;
use std::hash::Hash;

/// Fixed bucket array of growable chains. Chains allocate as they grow,
/// so this variant never refuses an insert.
pub struct ChainMap<K, V> {
    buckets: Vec<Vec<(K, V)>>,
    mask: usize,
    len: usize,
}

impl<K: Hash + Eq, V> ChainMap<K, V> {
    /// Create a map with `buckets` chains (power of two).
    pub fn new(buckets: usize) -> Self {
        assert_power_of_two(buckets);
        Self {
            buckets: (0..buckets).map(|_| Vec::new()).collect(),
            mask: buckets - 1,
            len: 0,
        }
    }
}

impl<K: Hash + Eq, V> Map<K, V> for ChainMap<K, V> {
    fn insert(&mut self, key: K, value: V) -> Result<()> {
        let bucket = &mut self.buckets[bucket_index(&key, self.mask)];
        for entry in bucket.iter_mut() {
            if entry.0 == key {
                entry.1 = value;
                return Ok(());
            }
        }
        bucket.push((key, value));
        self.len += 1;
        Ok(())
    }

    fn contains(&self, key: &K) -> bool {
        self.buckets[bucket_index(key, self.mask)]
            .iter()
            .any(|(k, _)| k == key)
    }

    fn erase(&mut self, key: &K) -> bool {
        let bucket = &mut self.buckets[bucket_index(key, self.mask)];
        match bucket.iter().position(|(k, _)| k == key) {
            Some(position) => {
                bucket.swap_remove(position);
                self.len -= 1;
                true
            }
            None => false,
        }
    }

    fn find(&self, key: &K) -> Option<&V> {
        self.buckets[bucket_index(key, self.mask)]
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    fn find_mut(&mut self, key: &K) -> Option<&mut V> {
        self.buckets[bucket_index(key, self.mask)]
            .iter_mut()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    fn get_or_default(&mut self, key: K) -> Result<&mut V>
    where
        V: Default,
    {
        let index = bucket_index(&key, self.mask);
        let position = self.buckets[index].iter().position(|(k, _)| *k == key);
        let position = match position {
            Some(position) => position,
            None => {
                self.buckets[index].push((key, V::default()));
                self.len += 1;
                self.buckets[index].len() - 1
            }
        };
        Ok(&mut self.buckets[index][position].1)
    }

    fn len(&self) -> usize {
        self.len
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_replaces_existing() {
        let mut map = ChainMap::new(8);
        map.insert(1u64, "a").unwrap();
        map.insert(1u64, "b").unwrap();
        assert_eq!(map.len(), 1);
        assert_eq!(map.find(&1), Some(&"b"));
    }

    #[test]
    fn test_colliding_keys_share_a_bucket() {
        // With two buckets most keys collide; the chains must still keep
        // every entry reachable.
        let mut map = ChainMap::new(2);
        for key in 0u64..100 {
            map.insert(key, key * 2).unwrap();
        }
        assert_eq!(map.len(), 100);
        for key in 0u64..100 {
            assert_eq!(map.find(&key), Some(&(key * 2)));
        }
        assert!(map.erase(&57));
        assert!(!map.contains(&57));
        assert_eq!(map.len(), 99);
    }
}
