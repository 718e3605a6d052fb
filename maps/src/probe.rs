//! Open-addressing map with linear probing and tombstones

use crate::{assert_power_of_two, bucket_index, Map};
use common::Result;
use std::hash::Hash;

/// Load factor beyond which the table doubles.
const MAX_LOAD: f32 = 0.7;

enum Entry<K, V> {
    Empty,
    Occupied { key: K, value: V },
    Tombstone,
}

/// Linear-probing map. Erase leaves a tombstone so later probes keep
/// walking; rehash doubles the table and drops the tombstones.
pub struct ProbeMap<K, V> {
    table: Vec<Entry<K, V>>,
    mask: usize,
    len: usize,
}

struct Probe {
    found: Option<usize>,
    insert_at: usize,
}

impl<K: Hash + Eq, V> ProbeMap<K, V> {
    /// Create a map with an initial table of `buckets` slots (power of
    /// two).
    pub fn new(buckets: usize) -> Self {
        assert_power_of_two(buckets);
        Self {
            table: (0..buckets).map(|_| Entry::Empty).collect(),
            mask: buckets - 1,
            len: 0,
        }
    }

    /// Current table width, including empty and tombstone slots.
    pub fn table_len(&self) -> usize {
        self.table.len()
    }

    fn probe(&self, key: &K) -> Probe {
        let start = bucket_index(key, self.mask);
        let mut index = start;
        let mut first_reusable = None;
        loop {
            match &self.table[index] {
                Entry::Empty => {
                    return Probe {
                        found: None,
                        insert_at: first_reusable.unwrap_or(index),
                    };
                }
                Entry::Tombstone => {
                    if first_reusable.is_none() {
                        first_reusable = Some(index);
                    }
                }
                Entry::Occupied { key: occupant, .. } if occupant == key => {
                    return Probe {
                        found: Some(index),
                        insert_at: index,
                    };
                }
                Entry::Occupied { .. } => {}
            }
            index = (index + 1) & self.mask;
            if index == start {
                // No empty slot left; the load cap guarantees a tombstone.
                return Probe {
                    found: None,
                    insert_at: first_reusable.expect("table saturated without tombstones"),
                };
            }
        }
    }

    fn maybe_rehash(&mut self) {
        if (self.len + 1) as f32 <= self.table.len() as f32 * MAX_LOAD {
            return;
        }
        let doubled = self.table.len() * 2;
        let old = std::mem::replace(
            &mut self.table,
            (0..doubled).map(|_| Entry::Empty).collect(),
        );
        self.mask = doubled - 1;
        for entry in old {
            if let Entry::Occupied { key, value } = entry {
                // Fresh table has no tombstones: probe to the first empty.
                let mut index = bucket_index(&key, self.mask);
                while !matches!(self.table[index], Entry::Empty) {
                    index = (index + 1) & self.mask;
                }
                self.table[index] = Entry::Occupied { key, value };
            }
        }
    }
}

impl<K: Hash + Eq, V> Map<K, V> for ProbeMap<K, V> {
    fn insert(&mut self, key: K, value: V) -> Result<()> {
        self.maybe_rehash();
        let probe = self.probe(&key);
        match probe.found {
            Some(index) => {
                self.table[index] = Entry::Occupied { key, value };
            }
            None => {
                self.table[probe.insert_at] = Entry::Occupied { key, value };
                self.len += 1;
            }
        }
        Ok(())
    }

    fn contains(&self, key: &K) -> bool {
        self.probe(key).found.is_some()
    }

    fn erase(&mut self, key: &K) -> bool {
        match self.probe(key).found {
            Some(index) => {
                self.table[index] = Entry::Tombstone;
                self.len -= 1;
                true
            }
            None => false,
        }
    }

    fn find(&self, key: &K) -> Option<&V> {
        self.probe(key).found.map(|index| match &self.table[index] {
            Entry::Occupied { value, .. } => value,
            _ => unreachable!("probe returned a non-occupied slot"),
        })
    }

    fn find_mut(&mut self, key: &K) -> Option<&mut V> {
        let index = self.probe(key).found?;
        match &mut self.table[index] {
            Entry::Occupied { value, .. } => Some(value),
            _ => unreachable!("probe returned a non-occupied slot"),
        }
    }

    fn get_or_default(&mut self, key: K) -> Result<&mut V>
    where
        V: Default,
    {
        self.maybe_rehash();
        let probe = self.probe(&key);
        let index = match probe.found {
            Some(index) => index,
            None => {
                self.table[probe.insert_at] = Entry::Occupied {
                    key,
                    value: V::default(),
                };
                self.len += 1;
                probe.insert_at
            }
        };
        match &mut self.table[index] {
            Entry::Occupied { value, .. } => Ok(value),
            _ => unreachable!("slot was just occupied"),
        }
    }

    fn len(&self) -> usize {
        self.len
    }
}
