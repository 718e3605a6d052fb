//! Every map implementation must behave identically through the
//! capability trait.

use maps::{ChainMap, FixedChainMap, FxMap, Map, ProbeMap};

fn exercise_basic<M: Map<u64, u64>>(map: &mut M) {
    assert!(map.is_empty());
    map.insert(10, 100).unwrap();
    map.insert(20, 200).unwrap();
    map.insert(10, 111).unwrap();
    assert_eq!(map.len(), 2);
    assert_eq!(map.find(&10), Some(&111));
    assert!(map.contains(&20));
    assert!(!map.contains(&30));

    *map.find_mut(&20).unwrap() += 1;
    assert_eq!(map.find(&20), Some(&201));

    let slot = map.get_or_default(30).unwrap();
    assert_eq!(*slot, 0);
    *slot = 300;
    assert_eq!(map.find(&30), Some(&300));
    assert_eq!(map.len(), 3);

    assert!(map.erase(&10));
    assert!(!map.erase(&10));
    assert_eq!(map.find(&10), None);
    assert_eq!(map.len(), 2);
}

#[test]
fn chain_map_satisfies_capability() {
    exercise_basic(&mut ChainMap::new(16));
}

#[test]
fn fixed_chain_map_satisfies_capability() {
    exercise_basic(&mut FixedChainMap::new(16));
}

#[test]
fn probe_map_satisfies_capability() {
    exercise_basic(&mut ProbeMap::new(16));
}

#[test]
fn fx_map_satisfies_capability() {
    exercise_basic(&mut FxMap::new());
}

/// xorshift64*, deterministic across runs.
struct Rng(u64);

impl Rng {
    fn next(&mut self) -> u64 {
        let mut x = self.0;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.0 = x;
        x.wrapping_mul(0x2545_F491_4F6C_DD1D)
    }
}

fn differential_against_baseline<M: Map<u64, u64>>(map: &mut M) {
    let mut baseline = FxMap::new();
    let mut rng = Rng(0xDEAD_BEEF);
    for _ in 0..20_000 {
        let key = rng.next() % 512;
        match rng.next() % 4 {
            0 => {
                let value = rng.next();
                map.insert(key, value).unwrap();
                baseline.insert(key, value).unwrap();
            }
            1 => {
                assert_eq!(map.erase(&key), baseline.erase(&key));
            }
            2 => {
                assert_eq!(map.find(&key), baseline.find(&key));
            }
            _ => {
                assert_eq!(map.contains(&key), baseline.contains(&key));
            }
        }
        assert_eq!(map.len(), baseline.len());
    }
}

#[test]
fn chain_map_matches_baseline() {
    differential_against_baseline(&mut ChainMap::new(64));
}

#[test]
fn fixed_chain_map_matches_baseline() {
    differential_against_baseline(&mut FixedChainMap::new(64));
}

#[test]
fn probe_map_matches_baseline() {
    differential_against_baseline(&mut ProbeMap::new(64));
}
