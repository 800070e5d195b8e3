use super::*;

use crate::address::pack_value_word;
use crate::index::HashIndex;
use proptest::prelude::*;
use proptest_derive::Arbitrary;
use std::collections::BTreeMap;

#[derive(Clone, Copy, Debug, Arbitrary)]
enum Backing {
    Heap,
    Raw,
}

#[derive(Clone, Debug)]
enum Op {
    Store(Vec<u8>, Vec<u8>),
    Lookup(Vec<u8>),
}

fn key_strategy() -> impl Strategy<Value = Vec<u8>> + Clone {
    // A small alphabet so stores regularly hit existing keys.
    prop::collection::vec(0u8..4, 0..=12)
}

fn ops_strategy() -> impl Strategy<Value = Vec<Op>> {
    let key = key_strategy();
    let op = prop_oneof![
        60 => (key.clone(), prop::collection::vec(any::<u8>(), 0..=40))
            .prop_map(|(k, v)| Op::Store(k, v)),
        40 => key.prop_map(Op::Lookup),
    ];
    prop::collection::vec(op, 0..=1500)
}

fn run_ops(
    allocator: &dyn MemoryAllocator,
    ops: Vec<Op>,
) -> std::result::Result<(), TestCaseError> {
    let config = Config {
        page_size: 256,
        ..Config::default()
    };
    let mut map = BytesToBytesMap::with_config(allocator, config).unwrap();
    let mut model: BTreeMap<Vec<u8>, Vec<u8>> = BTreeMap::new();

    for op in ops {
        match op {
            Op::Store(key, value) => {
                let mut loc = map.lookup(&key);
                prop_assert_eq!(loc.is_defined(), model.contains_key(&key));
                let stored = loc.store_key_and_value(&key, &value);
                if model.contains_key(&key) {
                    prop_assert_eq!(stored, Err(Error::AlreadyDefined));
                } else {
                    prop_assert_eq!(stored, Ok(()));
                    prop_assert_eq!(loc.value(), Some(value.as_slice()));
                    model.insert(key, value);
                }
            }
            Op::Lookup(key) => {
                let loc = map.lookup(&key);
                prop_assert_eq!(loc.value(), model.get(&key).map(Vec::as_slice));
                prop_assert_eq!(loc.key_length(), model.get(&key).map(|_| key.len()));
            }
        }
        prop_assert_eq!(map.len(), model.len());
    }

    let mut got: Vec<(Vec<u8>, Vec<u8>)> =
        map.iter().map(|(k, v)| (k.to_vec(), v.to_vec())).collect();
    got.sort();
    let expected: Vec<(Vec<u8>, Vec<u8>)> = model.into_iter().collect();
    prop_assert_eq!(got, expected);
    map.free();
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 256,
        max_shrink_iters: 50_000,
        .. ProptestConfig::default()
    })]

    #[test]
    fn prop_equivalence(backing: Backing, ops in ops_strategy()) {
        match backing {
            Backing::Heap => {
                let allocator = HeapAllocator::new();
                run_ops(&allocator, ops)?;
                prop_assert_eq!(allocator.stats().outstanding_blocks, 0);
            }
            Backing::Raw => {
                let allocator = RawAllocator::new();
                run_ops(&allocator, ops)?;
                prop_assert_eq!(allocator.stats().outstanding_blocks, 0);
            }
        }
    }

    #[test]
    fn prop_distinct_keys_survive_growth(
        backing: Backing,
        keys in prop::collection::btree_set(prop::collection::vec(any::<u8>(), 0..=24), 0..=600),
    ) {
        let heap = HeapAllocator::new();
        let raw = RawAllocator::new();
        let allocator: &dyn MemoryAllocator = match backing {
            Backing::Heap => &heap,
            Backing::Raw => &raw,
        };
        let mut map = BytesToBytesMap::new(allocator, 0).unwrap();
        for key in &keys {
            let mut loc = map.lookup(key);
            prop_assert!(!loc.is_defined());
            loc.store_key_and_value(key, key).unwrap();
        }
        prop_assert_eq!(map.len(), keys.len());
        prop_assert!(map.len() <= (map.capacity() as f64 * DEFAULT_LOAD_FACTOR) as usize);
        for key in &keys {
            prop_assert_eq!(map.get(key), Some(key.as_slice()));
        }
    }

    #[test]
    fn prop_probe_reaches_last_free_slot(bits in 6u32..=10, free in any::<prop::sample::Index>()) {
        let capacity = 1usize << bits;
        let free = free.index(capacity);
        let allocator = HeapAllocator::new();
        let mut index = HashIndex::allocate(&allocator, capacity).unwrap();
        for pos in (0..capacity).filter(|&pos| pos != free) {
            // Stored hash codes never equal a probed one below the capacity.
            index.insert(pos, 0, pack_value_word(0, u32::MAX));
        }
        for start in 0..capacity as u32 {
            prop_assert_eq!(index.find(start, |_| false), (free, false));
            prop_assert_eq!(index.free_slot(start), free);
        }
        index.free(&allocator);
    }
}

#[test]
fn exhaustive_growth_boundaries() {
    // Every size that ends right before or right after a growth step.
    for n in [44usize, 45, 89, 90, 179, 180, 358, 359] {
        let allocator = RawAllocator::new();
        let mut map = BytesToBytesMap::new(&allocator, 64).unwrap();
        for i in 0..n as u64 {
            let key = i.to_be_bytes();
            map.lookup(&key).store_key_and_value(&key, &[i as u8; 3]).unwrap();
        }
        assert_eq!(map.len(), n);
        for i in 0..n as u64 {
            assert_eq!(map.get(&i.to_be_bytes()), Some(&[i as u8; 3][..]), "n={n} i={i}");
        }
        map.free();
        assert_eq!(allocator.stats().outstanding_bytes, 0);
    }
}
