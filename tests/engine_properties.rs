// ==============================================
// ENGINE PROPERTY TESTS
// ==============================================
//
// Arbitrary operation sequences against the policy engines, checking the
// structural invariants after every step: the ARC list-size inequalities,
// the strictly-increasing LFU bucket list, and the LRU capacity bound.

use std::collections::HashMap;
use std::time::Instant;

use proptest::prelude::*;

use hotcache::policy::arc::ArcEngine;
use hotcache::policy::lfu::LfuEngine;
use hotcache::policy::lru::LruEngine;
use hotcache::policy::Lookup;

#[derive(Debug, Clone)]
enum Op {
    Insert(u8, u32),
    Lookup(u8),
    Remove(u8),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0u8..16, any::<u32>()).prop_map(|(k, v)| Op::Insert(k, v)),
        (0u8..16).prop_map(Op::Lookup),
        (0u8..16).prop_map(Op::Remove),
    ]
}

proptest! {
    #[test]
    fn arc_invariants_hold_under_arbitrary_ops(
        ops in proptest::collection::vec(op_strategy(), 1..256),
        capacity in 1usize..8,
    ) {
        let mut engine: ArcEngine<u8, u32> = ArcEngine::new(capacity);
        let now = Instant::now();

        for op in ops {
            match op {
                Op::Insert(k, v) => {
                    engine.insert(k, v, None);
                },
                Op::Lookup(k) => {
                    engine.lookup(&k, now);
                },
                Op::Remove(k) => {
                    engine.remove(&k);
                },
            }
            engine.debug_validate_invariants();
            prop_assert!(engine.p() <= capacity);
            prop_assert!(engine.len() <= capacity);
            prop_assert_eq!(engine.len(), engine.t1_len() + engine.t2_len());
        }
    }

    #[test]
    fn lfu_bucket_list_stays_consistent(
        ops in proptest::collection::vec(op_strategy(), 1..256),
        capacity in 1usize..8,
    ) {
        let mut engine: LfuEngine<u8, u32> = LfuEngine::new(capacity);
        let now = Instant::now();

        for op in ops {
            match op {
                Op::Insert(k, v) => {
                    engine.insert(k, v, None);
                },
                Op::Lookup(k) => {
                    engine.lookup(&k, now);
                },
                Op::Remove(k) => {
                    engine.remove(&k);
                },
            }
            engine.debug_validate_invariants();
            prop_assert!(engine.len() <= capacity);
        }
    }

    #[test]
    fn lru_tracks_latest_values_within_capacity(
        ops in proptest::collection::vec(op_strategy(), 1..256),
        capacity in 1usize..8,
    ) {
        let mut engine: LruEngine<u8, u32> = LruEngine::new(capacity);
        let mut model: HashMap<u8, u32> = HashMap::new();
        let now = Instant::now();

        for op in ops {
            match op {
                Op::Insert(k, v) => {
                    if let Some((evicted, _)) = engine.insert(k, v, None) {
                        model.remove(&evicted);
                    }
                    model.insert(k, v);
                },
                Op::Lookup(k) => {
                    // A hit must return the last value stored for the key.
                    match engine.lookup(&k, now) {
                        Lookup::Hit(v) => prop_assert_eq!(Some(&v), model.get(&k)),
                        Lookup::Miss => prop_assert!(!model.contains_key(&k)),
                        Lookup::Expired(..) => prop_assert!(false, "no TTLs in this run"),
                    }
                },
                Op::Remove(k) => {
                    let removed = engine.remove(&k);
                    prop_assert_eq!(removed.as_ref(), model.get(&k));
                    model.remove(&k);
                },
            }
            prop_assert!(engine.len() <= capacity);
            prop_assert_eq!(engine.len(), model.len());
        }
    }
}
