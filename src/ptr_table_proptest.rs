#![cfg(test)]

// Property tests for PtrTable kept inside the crate so they can check the
// chain counters directly.

use crate::arena::Arena;
use crate::config::{GrowthPolicy, TableConfig};
use crate::identity::Identity;
use crate::ptr_table::{PtrTable, SlotHandle};
use crate::record::{Exported, Record};
use proptest::prelude::*;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq)]
struct Weight {
    records: usize,
    reset_at: Option<u64>,
}

impl Record for Weight {
    type Snapshot = usize;
    fn print_stats(&self, _nesting_level: usize) {}
    fn records_to_copy(&self) -> usize {
        self.records
    }
    fn export_copy(&self, _deep: bool) -> usize {
        self.records
    }
    fn reset_counters(&mut self, now: u64) {
        self.records = 0;
        self.reset_at = Some(now);
    }
}

// Pool-indexed operations so shrinking walks toward earlier identities.
#[derive(Clone, Debug)]
enum Op {
    Lookup(usize),
    Populate(usize, usize),
    Find(usize),
    Reset(u64),
    Flatten(bool),
}

fn arb_scenario() -> impl Strategy<Value = (Vec<usize>, usize, Vec<Op>)> {
    // Pointer-like identities: clustered on 16-byte boundaries.
    let pool = proptest::collection::vec((0usize..4096).prop_map(|i| 0x10_0000 + 16 * i), 1..=48);
    (pool, 1usize..=8).prop_flat_map(|(pool, capacity)| {
        let idx = 0..pool.len();
        let op = prop_oneof![
            4 => idx.clone().prop_map(Op::Lookup),
            2 => (idx.clone(), 0usize..4).prop_map(|(i, n)| Op::Populate(i, n)),
            2 => idx.clone().prop_map(Op::Find),
            1 => any::<u64>().prop_map(Op::Reset),
            1 => any::<bool>().prop_map(Op::Flatten),
        ];
        proptest::collection::vec(op, 1..120).prop_map(move |ops| (pool.clone(), capacity, ops))
    })
}

fn growth_policy() -> impl Strategy<Value = GrowthPolicy> {
    prop_oneof![
        Just(GrowthPolicy::default()),
        (0.3f64..=1.0, 1.0f64..6.0, 2usize..12).prop_map(|(load, avg, chain)| {
            GrowthPolicy::new()
                .with_max_load_factor(load)
                .with_max_average_chain(avg)
                .with_max_chain_length(chain)
        }),
    ]
}

// Property: model equivalence against std::collections::HashMap.
// Invariants exercised across random operation sequences:
// - at most one node per identity; repeated lookups return the same handle;
// - handles stay valid and keep their values across any number of resizes;
// - counters match a full recount of the chains after every step;
// - flatten yields exactly the populated values with non-zero record counts.
proptest! {
    #![proptest_config(ProptestConfig { cases: 64, .. ProptestConfig::default() })]
    #[test]
    fn prop_model_equivalence(
        (pool, capacity, ops) in arb_scenario(),
        growth in growth_policy(),
    ) {
        let cfg = TableConfig::new().with_initial_capacity(capacity).with_growth(growth);
        let mut sut: PtrTable<Weight> = PtrTable::with_config(Arena::new().shared(), cfg).unwrap();
        let mut handles: HashMap<Identity, SlotHandle> = HashMap::new();
        let mut values: HashMap<Identity, Weight> = HashMap::new();

        for op in ops {
            match op {
                Op::Lookup(i) => {
                    let key = Identity::new(pool[i]);
                    let (h, created) = sut.find_or_create(key);
                    match handles.get(&key) {
                        Some(prev) => {
                            prop_assert!(!created);
                            prop_assert_eq!(*prev, h);
                        }
                        None => {
                            prop_assert!(created);
                            prop_assert_eq!(sut.get(h), None);
                            handles.insert(key, h);
                        }
                    }
                }
                Op::Populate(i, n) => {
                    let key = Identity::new(pool[i]);
                    let w = Weight { records: n, reset_at: None };
                    let v = sut.get_or_insert_with(key, || w.clone());
                    let expected = values.entry(key).or_insert(w);
                    prop_assert_eq!(&*v, &*expected);
                    handles.entry(key).or_insert_with(|| sut.find(key).unwrap());
                }
                Op::Find(i) => {
                    let key = Identity::new(pool[i]);
                    prop_assert_eq!(sut.find(key), handles.get(&key).copied());
                }
                Op::Reset(now) => {
                    sut.reset_counters(now);
                    for w in values.values_mut() {
                        w.reset_counters(now);
                    }
                }
                Op::Flatten(deep) => {
                    let out = sut.flatten_to_array(deep);
                    let expected = values.values().filter(|w| w.records > 0).count();
                    prop_assert_eq!(out.len(), expected);
                    for e in out {
                        match e {
                            Exported::Shallow(h) => {
                                let key = sut.key(h).unwrap();
                                prop_assert_eq!(sut.get(h), values.get(&key));
                            }
                            Exported::Deep(n) => {
                                prop_assert!(n > 0);
                            }
                        }
                    }
                }
            }

            sut.check_invariants();
            prop_assert_eq!(sut.len(), handles.len());
            for (key, h) in &handles {
                prop_assert_eq!(sut.key(*h), Some(*key));
                prop_assert_eq!(sut.get(*h), values.get(key));
            }
        }
    }
}
