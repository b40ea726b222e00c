//! Model-based property tests
//!
//! Random put/get/delete/reopen sequences run against both a Table and a
//! `HashMap`, with a hasher narrow enough that distinct keys routinely share
//! a fingerprint. After every step the two must agree.

use std::collections::HashMap;

use diskhash::{KeyHasher, PutOutcome, Table};
use proptest::prelude::*;
use tempfile::TempDir;

use super::support::{delete, owned_by, payload_of, put, small_options, test_key, value_for};

// =============================================================================
// Helper Functions
// =============================================================================

/// Only 8 distinct digests, so most lookups hit fingerprint collisions
struct NarrowHasher;

impl KeyHasher for NarrowHasher {
    fn id(&self) -> u32 {
        0xFFFF_0002
    }

    fn hash(&self, key: &[u8]) -> u64 {
        xxhash_rust::xxh3::xxh3_64(key) & 0x7
    }
}

#[derive(Debug, Clone)]
enum Op {
    Put(u64, u64),
    Delete(u64),
    Get(u64),
    Reopen,
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => (0..48u64, any::<u64>()).prop_map(|(id, payload)| Op::Put(id, payload)),
        2 => (0..48u64).prop_map(Op::Delete),
        2 => (0..48u64).prop_map(Op::Get),
        1 => Just(Op::Reopen),
    ]
}

fn open_table(temp: &TempDir) -> Table {
    Table::open_with_hasher(small_options(temp.path(), 3), NarrowHasher).unwrap()
}

// =============================================================================
// Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Every operation agrees with a HashMap, across reopens
    #[test]
    fn table_matches_hashmap_model(ops in prop::collection::vec(op(), 1..120)) {
        let temp = TempDir::new().unwrap();
        let mut table = open_table(&temp);
        let mut model: HashMap<u64, u64> = HashMap::new();

        for op in ops {
            match op {
                Op::Put(id, payload) => {
                    let outcome = table
                        .put(&test_key(id), &value_for(id, payload), owned_by(id))
                        .unwrap();
                    let expected = match model.insert(id, payload) {
                        Some(_) => PutOutcome::Updated,
                        None => PutOutcome::Inserted,
                    };
                    prop_assert_eq!(outcome, expected);
                }
                Op::Delete(id) => {
                    prop_assert_eq!(delete(&table, id), model.remove(&id).is_some());
                }
                Op::Get(id) => {
                    prop_assert_eq!(payload_of(&table, id), model.get(&id).copied());
                }
                Op::Reopen => {
                    table.close().unwrap();
                    table = open_table(&temp);
                }
            }
            prop_assert_eq!(table.stats().unwrap().entries, model.len() as u64);
        }

        for (id, payload) in &model {
            prop_assert_eq!(payload_of(&table, *id), Some(*payload));
        }

        let report = table.verify().unwrap();
        prop_assert_eq!(report.entries, model.len() as u64);
        prop_assert_eq!(report.orphaned_buckets, 0);
    }

    /// A table abandoned without close recovers the live entry count
    #[test]
    fn recount_after_crash_matches_model(
        steps in prop::collection::vec((0..64u64, any::<bool>()), 1..80)
    ) {
        let temp = TempDir::new().unwrap();
        let mut model: HashMap<u64, u64> = HashMap::new();
        {
            let table = open_table(&temp);
            for (id, remove) in steps {
                if remove {
                    delete(&table, id);
                    model.remove(&id);
                } else {
                    put(&table, id, id + 1);
                    model.insert(id, id + 1);
                }
            }
            std::mem::forget(table);
        }

        let table = open_table(&temp);
        prop_assert_eq!(table.stats().unwrap().entries, model.len() as u64);
        for (id, payload) in &model {
            prop_assert_eq!(payload_of(&table, *id), Some(*payload));
        }
    }
}
