//! Tests for the chain-scan Engine
//!
//! These tests verify:
//! - Put/get/delete through the resolver protocol
//! - Fingerprint collisions resolved by the caller
//! - Overflow chain growth and empty-slot reuse
//! - Resolver errors abort without mutation
//! - Structural checks (verify/recount) and corrupt chain detection

use std::path::Path;

use diskhash::config::SyncStrategy;
use diskhash::engine::Engine;
use diskhash::format::{Layout, TableHeader};
use diskhash::storage::StorageManager;
use diskhash::{
    DiskHashError, KeyHasher, Lookup, PutOutcome, Resolution, ResolveResult, Slot, Xxh3Hasher,
};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

/// Sends every key to the same bucket with the same fingerprint
struct CollidingHasher;

impl KeyHasher for CollidingHasher {
    fn id(&self) -> u32 {
        0xFFFF_0001
    }

    fn hash(&self, _key: &[u8]) -> u64 {
        0xC0FF_EE00_C0FF_EE00
    }
}

/// Keys appended to an in-memory log; slot values are 8-byte log positions
#[derive(Default)]
struct KeyLog {
    keys: Vec<Vec<u8>>,
}

impl KeyLog {
    fn append(&mut self, key: &[u8]) -> [u8; 8] {
        self.keys.push(key.to_vec());
        ((self.keys.len() - 1) as u64).to_le_bytes()
    }

    fn key_at(&self, slot: Slot<'_>) -> &[u8] {
        let pos = u64::from_le_bytes(slot.value().try_into().unwrap());
        &self.keys[pos as usize]
    }
}

/// Confirms a slot when the log entry it points at is `key`
fn matcher<'a>(log: &'a KeyLog, key: &'a [u8]) -> impl FnMut(Slot<'_>) -> ResolveResult + 'a {
    move |slot: Slot<'_>| {
        if log.key_at(slot) == key {
            Ok(Resolution::Confirmed)
        } else {
            Ok(Resolution::NotMatched)
        }
    }
}

/// 8-byte values, 2 slots per 64-byte block, 4 primary buckets
fn setup_engine(dir: &Path, hasher: Box<dyn KeyHasher>) -> Engine {
    let header = TableHeader::new(Layout::new(8, 64), hasher.id(), 4);
    let storage =
        StorageManager::create(&dir.join("index.dhx"), &header, SyncStrategy::Manual).unwrap();
    Engine::new(storage, hasher, 0)
}

fn put_key(engine: &mut Engine, log: &mut KeyLog, key: &[u8]) -> PutOutcome {
    let value = log.append(key);
    engine.put(key, &value, matcher(log, key)).unwrap()
}

/// Log position stored for `key`, if present
fn lookup(engine: &Engine, log: &KeyLog, key: &[u8]) -> Option<u64> {
    let mut found = None;
    let mut is_key = matcher(log, key);
    let outcome = engine
        .get(key, |slot: Slot<'_>| -> ResolveResult {
            let decision = is_key(slot)?;
            if decision == Resolution::Confirmed {
                found = Some(u64::from_le_bytes(slot.value().try_into().unwrap()));
            }
            Ok(decision)
        })
        .unwrap();
    assert_eq!(outcome.is_found(), found.is_some());
    found
}

// =============================================================================
// Basic Operation Tests
// =============================================================================

#[test]
fn test_put_get_delete() {
    let temp = TempDir::new().unwrap();
    let mut engine = setup_engine(temp.path(), Box::new(Xxh3Hasher));
    let mut log = KeyLog::default();

    assert_eq!(put_key(&mut engine, &mut log, b"alpha"), PutOutcome::Inserted);
    assert_eq!(put_key(&mut engine, &mut log, b"beta"), PutOutcome::Inserted);
    assert_eq!(engine.entry_count(), 2);

    assert_eq!(lookup(&engine, &log, b"alpha"), Some(0));
    assert_eq!(lookup(&engine, &log, b"beta"), Some(1));
    assert_eq!(lookup(&engine, &log, b"gamma"), None);

    let outcome = engine.delete(b"alpha", matcher(&log, b"alpha")).unwrap();
    assert_eq!(outcome, Lookup::Found);
    assert_eq!(engine.entry_count(), 1);
    assert_eq!(lookup(&engine, &log, b"alpha"), None);
    assert_eq!(lookup(&engine, &log, b"beta"), Some(1));
}

#[test]
fn test_put_existing_key_updates_in_place() {
    let temp = TempDir::new().unwrap();
    let mut engine = setup_engine(temp.path(), Box::new(Xxh3Hasher));
    let mut log = KeyLog::default();

    put_key(&mut engine, &mut log, b"key");
    assert_eq!(put_key(&mut engine, &mut log, b"key"), PutOutcome::Updated);

    assert_eq!(engine.entry_count(), 1);
    assert_eq!(lookup(&engine, &log, b"key"), Some(1));
}

#[test]
fn test_delete_missing_key_is_not_found() {
    let temp = TempDir::new().unwrap();
    let mut engine = setup_engine(temp.path(), Box::new(Xxh3Hasher));
    let log = KeyLog::default();

    let outcome = engine.delete(b"ghost", matcher(&log, b"ghost")).unwrap();
    assert_eq!(outcome, Lookup::NotFound);
    assert_eq!(engine.entry_count(), 0);
}

#[test]
fn test_wrong_value_length_is_rejected() {
    let temp = TempDir::new().unwrap();
    let mut engine = setup_engine(temp.path(), Box::new(Xxh3Hasher));

    let result = engine.put(b"key", b"four", |_: Slot<'_>| -> ResolveResult {
        Ok(Resolution::Confirmed)
    });
    assert!(matches!(
        result,
        Err(DiskHashError::ValueLength {
            expected: 8,
            actual: 4
        })
    ));
    assert_eq!(engine.entry_count(), 0);
}

#[test]
fn test_resolver_not_called_without_fingerprint_match() {
    let temp = TempDir::new().unwrap();
    let mut engine = setup_engine(temp.path(), Box::new(Xxh3Hasher));

    let mut calls = 0;
    engine
        .put(b"fresh", &[0u8; 8], |_: Slot<'_>| -> ResolveResult {
            calls += 1;
            Ok(Resolution::Confirmed)
        })
        .unwrap();
    assert_eq!(calls, 0);
}

// =============================================================================
// Collision Tests
// =============================================================================

#[test]
fn test_colliding_keys_are_told_apart_by_resolver() {
    let temp = TempDir::new().unwrap();
    let mut engine = setup_engine(temp.path(), Box::new(CollidingHasher));
    let mut log = KeyLog::default();

    let keys: Vec<Vec<u8>> = (0..5).map(|i| format!("key-{i}").into_bytes()).collect();
    for key in &keys {
        assert_eq!(put_key(&mut engine, &mut log, key), PutOutcome::Inserted);
    }

    for (i, key) in keys.iter().enumerate() {
        assert_eq!(lookup(&engine, &log, key), Some(i as u64));
    }
    assert_eq!(lookup(&engine, &log, b"key-9"), None);

    // 5 entries at 2 slots per bucket: primary + 2 overflow
    assert_eq!(engine.storage().overflow_buckets(), 2);
    let report = engine.verify().unwrap();
    assert_eq!(report.entries, 5);
    assert_eq!(report.longest_chain, 3);
    assert_eq!(report.orphaned_buckets, 0);
}

#[test]
fn test_resolver_sees_every_candidate_in_chain_order() {
    let temp = TempDir::new().unwrap();
    let mut engine = setup_engine(temp.path(), Box::new(CollidingHasher));
    let mut log = KeyLog::default();

    for i in 0..4 {
        put_key(&mut engine, &mut log, format!("k{i}").as_bytes());
    }

    let mut seen = Vec::new();
    let outcome = engine
        .get(b"absent", |slot: Slot<'_>| -> ResolveResult {
            seen.push(u64::from_le_bytes(slot.value().try_into().unwrap()));
            Ok(Resolution::NotMatched)
        })
        .unwrap();

    assert_eq!(outcome, Lookup::NotFound);
    assert_eq!(seen, vec![0, 1, 2, 3]);
}

#[test]
fn test_resolver_error_aborts_without_mutation() {
    let temp = TempDir::new().unwrap();
    let mut engine = setup_engine(temp.path(), Box::new(CollidingHasher));
    let mut log = KeyLog::default();

    put_key(&mut engine, &mut log, b"first");
    put_key(&mut engine, &mut log, b"second");

    let failing = |_: Slot<'_>| -> ResolveResult { Err("value log unavailable".into()) };

    let err = engine.put(b"third", &[9u8; 8], failing).unwrap_err();
    match err {
        DiskHashError::Resolver(e) => assert_eq!(e.to_string(), "value log unavailable"),
        other => panic!("Expected resolver error, got {:?}", other),
    }

    assert!(engine.delete(b"first", failing).is_err());
    assert!(engine.get(b"first", failing).is_err());

    // Nothing changed: no new bucket, both entries still resolvable
    assert_eq!(engine.entry_count(), 2);
    assert_eq!(engine.storage().overflow_buckets(), 0);
    assert_eq!(lookup(&engine, &log, b"first"), Some(0));
    assert_eq!(lookup(&engine, &log, b"second"), Some(1));
}

// =============================================================================
// Chain Growth Tests
// =============================================================================

#[test]
fn test_deleted_slot_is_reused_before_growing() {
    let temp = TempDir::new().unwrap();
    let mut engine = setup_engine(temp.path(), Box::new(CollidingHasher));
    let mut log = KeyLog::default();

    for key in [b"a", b"b", b"c", b"d"] {
        put_key(&mut engine, &mut log, key);
    }
    assert_eq!(engine.storage().overflow_buckets(), 1);

    engine.delete(b"a", matcher(&log, b"a")).unwrap();
    put_key(&mut engine, &mut log, b"e");

    assert_eq!(engine.storage().overflow_buckets(), 1);
    assert_eq!(engine.entry_count(), 4);

    // "e" took the earliest free slot: slot 0 of the primary bucket
    let primary = u64::from(engine.fingerprint(b"e").bucket);
    let bucket = engine.storage().read_bucket(primary).unwrap();
    assert_eq!(bucket.value_at(0), &4u64.to_le_bytes());
}

#[test]
fn test_unrelated_buckets_do_not_grow() {
    let temp = TempDir::new().unwrap();
    let mut engine = setup_engine(temp.path(), Box::new(CollidingHasher));
    let mut log = KeyLog::default();

    for i in 0..7 {
        put_key(&mut engine, &mut log, format!("k{i}").as_bytes());
    }

    let primary = u64::from(engine.fingerprint(b"k0").bucket);
    for index in 0..4 {
        let bucket = engine.storage().read_bucket(index).unwrap();
        if index == primary {
            assert!(bucket.overflow().is_some());
        } else {
            assert_eq!(bucket.occupied_count(), 0);
            assert_eq!(bucket.overflow(), None);
        }
    }
}

// =============================================================================
// Structure Tests
// =============================================================================

#[test]
fn test_backward_overflow_pointer_is_corruption() {
    let temp = TempDir::new().unwrap();
    let mut engine = setup_engine(temp.path(), Box::new(CollidingHasher));
    let mut log = KeyLog::default();

    for key in [b"a", b"b", b"c"] {
        put_key(&mut engine, &mut log, key);
    }

    // Point the overflow bucket back at its own primary bucket
    let primary = u64::from(engine.fingerprint(b"a").bucket);
    let overflow_index = engine.storage().read_bucket(primary).unwrap().overflow().unwrap();
    let mut overflow = engine.storage().read_bucket(overflow_index).unwrap();
    overflow.set_overflow(Some(primary));
    engine.storage().write_bucket(overflow_index, &overflow).unwrap();

    let result = engine.get(b"missing", matcher(&log, b"missing"));
    assert!(matches!(result, Err(DiskHashError::Corruption(_))));
    assert!(matches!(engine.verify(), Err(DiskHashError::Corruption(_))));
}

#[test]
fn test_verify_reports_orphaned_buckets() {
    let temp = TempDir::new().unwrap();
    let engine = setup_engine(temp.path(), Box::new(Xxh3Hasher));

    engine.storage().append_overflow_bucket().unwrap();

    let report = engine.verify().unwrap();
    assert_eq!(report.chains, 4);
    assert_eq!(report.overflow_buckets, 0);
    assert_eq!(report.orphaned_buckets, 1);
    assert_eq!(report.longest_chain, 1);
}

#[test]
fn test_recount_replaces_stale_entry_count() {
    let temp = TempDir::new().unwrap();
    let mut log = KeyLog::default();
    {
        let mut engine = setup_engine(temp.path(), Box::new(Xxh3Hasher));
        for i in 0..10 {
            put_key(&mut engine, &mut log, format!("k{i}").as_bytes());
        }
        engine.storage().sync().unwrap();
    }

    let (storage, _) =
        StorageManager::open(&temp.path().join("index.dhx"), SyncStrategy::Manual).unwrap();
    let mut engine = Engine::new(storage, Box::new(Xxh3Hasher), 999);

    let report = engine.recount().unwrap();
    assert_eq!(report.entries, 10);
    assert_eq!(engine.entry_count(), 10);
}
