//! Shared helpers for table tests
//!
//! Values are 16 bytes: an 8-byte key id followed by an 8-byte payload. The
//! id half stands in for a value-log pointer, so a resolver can confirm a slot
//! by comparing ids without any shared state.

use std::path::Path;

use diskhash::{Options, Resolution, ResolveResult, Slot, Table};

pub const VALUE_LEN: usize = 16;

pub fn test_key(id: u64) -> Vec<u8> {
    format!("diskhash-test-key-{:09}", id).into_bytes()
}

pub fn value_for(id: u64, payload: u64) -> [u8; VALUE_LEN] {
    let mut value = [0u8; VALUE_LEN];
    value[..8].copy_from_slice(&id.to_le_bytes());
    value[8..].copy_from_slice(&payload.to_le_bytes());
    value
}

/// Confirms slots whose id half is `id`
pub fn owned_by(id: u64) -> impl FnMut(Slot<'_>) -> ResolveResult {
    move |slot: Slot<'_>| {
        let stored = u64::from_le_bytes(slot.value()[..8].try_into()?);
        if stored == id {
            Ok(Resolution::Confirmed)
        } else {
            Ok(Resolution::NotMatched)
        }
    }
}

/// Small table: 16-byte values, 2 slots per 80-byte block, `buckets` primaries
pub fn small_options(dir: &Path, buckets: u32) -> Options {
    Options::builder()
        .dir_path(dir)
        .value_len(VALUE_LEN)
        .bucket_count(buckets)
        .block_size(80)
        .build()
}

pub fn put(table: &Table, id: u64, payload: u64) {
    table
        .put(&test_key(id), &value_for(id, payload), owned_by(id))
        .unwrap();
}

/// Payload stored for `id`, if present
pub fn payload_of(table: &Table, id: u64) -> Option<u64> {
    let mut found = None;
    let mut is_owner = owned_by(id);
    table
        .get(&test_key(id), |slot: Slot<'_>| -> ResolveResult {
            let decision = is_owner(slot)?;
            if decision == Resolution::Confirmed {
                found = Some(u64::from_le_bytes(slot.value()[8..].try_into()?));
            }
            Ok(decision)
        })
        .unwrap();
    found
}

pub fn delete(table: &Table, id: u64) -> bool {
    table
        .delete(&test_key(id), owned_by(id))
        .unwrap()
        .is_found()
}
