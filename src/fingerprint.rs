//! Fingerprint Function
//!
//! Maps an arbitrary key to a 64-bit digest and a primary bucket index.
//!
//! Digests are persisted inside slots, so the hash must produce the same value
//! for the same key on every run and every platform. `std`'s `DefaultHasher`
//! makes no such promise; XXH3 with a fixed seed does. The hasher's id is
//! recorded in the table header and checked on open.

use xxhash_rust::xxh3::xxh3_64;

/// A stable hash over key bytes
pub trait KeyHasher: Send + Sync + 'static {
    /// Identifier persisted in the table header
    fn id(&self) -> u32;

    /// Hash a key to a 64-bit digest
    fn hash(&self, key: &[u8]) -> u64;
}

/// XXH3-64 with seed 0 (the default hasher)
#[derive(Debug, Clone, Copy, Default)]
pub struct Xxh3Hasher;

impl Xxh3Hasher {
    pub const ID: u32 = 1;
}

impl KeyHasher for Xxh3Hasher {
    fn id(&self) -> u32 {
        Self::ID
    }

    #[inline]
    fn hash(&self, key: &[u8]) -> u64 {
        xxh3_64(key)
    }
}

/// Digest of a key plus the primary bucket it lives in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fingerprint {
    pub digest: u64,
    pub bucket: u32,
}

impl Fingerprint {
    /// Fingerprint a key for a table with `bucket_count` primary buckets
    #[inline]
    pub fn of(hasher: &dyn KeyHasher, key: &[u8], bucket_count: u32) -> Self {
        let digest = hasher.hash(key);
        Self {
            digest,
            bucket: bucket_index(digest, bucket_count),
        }
    }
}

/// Compute bucket index from a 64-bit digest.
#[inline]
pub fn bucket_index(digest: u64, bucket_count: u32) -> u32 {
    debug_assert!(bucket_count > 0, "bucket_count must be > 0");
    (digest % u64::from(bucket_count)) as u32
}
