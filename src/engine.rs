//! Engine Module
//!
//! The hash index engine: fingerprints keys, walks bucket chains and applies
//! the resolver protocol for put/get/delete.
//!
//! ## Chain Scan
//! 1. Fingerprint the key → (digest, primary bucket)
//! 2. For each occupied slot whose fingerprint equals the digest, in slot
//!    order, ask the resolver. `Confirmed` ends the scan at that slot,
//!    `NotMatched` moves on, an error aborts with nothing mutated.
//! 3. Follow the overflow pointer and repeat until the chain ends.
//!
//! ## Chain Invariant
//! Overflow buckets are appended at the end of the file and only ever linked
//! from a chain's current tail, so every overflow pointer refers to a bucket
//! with a higher index than the one holding the pointer. A pointer that goes
//! backwards (or into the primary region) is reported as corruption, which
//! also rules out cycles.

use crate::error::{DiskHashError, Result};
use crate::fingerprint::{Fingerprint, KeyHasher};
use crate::format::Bucket;
use crate::resolver::{Resolution, Resolver, Slot};
use crate::storage::StorageManager;

/// Outcome of `get` and `delete`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup {
    /// The resolver confirmed a slot
    Found,

    /// The chain holds no confirmed slot for the key
    NotFound,
}

impl Lookup {
    pub fn is_found(self) -> bool {
        matches!(self, Lookup::Found)
    }
}

/// Outcome of `put`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    /// An existing slot had its value replaced
    Updated,

    /// An empty slot (possibly in a new overflow bucket) was claimed
    Inserted,
}

/// Result of a full structural walk over every chain
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VerifyReport {
    /// Number of primary chains walked
    pub chains: u32,
    /// Occupied slots reachable from a primary bucket
    pub entries: u64,
    /// Overflow buckets reachable from a primary bucket
    pub overflow_buckets: u64,
    /// Overflow buckets in the file that no chain links to
    pub orphaned_buckets: u64,
    /// Most buckets in any single chain
    pub longest_chain: u64,
}

/// Where a chain scan stopped
enum Scan {
    /// The resolver confirmed `pos` in the bucket at `index`
    Hit { index: u64, pos: usize, bucket: Bucket },

    /// Chain exhausted. `free` is the earliest empty slot in chain order.
    Miss {
        free: Option<(u64, usize)>,
        tail_index: u64,
        tail: Bucket,
    },
}

/// Chain-scan engine over one table file
///
/// `get` takes `&self` and `put`/`delete` take `&mut self`; the owning
/// [`Table`](crate::Table) maps those onto a readers-writer lock.
pub struct Engine {
    storage: StorageManager,
    hasher: Box<dyn KeyHasher>,
    /// Live entries (occupied slots)
    entry_count: u64,
}

impl Engine {
    pub fn new(storage: StorageManager, hasher: Box<dyn KeyHasher>, entry_count: u64) -> Self {
        Self {
            storage,
            hasher,
            entry_count,
        }
    }

    /// Fingerprint a key against this table's bucket count
    pub fn fingerprint(&self, key: &[u8]) -> Fingerprint {
        Fingerprint::of(self.hasher.as_ref(), key, self.storage.bucket_count())
    }

    // =========================================================================
    // Operations
    // =========================================================================

    /// Look a key up
    ///
    /// The engine reports only found/not-found; a resolver that wants the
    /// value copies it out of the slot it confirms.
    pub fn get<R: Resolver>(&self, key: &[u8], mut resolver: R) -> Result<Lookup> {
        let fp = self.fingerprint(key);
        match self.scan(fp, &mut resolver)? {
            Scan::Hit { .. } => Ok(Lookup::Found),
            Scan::Miss { .. } => Ok(Lookup::NotFound),
        }
    }

    /// Insert or update the value for a key
    ///
    /// Updates the confirmed slot in place; otherwise claims the earliest
    /// empty slot in the chain, and only when the chain is full appends a new
    /// overflow bucket.
    pub fn put<R: Resolver>(&mut self, key: &[u8], value: &[u8], mut resolver: R) -> Result<PutOutcome> {
        let layout = *self.storage.layout();
        if value.len() != layout.value_len() {
            return Err(DiskHashError::ValueLength {
                expected: layout.value_len(),
                actual: value.len(),
            });
        }

        let fp = self.fingerprint(key);

        match self.scan(fp, &mut resolver)? {
            Scan::Hit { index, pos, mut bucket } => {
                bucket.set_value(pos, value)?;
                self.storage.write_bucket(index, &bucket)?;
                Ok(PutOutcome::Updated)
            }
            Scan::Miss {
                free: Some((index, pos)),
                tail_index,
                tail,
            } => {
                let mut bucket = if index == tail_index {
                    tail
                } else {
                    self.storage.read_bucket(index)?
                };
                bucket.claim(pos, fp.digest, value)?;
                self.storage.write_bucket(index, &bucket)?;
                self.entry_count += 1;
                Ok(PutOutcome::Inserted)
            }
            Scan::Miss {
                free: None,
                tail_index,
                mut tail,
            } => {
                let mut overflow = Bucket::empty(&layout);
                overflow.claim(0, fp.digest, value)?;

                // Write the new block before linking it: a crash in between
                // leaves an unreachable block, never a dangling pointer.
                let new_index = self.storage.append_bucket(&overflow)?;
                tail.set_overflow(Some(new_index));
                self.storage.write_bucket(tail_index, &tail)?;

                tracing::debug!(
                    bucket = fp.bucket,
                    tail = tail_index,
                    overflow = new_index,
                    "Extended bucket chain"
                );

                self.entry_count += 1;
                Ok(PutOutcome::Inserted)
            }
        }
    }

    /// Remove a key
    ///
    /// The confirmed slot is emptied and becomes reusable by later puts into
    /// the same chain. Overflow buckets are never released.
    pub fn delete<R: Resolver>(&mut self, key: &[u8], mut resolver: R) -> Result<Lookup> {
        let fp = self.fingerprint(key);

        match self.scan(fp, &mut resolver)? {
            Scan::Hit { index, pos, mut bucket } => {
                bucket.clear(pos);
                self.storage.write_bucket(index, &bucket)?;
                self.entry_count = self.entry_count.saturating_sub(1);
                Ok(Lookup::Found)
            }
            Scan::Miss { .. } => Ok(Lookup::NotFound),
        }
    }

    /// Walk every chain, checking links and counting entries
    pub fn verify(&self) -> Result<VerifyReport> {
        let primary = u64::from(self.storage.bucket_count());
        let total = self.storage.total_buckets();
        let mut linked = vec![false; (total - primary) as usize];
        let mut report = VerifyReport {
            chains: self.storage.bucket_count(),
            ..VerifyReport::default()
        };

        for start in 0..primary {
            let mut index = start;
            let mut length = 0u64;

            loop {
                let bucket = self.storage.read_bucket(index)?;
                report.entries += bucket.occupied_count() as u64;
                length += 1;

                if index >= primary {
                    let seen = &mut linked[(index - primary) as usize];
                    if *seen {
                        return Err(DiskHashError::Corruption(format!(
                            "Overflow bucket {} is linked from more than one chain",
                            index
                        )));
                    }
                    *seen = true;
                    report.overflow_buckets += 1;
                }

                match self.next_in_chain(index, &bucket)? {
                    Some(next) => index = next,
                    None => break,
                }
            }

            report.longest_chain = report.longest_chain.max(length);
        }

        report.orphaned_buckets = (total - primary) - report.overflow_buckets;
        Ok(report)
    }

    /// Rebuild the entry count from a full walk
    pub fn recount(&mut self) -> Result<VerifyReport> {
        let report = self.verify()?;
        self.entry_count = report.entries;
        Ok(report)
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn storage(&self) -> &StorageManager {
        &self.storage
    }

    pub fn entry_count(&self) -> u64 {
        self.entry_count
    }

    pub fn hasher_id(&self) -> u32 {
        self.hasher.id()
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    /// Walk the chain for `fp`, resolving fingerprint matches
    fn scan<R: Resolver>(&self, fp: Fingerprint, resolver: &mut R) -> Result<Scan> {
        let mut index = u64::from(fp.bucket);
        let mut free = None;

        loop {
            let bucket = self.storage.read_bucket(index)?;

            for pos in 0..bucket.capacity() {
                if !bucket.is_occupied(pos) {
                    if free.is_none() {
                        free = Some((index, pos));
                    }
                    continue;
                }

                if bucket.fingerprint(pos) != fp.digest {
                    continue;
                }

                tracing::trace!(bucket = index, slot = pos, "Resolving candidate slot");

                let slot = Slot {
                    fingerprint: fp.digest,
                    value: bucket.value_at(pos),
                };
                match resolver.resolve(slot).map_err(DiskHashError::Resolver)? {
                    Resolution::Confirmed => return Ok(Scan::Hit { index, pos, bucket }),
                    Resolution::NotMatched => {}
                }
            }

            match self.next_in_chain(index, &bucket)? {
                Some(next) => index = next,
                None => {
                    return Ok(Scan::Miss {
                        free,
                        tail_index: index,
                        tail: bucket,
                    })
                }
            }
        }
    }

    /// Validated overflow pointer of `bucket` (stored at `index`)
    fn next_in_chain(&self, index: u64, bucket: &Bucket) -> Result<Option<u64>> {
        match bucket.overflow() {
            None => Ok(None),
            Some(next) if next <= index || next < u64::from(self.storage.bucket_count()) => {
                Err(DiskHashError::Corruption(format!(
                    "Bucket {} has an invalid overflow pointer to bucket {}",
                    index, next
                )))
            }
            Some(next) => Ok(Some(next)),
        }
    }
}
