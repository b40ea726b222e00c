//! Record Codec
//!
//! Fixed-size binary layout of a table file.
//!
//! ## File Format
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │ Header (64 bytes)                                       │
//! │   Magic "DHIX" | Version | Flags | ValueLen | SlotCap   │
//! │   BlockSize | HasherId | BucketCount | EntryCount | CRC │
//! ├─────────────────────────────────────────────────────────┤
//! │ Primary Region: bucket_count blocks, index 0..N         │
//! ├─────────────────────────────────────────────────────────┤
//! │ Overflow Region: blocks appended as chains grow,        │
//! │   index N.. (never freed, never reordered)              │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Bucket Block (block_size bytes)
//! ```text
//! ┌─────────┬──────────────┬─────────────────────┬─────────┬─────────┐
//! │ CRC (4) │ Reserved (4) │ Overflow Offset (8) │ Slots   │ Padding │
//! └─────────┴──────────────┴─────────────────────┴─────────┴─────────┘
//! Slot: [Flags (1)][Reserved (7)][Fingerprint (8)][Value (value_len)]
//! ```
//!
//! The overflow offset is the byte offset of the next bucket in the chain.
//! Offset 0 always holds the header, so 0 doubles as "no overflow".

mod bucket;
mod header;

pub use bucket::{Bucket, SlotEntry};
pub use header::TableHeader;

use crate::config::MAX_VALUE_LEN;
use crate::error::{DiskHashError, Result};

// =============================================================================
// Shared Constants
// =============================================================================

/// Magic bytes identifying a diskhash table file
pub(crate) const MAGIC: &[u8; 4] = b"DHIX";

/// Current file format version
pub(crate) const VERSION: u16 = 1;

/// Header size in bytes; the first bucket starts right after it
pub const HEADER_SIZE: u64 = 64;

/// Per-block prefix: CRC (4) + Reserved (4) + Overflow Offset (8)
pub const BUCKET_HEADER_SIZE: usize = 16;

/// Per-slot prefix: Flags (1) + Reserved (7) + Fingerprint (8)
pub const SLOT_HEADER_SIZE: usize = 16;

/// Overflow offset meaning "end of chain"
pub(crate) const NO_OVERFLOW: u64 = 0;

/// Slot flag bit: slot holds a live entry
pub(crate) const SLOT_OCCUPIED: u8 = 0x01;

// =============================================================================
// Layout
// =============================================================================

/// Block geometry of one table, fixed at creation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layout {
    value_len: usize,
    slot_capacity: usize,
    block_size: usize,
}

impl Layout {
    /// Derive a layout from a value length and a target block size.
    ///
    /// Fits as many slots as the target allows, and grows the block to hold
    /// one slot when a single value is larger than the target.
    pub fn new(value_len: usize, target_block_size: u32) -> Self {
        let slot_size = SLOT_HEADER_SIZE + value_len;
        let target = target_block_size as usize;
        let slot_capacity = (target.saturating_sub(BUCKET_HEADER_SIZE) / slot_size).max(1);
        let block_size = target.max(BUCKET_HEADER_SIZE + slot_capacity * slot_size);

        Self {
            value_len,
            slot_capacity,
            block_size,
        }
    }

    /// Rebuild a layout from persisted fields, rejecting impossible geometry
    pub fn from_parts(value_len: usize, slot_capacity: usize, block_size: usize) -> Result<Self> {
        if value_len == 0 || value_len > MAX_VALUE_LEN {
            return Err(DiskHashError::Corruption(format!(
                "invalid value length in header: {}",
                value_len
            )));
        }

        if slot_capacity == 0 {
            return Err(DiskHashError::Corruption(
                "header records zero slots per bucket".to_string(),
            ));
        }

        let needed = slot_capacity
            .checked_mul(SLOT_HEADER_SIZE + value_len)
            .and_then(|slots| slots.checked_add(BUCKET_HEADER_SIZE));

        match needed {
            Some(needed) if needed <= block_size => Ok(Self {
                value_len,
                slot_capacity,
                block_size,
            }),
            _ => Err(DiskHashError::Corruption(format!(
                "block size {} cannot hold {} slots of {} bytes",
                block_size, slot_capacity, value_len
            ))),
        }
    }

    pub fn value_len(&self) -> usize {
        self.value_len
    }

    pub fn slot_capacity(&self) -> usize {
        self.slot_capacity
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    pub fn slot_size(&self) -> usize {
        SLOT_HEADER_SIZE + self.value_len
    }

    /// File offset of the bucket at `index`
    #[inline]
    pub fn bucket_offset(&self, index: u64) -> u64 {
        HEADER_SIZE + index * self.block_size as u64
    }

    /// Bucket index stored at `offset`, if `offset` is a block boundary
    pub fn bucket_index_at(&self, offset: u64) -> Result<u64> {
        let block = self.block_size as u64;
        if offset < HEADER_SIZE || (offset - HEADER_SIZE) % block != 0 {
            return Err(DiskHashError::Corruption(format!(
                "overflow offset {} is not a bucket boundary",
                offset
            )));
        }
        Ok((offset - HEADER_SIZE) / block)
    }
}
