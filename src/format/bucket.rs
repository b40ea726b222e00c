//! Bucket codec
//!
//! In-memory form of one bucket block plus its encode/decode. Slot values are
//! kept in a single contiguous buffer so decoding a block is one allocation.

use bytes::{Buf, BufMut, BytesMut};

use crate::error::{DiskHashError, Result};

use super::{Layout, NO_OVERFLOW, SLOT_OCCUPIED};

/// Read-only view of one slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotEntry<'a> {
    pub occupied: bool,
    pub fingerprint: u64,
    pub value: &'a [u8],
}

/// One decoded bucket block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bucket {
    value_len: usize,
    occupied: Vec<bool>,
    fingerprints: Vec<u64>,
    values: Vec<u8>,
    /// Index of the next bucket in the chain
    overflow: Option<u64>,
}

impl Bucket {
    /// A bucket with every slot empty and no overflow
    pub fn empty(layout: &Layout) -> Self {
        let capacity = layout.slot_capacity();
        Self {
            value_len: layout.value_len(),
            occupied: vec![false; capacity],
            fingerprints: vec![0; capacity],
            values: vec![0; capacity * layout.value_len()],
            overflow: None,
        }
    }

    pub fn capacity(&self) -> usize {
        self.occupied.len()
    }

    pub fn slot(&self, pos: usize) -> SlotEntry<'_> {
        SlotEntry {
            occupied: self.occupied[pos],
            fingerprint: self.fingerprints[pos],
            value: self.value_at(pos),
        }
    }

    pub fn is_occupied(&self, pos: usize) -> bool {
        self.occupied[pos]
    }

    pub fn fingerprint(&self, pos: usize) -> u64 {
        self.fingerprints[pos]
    }

    pub fn value_at(&self, pos: usize) -> &[u8] {
        let start = pos * self.value_len;
        &self.values[start..start + self.value_len]
    }

    /// Position of the first empty slot
    pub fn first_free(&self) -> Option<usize> {
        self.occupied.iter().position(|&occupied| !occupied)
    }

    pub fn occupied_count(&self) -> usize {
        self.occupied.iter().filter(|&&occupied| occupied).count()
    }

    pub fn overflow(&self) -> Option<u64> {
        self.overflow
    }

    pub fn set_overflow(&mut self, next: Option<u64>) {
        self.overflow = next;
    }

    /// Occupy the slot at `pos` with a fingerprint and value
    pub fn claim(&mut self, pos: usize, fingerprint: u64, value: &[u8]) -> Result<()> {
        self.set_value(pos, value)?;
        self.occupied[pos] = true;
        self.fingerprints[pos] = fingerprint;
        Ok(())
    }

    /// Replace the value of the slot at `pos`, leaving its fingerprint alone
    pub fn set_value(&mut self, pos: usize, value: &[u8]) -> Result<()> {
        if value.len() != self.value_len {
            return Err(DiskHashError::ValueLength {
                expected: self.value_len,
                actual: value.len(),
            });
        }
        let start = pos * self.value_len;
        self.values[start..start + self.value_len].copy_from_slice(value);
        Ok(())
    }

    /// Empty the slot at `pos`; its old bytes are zeroed
    pub fn clear(&mut self, pos: usize) {
        self.occupied[pos] = false;
        self.fingerprints[pos] = 0;
        let start = pos * self.value_len;
        self.values[start..start + self.value_len].fill(0);
    }

    // =========================================================================
    // Encoding
    // =========================================================================

    /// Encode to exactly `layout.block_size()` bytes
    pub fn encode(&self, layout: &Layout) -> Vec<u8> {
        debug_assert_eq!(self.capacity(), layout.slot_capacity());
        debug_assert_eq!(self.value_len, layout.value_len());

        let mut buf = BytesMut::with_capacity(layout.block_size());

        // CRC placeholder, patched once the block is complete
        buf.put_u32_le(0);
        buf.put_u32_le(0);
        buf.put_u64_le(match self.overflow {
            Some(next) => layout.bucket_offset(next),
            None => NO_OVERFLOW,
        });

        for pos in 0..self.capacity() {
            let occupied = self.occupied[pos];
            buf.put_u8(if occupied { SLOT_OCCUPIED } else { 0 });
            buf.put_bytes(0, 7);
            if occupied {
                buf.put_u64_le(self.fingerprints[pos]);
                buf.put_slice(self.value_at(pos));
            } else {
                buf.put_bytes(0, 8 + self.value_len);
            }
        }

        buf.put_bytes(0, layout.block_size() - buf.len());

        let crc = crc32fast::hash(&buf[4..]);
        buf[0..4].copy_from_slice(&crc.to_le_bytes());

        buf.to_vec()
    }

    /// Decode and validate one bucket block
    pub fn decode(block: &[u8], layout: &Layout) -> Result<Self> {
        if block.len() != layout.block_size() {
            return Err(DiskHashError::Corruption(format!(
                "Bucket block is {} bytes, expected {}",
                block.len(),
                layout.block_size()
            )));
        }

        let mut cur = block;
        let stored_crc = cur.get_u32_le();
        let actual_crc = crc32fast::hash(&block[4..]);
        if stored_crc != actual_crc {
            return Err(DiskHashError::Corruption(format!(
                "Bucket checksum mismatch: stored {:#010x}, computed {:#010x}",
                stored_crc, actual_crc
            )));
        }

        cur.advance(4);
        let overflow = match cur.get_u64_le() {
            NO_OVERFLOW => None,
            offset => Some(layout.bucket_index_at(offset)?),
        };

        let mut bucket = Self::empty(layout);
        bucket.overflow = overflow;

        for pos in 0..layout.slot_capacity() {
            let flags = cur.get_u8();
            if flags & !SLOT_OCCUPIED != 0 {
                return Err(DiskHashError::Corruption(format!(
                    "Unknown slot flags {:#04x} at slot {}",
                    flags, pos
                )));
            }
            cur.advance(7);
            let fingerprint = cur.get_u64_le();
            let value = &cur[..layout.value_len()];

            if flags & SLOT_OCCUPIED != 0 {
                bucket.claim(pos, fingerprint, value)?;
            }
            cur.advance(layout.value_len());
        }

        Ok(bucket)
    }
}
