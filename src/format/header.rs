//! Table header
//!
//! The 64-byte block at offset 0 describing the table's fixed geometry.
//!
//! ```text
//!  0  Magic "DHIX" (4)     4  Version u16       6  Flags u16
//!  8  ValueLen u32        12  SlotCapacity u32  16  BlockSize u32
//! 20  HasherId u32        24  BucketCount u32   28  Reserved (4)
//! 32  EntryCount u64      40  Reserved (20)     60  CRC32 of 0..60
//! ```

use bytes::{Buf, BufMut, BytesMut};

use crate::error::{DiskHashError, Result};

use super::{Layout, HEADER_SIZE, MAGIC, VERSION};

/// Header flag: the table was closed in an orderly way
const FLAG_CLEAN: u16 = 0x0001;

/// Bytes covered by the header checksum
const CHECKSUMMED_LEN: usize = HEADER_SIZE as usize - 4;

/// Decoded table header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableHeader {
    pub layout: Layout,
    pub hasher_id: u32,
    pub bucket_count: u32,
    /// Live entries as of the last header write
    pub entry_count: u64,
    /// Set on orderly close; cleared while the table is open
    pub clean: bool,
}

impl TableHeader {
    pub fn new(layout: Layout, hasher_id: u32, bucket_count: u32) -> Self {
        Self {
            layout,
            hasher_id,
            bucket_count,
            entry_count: 0,
            clean: true,
        }
    }

    /// Encode to exactly `HEADER_SIZE` bytes
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(HEADER_SIZE as usize);

        buf.put_slice(MAGIC);
        buf.put_u16_le(VERSION);
        buf.put_u16_le(if self.clean { FLAG_CLEAN } else { 0 });
        buf.put_u32_le(self.layout.value_len() as u32);
        buf.put_u32_le(self.layout.slot_capacity() as u32);
        buf.put_u32_le(self.layout.block_size() as u32);
        buf.put_u32_le(self.hasher_id);
        buf.put_u32_le(self.bucket_count);
        buf.put_bytes(0, 4);
        buf.put_u64_le(self.entry_count);
        buf.put_bytes(0, CHECKSUMMED_LEN - buf.len());

        let crc = crc32fast::hash(&buf);
        buf.put_u32_le(crc);

        buf.to_vec()
    }

    /// Decode and validate a header block
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_SIZE as usize {
            return Err(DiskHashError::Corruption(format!(
                "Incomplete header: expected {} bytes, got {}",
                HEADER_SIZE,
                bytes.len()
            )));
        }

        let (body, mut crc_bytes) = bytes[..HEADER_SIZE as usize].split_at(CHECKSUMMED_LEN);

        if &body[0..4] != MAGIC {
            return Err(DiskHashError::Corruption(format!(
                "Invalid table magic: expected DHIX, got {:?}",
                &body[0..4]
            )));
        }

        let stored_crc = crc_bytes.get_u32_le();
        let actual_crc = crc32fast::hash(body);
        if stored_crc != actual_crc {
            return Err(DiskHashError::Corruption(format!(
                "Header checksum mismatch: stored {:#010x}, computed {:#010x}",
                stored_crc, actual_crc
            )));
        }

        let mut cur = &body[4..];
        let version = cur.get_u16_le();
        if version != VERSION {
            return Err(DiskHashError::Corruption(format!(
                "Unsupported table version: {}",
                version
            )));
        }

        let flags = cur.get_u16_le();
        let value_len = cur.get_u32_le() as usize;
        let slot_capacity = cur.get_u32_le() as usize;
        let block_size = cur.get_u32_le() as usize;
        let hasher_id = cur.get_u32_le();
        let bucket_count = cur.get_u32_le();
        cur.advance(4);
        let entry_count = cur.get_u64_le();

        if bucket_count == 0 {
            return Err(DiskHashError::Corruption(
                "header records zero primary buckets".to_string(),
            ));
        }

        Ok(Self {
            layout: Layout::from_parts(value_len, slot_capacity, block_size)?,
            hasher_id,
            bucket_count,
            entry_count,
            clean: flags & FLAG_CLEAN != 0,
        })
    }
}
