//! Storage Manager
//!
//! Owns the table file and performs fixed-offset block I/O.
//!
//! ## Responsibilities
//! - Create a new table file (header + primary region) or attach to one
//! - Read/write bucket blocks in place by index
//! - Append overflow blocks past the primary region
//! - Apply the configured sync strategy to every block write

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::config::SyncStrategy;
use crate::error::{DiskHashError, Result};
use crate::format::{Bucket, Layout, TableHeader, HEADER_SIZE};

/// Block-level access to one table file
///
/// ## Concurrency:
/// - `file`: Protected by Mutex (seek + read/write must not interleave)
/// - `total_buckets`: Atomic, only grows
/// - All methods use `&self`; callers serialize mutation at the table level
pub struct StorageManager {
    /// Path to the table file
    path: PathBuf,

    /// Block geometry (fixed at creation)
    layout: Layout,

    /// Number of primary buckets
    bucket_count: u32,

    /// File handle plus unsynced write counter
    file: Mutex<BlockFile>,

    /// Primary + overflow buckets currently in the file
    total_buckets: AtomicU64,

    /// When block writes are fsynced
    sync_strategy: SyncStrategy,
}

struct BlockFile {
    file: File,
    unsynced: usize,
}

impl BlockFile {
    /// Count one write and fsync if the strategy says so
    fn record_write(&mut self, strategy: SyncStrategy) -> io::Result<()> {
        self.unsynced += 1;

        let due = match strategy {
            SyncStrategy::EveryWrite => true,
            SyncStrategy::EveryNWrites { count } => self.unsynced >= count,
            SyncStrategy::Manual => false,
        };

        if due {
            self.file.sync_data()?;
            self.unsynced = 0;
        }
        Ok(())
    }

    fn write_at(&mut self, offset: u64, bytes: &[u8], strategy: SyncStrategy) -> io::Result<()> {
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(bytes)?;
        self.record_write(strategy)
    }
}

impl StorageManager {
    /// Create a new table file with an empty primary region
    ///
    /// The file is built under a temporary name and renamed into place once
    /// fully written and synced, so a crash never leaves a half-built table
    /// at `path`.
    pub fn create(path: &Path, header: &TableHeader, sync_strategy: SyncStrategy) -> Result<Self> {
        let layout = header.layout;
        let tmp_path = path.with_extension("dhx.tmp");

        {
            let file = OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&tmp_path)?;

            let mut writer = BufWriter::new(file);
            writer.write_all(&header.encode())?;

            // Every primary block starts out identical
            let empty = Bucket::empty(&layout).encode(&layout);
            for _ in 0..header.bucket_count {
                writer.write_all(&empty)?;
            }
            writer.flush()?;

            let file = writer.into_inner().map_err(|e| {
                DiskHashError::Io(io::Error::new(
                    e.error().kind(),
                    format!("Failed to flush new table: {}", e.error()),
                ))
            })?;
            file.sync_all()?;
        }

        fs::rename(&tmp_path, path)?;

        tracing::info!(
            path = %path.display(),
            buckets = header.bucket_count,
            slots_per_bucket = layout.slot_capacity(),
            block_size = layout.block_size(),
            "Created table file"
        );

        let file = OpenOptions::new().read(true).write(true).open(path)?;

        Ok(Self {
            path: path.to_path_buf(),
            layout,
            bucket_count: header.bucket_count,
            file: Mutex::new(BlockFile { file, unsynced: 0 }),
            total_buckets: AtomicU64::new(u64::from(header.bucket_count)),
            sync_strategy,
        })
    }

    /// Attach to an existing table file
    ///
    /// Validates the header and that the file holds at least the whole
    /// primary region. A partial block past the primary region is the
    /// remnant of an interrupted overflow append; nothing links to it, so it
    /// is cut off and the table opens normally.
    pub fn open(path: &Path, sync_strategy: SyncStrategy) -> Result<(Self, TableHeader)> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        Self::attach(path, file, sync_strategy, true)
    }

    /// Attach to an existing table file without write access
    ///
    /// A torn trailing block is ignored rather than truncated.
    pub fn open_read_only(path: &Path) -> Result<(Self, TableHeader)> {
        let file = File::open(path)?;
        Self::attach(path, file, SyncStrategy::Manual, false)
    }

    fn attach(
        path: &Path,
        mut file: File,
        sync_strategy: SyncStrategy,
        writable: bool,
    ) -> Result<(Self, TableHeader)> {
        let header = Self::read_header_from(&mut file)?;
        let layout = header.layout;

        let file_len = file.metadata()?.len();
        let block = layout.block_size() as u64;
        let data_len = file_len - HEADER_SIZE;

        let total_buckets = data_len / block;
        let torn = data_len % block;

        if total_buckets < u64::from(header.bucket_count) {
            return Err(DiskHashError::Corruption(format!(
                "Table file is truncated: {} data bytes, expected at least {} blocks of {}",
                data_len, header.bucket_count, block
            )));
        }

        if torn != 0 {
            let intact_len = layout.bucket_offset(total_buckets);
            tracing::warn!(
                path = %path.display(),
                torn_bytes = torn,
                intact_len,
                truncated = writable,
                "Discarding partial overflow block left by an interrupted append"
            );
            if writable {
                file.set_len(intact_len)?;
                file.sync_all()?;
            }
        }

        let manager = Self {
            path: path.to_path_buf(),
            layout,
            bucket_count: header.bucket_count,
            file: Mutex::new(BlockFile { file, unsynced: 0 }),
            total_buckets: AtomicU64::new(total_buckets),
            sync_strategy,
        };

        Ok((manager, header))
    }

    /// Read and validate the header of a table file without attaching to it
    pub fn read_header(path: &Path) -> Result<TableHeader> {
        let mut file = File::open(path)?;
        Self::read_header_from(&mut file)
    }

    fn read_header_from(file: &mut File) -> Result<TableHeader> {
        let mut bytes = [0u8; HEADER_SIZE as usize];
        file.seek(SeekFrom::Start(0))?;
        file.read_exact(&mut bytes).map_err(|e| match e.kind() {
            io::ErrorKind::UnexpectedEof => {
                DiskHashError::Corruption("Table file is shorter than its header".to_string())
            }
            _ => DiskHashError::Io(e),
        })?;
        TableHeader::decode(&bytes)
    }

    /// Overwrite the header block
    pub fn write_header(&self, header: &TableHeader) -> Result<()> {
        let bytes = header.encode();
        self.file.lock().write_at(0, &bytes, self.sync_strategy)?;
        Ok(())
    }

    // =========================================================================
    // Block I/O
    // =========================================================================

    /// Read and decode the bucket at `index`
    pub fn read_bucket(&self, index: u64) -> Result<Bucket> {
        self.check_extent(index)?;

        let mut block = vec![0u8; self.layout.block_size()];
        {
            let mut handle = self.file.lock();
            handle.file.seek(SeekFrom::Start(self.layout.bucket_offset(index)))?;
            handle.file.read_exact(&mut block)?;
        }

        Bucket::decode(&block, &self.layout)
    }

    /// Encode and overwrite the bucket at `index` in place
    pub fn write_bucket(&self, index: u64, bucket: &Bucket) -> Result<()> {
        self.check_extent(index)?;

        let block = bucket.encode(&self.layout);
        self.file
            .lock()
            .write_at(self.layout.bucket_offset(index), &block, self.sync_strategy)?;
        Ok(())
    }

    /// Append `bucket` as a new overflow block and return its index
    pub fn append_bucket(&self, bucket: &Bucket) -> Result<u64> {
        let block = bucket.encode(&self.layout);

        let mut handle = self.file.lock();
        let index = self.total_buckets.load(Ordering::Acquire);
        let offset = self.layout.bucket_offset(index);

        if let Err(e) = handle.write_at(offset, &block, self.sync_strategy) {
            // Drop whatever part of the block made it to the file
            if let Err(trim) = handle.file.set_len(offset) {
                tracing::warn!(offset, error = %trim, "Failed to trim partial overflow block");
            }
            return Err(e.into());
        }
        self.total_buckets.store(index + 1, Ordering::Release);

        tracing::debug!(index, path = %self.path.display(), "Appended overflow bucket");

        Ok(index)
    }

    /// Grow the file by one empty overflow block and return its index
    pub fn append_overflow_bucket(&self) -> Result<u64> {
        self.append_bucket(&Bucket::empty(&self.layout))
    }

    /// Force all written blocks to stable storage
    pub fn sync(&self) -> Result<()> {
        let mut handle = self.file.lock();
        handle.file.sync_all()?;
        handle.unsynced = 0;
        Ok(())
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    /// Number of primary buckets
    pub fn bucket_count(&self) -> u32 {
        self.bucket_count
    }

    /// Primary + overflow buckets in the file
    pub fn total_buckets(&self) -> u64 {
        self.total_buckets.load(Ordering::Acquire)
    }

    pub fn overflow_buckets(&self) -> u64 {
        self.total_buckets() - u64::from(self.bucket_count)
    }

    /// Current file size in bytes
    pub fn file_size(&self) -> u64 {
        self.layout.bucket_offset(self.total_buckets())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn check_extent(&self, index: u64) -> Result<()> {
        let total = self.total_buckets();
        if index >= total {
            return Err(DiskHashError::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("bucket {} is past the end of the file ({} buckets)", index, total),
            )));
        }
        Ok(())
    }
}
