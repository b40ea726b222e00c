//! Configuration for diskhash
//!
//! Table options with sensible defaults. Most of these only matter when the
//! table file is first created; see [`Options`] for which ones are checked
//! against the persisted header on reopen.

use std::path::PathBuf;

use crate::error::{DiskHashError, Result};

/// Largest value length a table accepts (1 MiB)
pub const MAX_VALUE_LEN: usize = 1024 * 1024;

/// Primary bucket count when neither a count nor a hint is given
pub const DEFAULT_BUCKET_COUNT: u32 = 256;

/// Default target size of one bucket block (in bytes)
pub const DEFAULT_BLOCK_SIZE: u32 = 4096;

/// Smallest accepted target block size (in bytes)
pub const MIN_BLOCK_SIZE: u32 = 64;

/// Options for opening a table
#[derive(Debug, Clone)]
pub struct Options {
    // -------------------------------------------------------------------------
    // Location
    // -------------------------------------------------------------------------
    /// Directory holding the table file
    /// Internal structure:
    ///   {dir_path}/
    ///     └── index.dhx        (header + bucket blocks)
    pub dir_path: PathBuf,

    // -------------------------------------------------------------------------
    // Layout (fixed for the table's lifetime)
    // -------------------------------------------------------------------------
    /// Length of every stored value, in bytes. Required; must match on reopen.
    pub value_len: usize,

    /// Number of primary buckets. Creation-time only; when set on reopen it
    /// must match the persisted count.
    pub bucket_count: Option<u32>,

    /// Expected number of keys, used to size the primary region when
    /// `bucket_count` is not given
    pub expected_entries: Option<u64>,

    /// Target bucket block size in bytes (creation-time only)
    pub block_size: u32,

    // -------------------------------------------------------------------------
    // Durability
    // -------------------------------------------------------------------------
    /// How often block writes are fsynced
    pub sync_strategy: SyncStrategy,

    // -------------------------------------------------------------------------
    // Access
    // -------------------------------------------------------------------------
    /// Attach to an existing table without ever writing to it. Put/delete
    /// fail, and open/flush/close leave the header untouched.
    pub read_only: bool,
}

/// Sync strategy: how often to fsync the table file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStrategy {
    /// fsync after every block write (safest, slowest)
    EveryWrite,

    /// fsync after N unsynced block writes (balanced durability/performance)
    EveryNWrites { count: usize },

    /// Only fsync on explicit `flush()` / `close()`
    Manual,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            dir_path: PathBuf::from("./diskhash_data"),
            value_len: 0,
            bucket_count: None,
            expected_entries: None,
            block_size: DEFAULT_BLOCK_SIZE,
            sync_strategy: SyncStrategy::Manual,
            read_only: false,
        }
    }
}

impl Options {
    /// Create a new options builder
    pub fn builder() -> OptionsBuilder {
        OptionsBuilder::default()
    }

    /// Check the options for values no table could be opened with
    pub fn validate(&self) -> Result<()> {
        if self.dir_path.as_os_str().is_empty() {
            return Err(DiskHashError::Config("dir_path must not be empty".to_string()));
        }

        if self.value_len == 0 || self.value_len > MAX_VALUE_LEN {
            return Err(DiskHashError::Config(format!(
                "value_len must be in 1..={}, got {}",
                MAX_VALUE_LEN, self.value_len
            )));
        }

        if self.bucket_count == Some(0) {
            return Err(DiskHashError::Config("bucket_count must be positive".to_string()));
        }

        if self.block_size < MIN_BLOCK_SIZE {
            return Err(DiskHashError::Config(format!(
                "block_size must be at least {}, got {}",
                MIN_BLOCK_SIZE, self.block_size
            )));
        }

        if let SyncStrategy::EveryNWrites { count: 0 } = self.sync_strategy {
            return Err(DiskHashError::Config(
                "EveryNWrites count must be positive".to_string(),
            ));
        }

        Ok(())
    }

    /// Number of primary buckets to allocate for a new table
    ///
    /// Explicit `bucket_count` wins; otherwise `expected_entries` is spread at
    /// a 3/4 fill target over buckets of `slot_capacity` slots.
    pub fn initial_bucket_count(&self, slot_capacity: u32) -> Result<u32> {
        if let Some(count) = self.bucket_count {
            return Ok(count);
        }

        let Some(expected) = self.expected_entries else {
            return Ok(DEFAULT_BUCKET_COUNT);
        };

        let per_bucket = (u64::from(slot_capacity) * 3 / 4).max(1);
        let buckets = expected.div_ceil(per_bucket).max(1);

        u32::try_from(buckets).map_err(|_| {
            DiskHashError::Config(format!(
                "expected_entries {} needs {} buckets, more than a table can address",
                expected, buckets
            ))
        })
    }
}

/// Builder for Options
#[derive(Default)]
pub struct OptionsBuilder {
    options: Options,
}

impl OptionsBuilder {
    /// Set the directory holding the table file
    pub fn dir_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.options.dir_path = path.into();
        self
    }

    /// Set the fixed value length (in bytes)
    pub fn value_len(mut self, len: usize) -> Self {
        self.options.value_len = len;
        self
    }

    /// Set the number of primary buckets
    pub fn bucket_count(mut self, count: u32) -> Self {
        self.options.bucket_count = Some(count);
        self
    }

    /// Set the expected number of keys (sizing hint)
    pub fn expected_entries(mut self, count: u64) -> Self {
        self.options.expected_entries = Some(count);
        self
    }

    /// Set the target bucket block size (in bytes)
    pub fn block_size(mut self, size: u32) -> Self {
        self.options.block_size = size;
        self
    }

    /// Set the sync strategy
    pub fn sync_strategy(mut self, strategy: SyncStrategy) -> Self {
        self.options.sync_strategy = strategy;
        self
    }

    /// Open without writing to the table file
    pub fn read_only(mut self, read_only: bool) -> Self {
        self.options.read_only = read_only;
        self
    }

    pub fn build(self) -> Options {
        self.options
    }
}
