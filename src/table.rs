//! Table Module
//!
//! Lifecycle of one opened table: create-or-attach, header validation,
//! locking, flush and close.
//!
//! ## Concurrency Model: Readers-Writer
//!
//! - **Reads** (`get`, `stats`, `verify`, `flush`): shared lock, run
//!   concurrently with each other
//! - **Writes** (`put`, `delete`): exclusive lock for the whole scan plus
//!   mutation, including however long the resolver takes
//! - **Close**: exclusive lock; afterwards every call returns
//!   `DiskHashError::Closed`
//!
//! A table opened with `Options::read_only` never writes to its file:
//! `put`/`delete` fail with `DiskHashError::ReadOnly`, and open, flush and
//! close leave the header (including its clean flag) as they found it.
//!
//! Holding the exclusive lock across the resolver is what keeps two puts from
//! claiming the same empty slot. It also means a slow resolver stalls every
//! other writer on the table.

use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;

use crate::config::Options;
use crate::engine::{Engine, Lookup, PutOutcome, VerifyReport};
use crate::error::{DiskHashError, Result};
use crate::fingerprint::{KeyHasher, Xxh3Hasher};
use crate::format::{Layout, TableHeader};
use crate::resolver::Resolver;
use crate::storage::StorageManager;

/// Point-in-time numbers about a table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableStats {
    pub value_len: usize,
    pub slot_capacity: usize,
    pub block_size: usize,
    pub bucket_count: u32,
    pub overflow_buckets: u64,
    pub entries: u64,
    pub file_size: u64,
}

/// An open disk hash table
pub struct Table {
    /// Path of the table file
    path: PathBuf,

    /// Options the table was opened with
    options: Options,

    /// `None` once closed
    inner: RwLock<Option<Engine>>,
}

impl Table {
    // =========================================================================
    // Internal Path Constants
    // =========================================================================
    pub const INDEX_FILENAME: &'static str = "index.dhx";

    /// Open or create a table using the default XXH3 hasher
    pub fn open(options: Options) -> Result<Self> {
        Self::open_with_hasher(options, Xxh3Hasher)
    }

    /// Open or create a table with a specific key hasher
    ///
    /// On open:
    /// 1. Validate options and create the directory
    /// 2. Create the file, or attach and check its header against the options
    /// 3. Recount entries if the previous session did not close cleanly
    /// 4. Mark the header dirty until `close()`
    ///
    /// A read-only open never creates anything and skips step 4.
    pub fn open_with_hasher<H: KeyHasher>(options: Options, hasher: H) -> Result<Self> {
        options.validate()?;

        let path = options.dir_path.join(Self::INDEX_FILENAME);
        let hasher: Box<dyn KeyHasher> = Box::new(hasher);

        let engine = if options.read_only || path.exists() {
            Self::attach(&path, &options, hasher)?
        } else {
            fs::create_dir_all(&options.dir_path)?;
            Self::create(&path, &options, hasher)?
        };

        Ok(Self {
            path,
            options,
            inner: RwLock::new(Some(engine)),
        })
    }

    /// Read the header of the table in `dir` without opening it
    pub fn read_header(dir: &Path) -> Result<TableHeader> {
        StorageManager::read_header(&dir.join(Self::INDEX_FILENAME))
    }

    // =========================================================================
    // Operations
    // =========================================================================

    /// Insert or update the value for `key`
    ///
    /// `value` must be exactly the table's value length. The resolver is
    /// asked about every fingerprint-matching slot until it confirms one.
    pub fn put<R: Resolver>(&self, key: &[u8], value: &[u8], resolver: R) -> Result<PutOutcome> {
        let mut guard = self.inner.write();
        let engine = guard.as_mut().ok_or(DiskHashError::Closed)?;
        self.check_writable()?;
        engine.put(key, value, resolver)
    }

    /// Look up `key`; the resolver copies out the value it confirms
    pub fn get<R: Resolver>(&self, key: &[u8], resolver: R) -> Result<Lookup> {
        let guard = self.inner.read();
        let engine = guard.as_ref().ok_or(DiskHashError::Closed)?;
        engine.get(key, resolver)
    }

    /// Remove `key`; absence is reported as `Lookup::NotFound`, not an error
    pub fn delete<R: Resolver>(&self, key: &[u8], resolver: R) -> Result<Lookup> {
        let mut guard = self.inner.write();
        let engine = guard.as_mut().ok_or(DiskHashError::Closed)?;
        self.check_writable()?;
        engine.delete(key, resolver)
    }

    /// Persist the entry count and fsync; the table stays open
    pub fn flush(&self) -> Result<()> {
        let guard = self.inner.read();
        let engine = guard.as_ref().ok_or(DiskHashError::Closed)?;
        if self.options.read_only {
            return Ok(());
        }
        Self::write_header(engine, false)?;
        engine.storage().sync()
    }

    /// Flush, mark the file clean and release it
    ///
    /// Every later call on this handle, including a second `close()`, fails
    /// with `DiskHashError::Closed`.
    pub fn close(&self) -> Result<()> {
        let mut guard = self.inner.write();
        let engine = guard.take().ok_or(DiskHashError::Closed)?;

        if !self.options.read_only {
            Self::write_header(&engine, true)?;
            engine.storage().sync()?;
        }

        tracing::info!(
            path = %self.path.display(),
            entries = engine.entry_count(),
            overflow_buckets = engine.storage().overflow_buckets(),
            "Closed table"
        );

        Ok(())
    }

    /// Current table statistics
    pub fn stats(&self) -> Result<TableStats> {
        let guard = self.inner.read();
        let engine = guard.as_ref().ok_or(DiskHashError::Closed)?;
        let storage = engine.storage();
        let layout = storage.layout();

        Ok(TableStats {
            value_len: layout.value_len(),
            slot_capacity: layout.slot_capacity(),
            block_size: layout.block_size(),
            bucket_count: storage.bucket_count(),
            overflow_buckets: storage.overflow_buckets(),
            entries: engine.entry_count(),
            file_size: storage.file_size(),
        })
    }

    /// Walk every bucket chain and check its structure
    pub fn verify(&self) -> Result<VerifyReport> {
        let guard = self.inner.read();
        let engine = guard.as_ref().ok_or(DiskHashError::Closed)?;
        engine.verify()
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Path of the table file
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_closed(&self) -> bool {
        self.inner.read().is_none()
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn create(path: &Path, options: &Options, hasher: Box<dyn KeyHasher>) -> Result<Engine> {
        let layout = Layout::new(options.value_len, options.block_size);
        let bucket_count = options.initial_bucket_count(layout.slot_capacity() as u32)?;

        let mut header = TableHeader::new(layout, hasher.id(), bucket_count);
        header.clean = false;

        let storage = StorageManager::create(path, &header, options.sync_strategy)?;
        Ok(Engine::new(storage, hasher, 0))
    }

    fn attach(path: &Path, options: &Options, hasher: Box<dyn KeyHasher>) -> Result<Engine> {
        // Reject mismatched options before anything touches the file
        let header = StorageManager::read_header(path)?;
        Self::check_header(&header, options, hasher.as_ref())?;

        let (storage, header) = if options.read_only {
            StorageManager::open_read_only(path)?
        } else {
            StorageManager::open(path, options.sync_strategy)?
        };

        let mut engine = Engine::new(storage, hasher, header.entry_count);

        if !header.clean {
            let report = engine.recount()?;
            tracing::warn!(
                path = %path.display(),
                recorded = header.entry_count,
                counted = report.entries,
                orphaned_buckets = report.orphaned_buckets,
                "Table was not closed cleanly, recounted entries"
            );
        }

        if !options.read_only {
            Self::write_header(&engine, false)?;
        }

        tracing::info!(
            path = %path.display(),
            entries = engine.entry_count(),
            buckets = engine.storage().bucket_count(),
            overflow_buckets = engine.storage().overflow_buckets(),
            read_only = options.read_only,
            "Opened table"
        );

        Ok(engine)
    }

    /// Reject a persisted header that disagrees with the requested options
    fn check_header(header: &TableHeader, options: &Options, hasher: &dyn KeyHasher) -> Result<()> {
        if header.layout.value_len() != options.value_len {
            return Err(DiskHashError::Config(format!(
                "value length mismatch: table was created with {}, options request {}",
                header.layout.value_len(),
                options.value_len
            )));
        }

        if let Some(count) = options.bucket_count {
            if count != header.bucket_count {
                return Err(DiskHashError::Config(format!(
                    "bucket count mismatch: table was created with {}, options request {}",
                    header.bucket_count, count
                )));
            }
        }

        if header.hasher_id != hasher.id() {
            return Err(DiskHashError::Config(format!(
                "hasher mismatch: table was created with hasher {}, opened with {}",
                header.hasher_id,
                hasher.id()
            )));
        }

        Ok(())
    }

    fn check_writable(&self) -> Result<()> {
        if self.options.read_only {
            return Err(DiskHashError::ReadOnly);
        }
        Ok(())
    }

    fn write_header(engine: &Engine, clean: bool) -> Result<()> {
        let storage = engine.storage();
        let header = TableHeader {
            layout: *storage.layout(),
            hasher_id: engine.hasher_id(),
            bucket_count: storage.bucket_count(),
            entry_count: engine.entry_count(),
            clean,
        };
        storage.write_header(&header)
    }
}

impl Drop for Table {
    fn drop(&mut self) {
        if self.inner.get_mut().is_none() {
            return;
        }
        if let Err(e) = self.close() {
            tracing::warn!(path = %self.path.display(), error = %e, "Failed to close table on drop");
        }
    }
}
