//! # diskhash
//!
//! A persistent, disk-resident hash index. Keys of any length map to values
//! of one fixed length (typically an encoded pointer into a value log).
//! Key bytes are never stored: each slot keeps a 64-bit fingerprint, and the
//! caller's resolver confirms which fingerprint-matching slot is the real key.
//!
//! - Fixed primary bucket region sized at creation
//! - Per-bucket overflow chains instead of rehashing
//! - Readers-writer locking (concurrent gets, exclusive put/delete)
//! - CRC32-checked header and bucket blocks
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         Table                                │
//! │          (open/close, RwLock, header validation)             │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                        Engine                                │
//! │        (fingerprint → chain scan → resolver → mutate)        │
//! └──────────┬───────────────────────────────────┬──────────────┘
//!            │                                   │
//!            ▼                                   ▼
//!   ┌─────────────────┐                 ┌─────────────────┐
//!   │   Fingerprint   │                 │ StorageManager  │
//!   │     (XXH3)      │                 │  (block I/O)    │
//!   └─────────────────┘                 └────────┬────────┘
//!                                                │
//!                                                ▼
//!                                       ┌─────────────────┐
//!                                       │  Record Codec   │
//!                                       │ (header/bucket) │
//!                                       └─────────────────┘
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use diskhash::{Options, Resolution, ResolveResult, Slot, Table};
//!
//! # fn main() -> diskhash::Result<()> {
//! let options = Options::builder()
//!     .dir_path("/tmp/diskhash-example")
//!     .value_len(8)
//!     .build();
//! let table = Table::open(options)?;
//!
//! // A single-key table: any fingerprint match is the key itself.
//! let confirm = |_: Slot<'_>| -> ResolveResult { Ok(Resolution::Confirmed) };
//! table.put(b"user-1", &42u64.to_le_bytes(), confirm)?;
//!
//! let mut found = None;
//! table.get(b"user-1", |slot: Slot<'_>| -> ResolveResult {
//!     found = Some(slot.value().to_vec());
//!     Ok(Resolution::Confirmed)
//! })?;
//! assert_eq!(found, Some(42u64.to_le_bytes().to_vec()));
//!
//! table.close()?;
//! # Ok(())
//! # }
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod fingerprint;
pub mod format;
pub mod storage;
pub mod resolver;
pub mod engine;
pub mod table;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{BoxError, DiskHashError, Result};
pub use config::{Options, SyncStrategy};
pub use engine::{Lookup, PutOutcome, VerifyReport};
pub use fingerprint::{KeyHasher, Xxh3Hasher};
pub use resolver::{Resolution, ResolveResult, Resolver, Slot};
pub use table::{Table, TableStats};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of diskhash
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
