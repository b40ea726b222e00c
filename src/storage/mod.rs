//! Storage Module
//!
//! Block-addressed persistence for one table file.
//!
//! ## Responsibilities
//! - Fixed-offset reads and in-place writes of bucket blocks
//! - Append-only growth of the overflow region
//! - Header persistence (geometry, entry count, clean flag)
//!
//! Overflow blocks are never freed or moved, even after every slot in them
//! has been emptied; a bucket index stays valid for the life of the file.

mod manager;

pub use manager::StorageManager;
