//! Error types for diskhash
//!
//! Provides a unified error type for all table operations.

use thiserror::Error;

/// Result type alias using DiskHashError
pub type Result<T> = std::result::Result<T, DiskHashError>;

/// Boxed error raised by caller code (resolvers)
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Unified error type for diskhash operations
#[derive(Debug, Error)]
pub enum DiskHashError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // On-disk Format Errors
    // -------------------------------------------------------------------------
    #[error("Corruption detected: {0}")]
    Corruption(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Value length mismatch: expected {expected} bytes, got {actual}")]
    ValueLength { expected: usize, actual: usize },

    // -------------------------------------------------------------------------
    // Caller Errors
    // -------------------------------------------------------------------------
    /// Raised by a resolver; carried through unchanged.
    #[error("Resolver error: {0}")]
    Resolver(BoxError),

    // -------------------------------------------------------------------------
    // Lifecycle Errors
    // -------------------------------------------------------------------------
    #[error("Table is closed")]
    Closed,

    #[error("Table is opened read-only")]
    ReadOnly,
}
