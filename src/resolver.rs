//! Resolver Protocol
//!
//! The table never stores key bytes. When a slot's fingerprint matches the
//! key being looked up, the caller's resolver decides whether that slot really
//! belongs to the key, usually by following the stored value (a pointer) into
//! an external log and comparing the key found there.
//!
//! ## Outcomes
//! - `Ok(Resolution::Confirmed)`: this slot is the target, stop scanning
//! - `Ok(Resolution::NotMatched)`: fingerprint collision, keep scanning
//! - `Err(e)`: abort the operation with nothing mutated; `e` comes back as
//!   `DiskHashError::Resolver(e)`
//!
//! Resolvers run on the caller's thread while the table lock is held (shared
//! for `get`, exclusive for `put`/`delete`). A resolver must not call back into
//! the same table.

use crate::error::BoxError;

/// Result a resolver returns for one candidate slot
pub type ResolveResult = std::result::Result<Resolution, BoxError>;

/// A resolver's decision for one candidate slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// The slot holds the requested key
    Confirmed,

    /// Fingerprint collision with a different key
    NotMatched,
}

/// Read-only view of a candidate slot handed to a resolver
#[derive(Debug, Clone, Copy)]
pub struct Slot<'a> {
    pub(crate) fingerprint: u64,
    pub(crate) value: &'a [u8],
}

impl<'a> Slot<'a> {
    /// Stored fingerprint of the key that claimed this slot
    pub fn fingerprint(&self) -> u64 {
        self.fingerprint
    }

    /// Stored value bytes (always the table's value length)
    pub fn value(&self) -> &'a [u8] {
        self.value
    }
}

/// Caller-supplied collision resolution
pub trait Resolver {
    fn resolve(&mut self, slot: Slot<'_>) -> ResolveResult;
}

impl<F> Resolver for F
where
    F: FnMut(Slot<'_>) -> ResolveResult,
{
    fn resolve(&mut self, slot: Slot<'_>) -> ResolveResult {
        self(slot)
    }
}
