//! Identifiers, scratch locations and the crate error type.

use std::fmt;

/// Logical page number inside the database file.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Default)]
pub struct PageId(pub u64);

/// Commit/snapshot identifier. Strictly increasing across published transactions.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Default)]
pub struct TxId(pub u64);

/// Write-ahead journal segment that produced a page version.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Default)]
pub struct JournalId(pub u32);

/// Where a page version's bytes live before they are flushed to the data file.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Default)]
pub struct ScratchLocation {
    /// Scratch file holding the bytes.
    pub scratch_file_id: u32,
    /// Byte offset inside the scratch file.
    pub offset: u64,
}

impl ScratchLocation {
    /// Creates a location.
    pub const fn new(scratch_file_id: u32, offset: u64) -> Self {
        Self {
            scratch_file_id,
            offset,
        }
    }
}

/// Errors surfaced by the translation table.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum SombraError {
    /// A transaction id did not exceed the highest one already published.
    ///
    /// This means two writers ran concurrently. The engine must abort.
    #[error(
        "out-of-order transaction {tx_id} (last published {last_published}, page {page:?})"
    )]
    OutOfOrderTransaction {
        /// Transaction id that was rejected.
        tx_id: TxId,
        /// Highest id already present in the table or page.
        last_published: TxId,
        /// Page whose ordering was violated, when known.
        page: Option<PageId>,
    },
    /// Overflow storage could not be reserved; nothing was published.
    #[error("commit allocation failure: requested {requested} overflow chunks, {available} available")]
    CommitAllocationFailure {
        /// Chunks the publish needed.
        requested: usize,
        /// Chunks left in the pool.
        available: usize,
    },
    /// Invalid argument or configuration.
    #[error("invalid argument: {0}")]
    Invalid(&'static str),
}

impl SombraError {
    /// Returns `true` for invariant violations that must stop the engine.
    pub fn is_fatal(&self) -> bool {
        matches!(self, SombraError::OutOfOrderTransaction { .. })
    }
}

/// Crate result alias.
pub type Result<T> = std::result::Result<T, SombraError>;

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for JournalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for ScratchLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.scratch_file_id, self.offset)
    }
}

impl From<u64> for PageId {
    fn from(value: u64) -> Self {
        PageId(value)
    }
}

impl From<u64> for TxId {
    fn from(value: u64) -> Self {
        TxId(value)
    }
}

impl From<u32> for JournalId {
    fn from(value: u32) -> Self {
        JournalId(value)
    }
}
