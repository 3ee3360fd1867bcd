use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};

use crate::types::{JournalId, ScratchLocation, TxId};

/// Version records held inline in every page slot before overflow is leased.
pub const INLINE_VERSIONS: usize = 4;

/// Record flags as stored in a [`RecordCell`].
pub mod flags {
    /// The page was released as of this transaction.
    pub const FREED: u8 = 0x01;
    /// Superseded by durable data; kept until a newer version is pruned past it.
    pub const UNUSED: u8 = 0x02;
}

/// One published version of a page: `(page, transaction)` to scratch location.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct VersionRecord {
    /// Snapshot at which this version became visible.
    pub transaction_id: TxId,
    /// Where the version's bytes currently live.
    pub location: ScratchLocation,
    /// Journal segment that produced the version.
    pub journal_id: JournalId,
    /// As of this transaction the page no longer exists.
    pub is_freed_marker: bool,
    /// Advisory: set by pruning once the bytes are durable in the data file.
    pub is_unused: bool,
}

impl VersionRecord {
    /// Builds a record for `version` published at `transaction_id`.
    pub fn new(transaction_id: TxId, version: PageVersion) -> Self {
        Self {
            transaction_id,
            location: version.location,
            journal_id: version.journal_id,
            is_freed_marker: version.is_freed_marker,
            is_unused: false,
        }
    }

    fn flag_bits(&self) -> u8 {
        let mut bits = 0;
        if self.is_freed_marker {
            bits |= flags::FREED;
        }
        if self.is_unused {
            bits |= flags::UNUSED;
        }
        bits
    }
}

/// A page modification handed to `publish` by a committing transaction.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct PageVersion {
    /// Scratch location of the new page image.
    pub location: ScratchLocation,
    /// Journal segment recording the change.
    pub journal_id: JournalId,
    /// The transaction released the page instead of writing it.
    pub is_freed_marker: bool,
}

impl PageVersion {
    /// A regular page write.
    pub fn live(location: ScratchLocation, journal_id: JournalId) -> Self {
        Self {
            location,
            journal_id,
            is_freed_marker: false,
        }
    }

    /// A page release.
    pub fn freed(location: ScratchLocation, journal_id: JournalId) -> Self {
        Self {
            location,
            journal_id,
            is_freed_marker: true,
        }
    }
}

/// Atomic storage for one [`VersionRecord`].
///
/// Fields are stored separately; consistency across them comes from the
/// owning slot's sequence counter and length.
pub(crate) struct RecordCell {
    tx: AtomicU64,
    offset: AtomicU64,
    // scratch file id in the high half, journal id in the low half
    ids: AtomicU64,
    flags: AtomicU8,
}

impl RecordCell {
    pub(crate) const fn empty() -> Self {
        Self {
            tx: AtomicU64::new(0),
            offset: AtomicU64::new(0),
            ids: AtomicU64::new(0),
            flags: AtomicU8::new(0),
        }
    }

    pub(crate) fn store(&self, record: &VersionRecord) {
        let ids = (u64::from(record.location.scratch_file_id) << 32)
            | u64::from(record.journal_id.0);
        self.offset.store(record.location.offset, Ordering::Release);
        self.ids.store(ids, Ordering::Release);
        self.flags.store(record.flag_bits(), Ordering::Release);
        self.tx.store(record.transaction_id.0, Ordering::Release);
    }

    pub(crate) fn load(&self) -> VersionRecord {
        let tx = self.tx.load(Ordering::Acquire);
        let offset = self.offset.load(Ordering::Acquire);
        let ids = self.ids.load(Ordering::Acquire);
        let bits = self.flags.load(Ordering::Acquire);
        VersionRecord {
            transaction_id: TxId(tx),
            location: ScratchLocation::new((ids >> 32) as u32, offset),
            journal_id: JournalId(ids as u32),
            is_freed_marker: bits & flags::FREED != 0,
            is_unused: bits & flags::UNUSED != 0,
        }
    }

    pub(crate) fn tx(&self) -> u64 {
        self.tx.load(Ordering::Acquire)
    }

    pub(crate) fn mark_unused(&self) {
        self.flags.fetch_or(flags::UNUSED, Ordering::AcqRel);
    }

    pub(crate) fn clear(&self) {
        self.tx.store(0, Ordering::Release);
        self.offset.store(0, Ordering::Release);
        self.ids.store(0, Ordering::Release);
        self.flags.store(0, Ordering::Release);
    }
}

pub(crate) fn empty_cells<const N: usize>() -> [RecordCell; N] {
    std::array::from_fn(|_| RecordCell::empty())
}
