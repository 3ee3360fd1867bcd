use std::sync::atomic::{AtomicU32, Ordering};

use super::record::{empty_cells, RecordCell};
use crate::primitives::concurrency::{LeaseId, ObjectPool, PoolItem, NO_LEASE};

/// Version records per overflow chunk.
pub const OVERFLOW_CHUNK_VERSIONS: usize = 16;

/// Spill storage for a hot page slot. Chunks chain through `next`.
pub struct OverflowChunk {
    pub(crate) cells: [RecordCell; OVERFLOW_CHUNK_VERSIONS],
    next: AtomicU32,
}

impl OverflowChunk {
    pub(crate) fn next(&self) -> Option<LeaseId> {
        LeaseId::from_raw(self.next.load(Ordering::Acquire))
    }

    pub(crate) fn set_next(&self, next: Option<LeaseId>) {
        self.next
            .store(next.map_or(NO_LEASE, LeaseId::raw), Ordering::Release);
    }
}

impl PoolItem for OverflowChunk {
    fn empty() -> Self {
        Self {
            cells: empty_cells(),
            next: AtomicU32::new(NO_LEASE),
        }
    }

    fn recycle(&self) {
        for cell in &self.cells {
            cell.clear();
        }
        self.next.store(NO_LEASE, Ordering::Release);
    }
}

/// Pool of overflow chunks shared by every block of a table.
pub type OverflowPool = ObjectPool<OverflowChunk>;

/// Chunks needed to hold `len` records in a slot.
pub(crate) fn chunks_for_len(len: usize, inline: usize) -> usize {
    len.saturating_sub(inline).div_ceil(OVERFLOW_CHUNK_VERSIONS)
}
