use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use super::overflow::OverflowPool;
use super::record::VersionRecord;
use super::slot::PageSlot;
use crate::primitives::concurrency::LeaseId;
use crate::types::{PageId, Result, ScratchLocation, TxId};

const EMPTY_MIN: u64 = u64::MAX;
const EMPTY_MAX: u64 = 0;

/// Fixed run of contiguously numbered page slots.
///
/// Blocks are created on first write and live until the table is dropped.
/// The tx bounds only ever let pruning skip work; readers never consult them.
pub(crate) struct Block {
    base_page: u64,
    slots: Box<[PageSlot]>,
    min_tx: AtomicU64,
    max_tx: AtomicU64,
    versions: AtomicU64,
    live_pages: AtomicU32,
    // highest max_tx a completed prune pass fully covered
    pruned_through: AtomicU64,
}

/// What a single block prune did.
#[derive(Default)]
pub(crate) struct BlockPrune {
    pub(crate) scanned: bool,
    pub(crate) reclaimed: usize,
    pub(crate) chunks_returned: usize,
}

impl Block {
    pub(crate) fn new(base_page: u64, fan_out: usize) -> Self {
        Self {
            base_page,
            slots: (0..fan_out).map(|_| PageSlot::new()).collect(),
            min_tx: AtomicU64::new(EMPTY_MIN),
            max_tx: AtomicU64::new(EMPTY_MAX),
            versions: AtomicU64::new(0),
            live_pages: AtomicU32::new(0),
            pruned_through: AtomicU64::new(0),
        }
    }

    pub(crate) fn slot_for(&self, page: PageId) -> &PageSlot {
        let idx = (page.0 % self.slots.len() as u64) as usize;
        &self.slots[idx]
    }

    /// Appends `record` to the page's slot and widens the tx bounds.
    pub(crate) fn publish(
        &self,
        page: PageId,
        record: &VersionRecord,
        pool: &OverflowPool,
        reserved: &mut impl Iterator<Item = LeaseId>,
    ) -> Result<()> {
        let slot = self.slot_for(page);
        let was_empty = slot.is_empty();
        slot.append(record, pool, reserved)?;
        let tx = record.transaction_id.0;
        if self.min_tx.load(Ordering::Acquire) == EMPTY_MIN {
            self.min_tx.store(tx, Ordering::Release);
        }
        self.max_tx.fetch_max(tx, Ordering::AcqRel);
        self.versions.fetch_add(1, Ordering::Relaxed);
        if was_empty {
            self.live_pages.fetch_add(1, Ordering::Relaxed);
        }
        Ok(())
    }

    /// `(min, max)` tx ids stored in the block, `None` when empty.
    pub(crate) fn bounds(&self) -> Option<(TxId, TxId)> {
        let min = self.min_tx.load(Ordering::Acquire);
        let max = self.max_tx.load(Ordering::Acquire);
        (min != EMPTY_MIN).then_some((TxId(min), TxId(max)))
    }

    /// Compacts every non-empty slot against `threshold`, pushing discarded
    /// locations into `reclaimed`.
    pub(crate) fn prune(
        &self,
        threshold: TxId,
        pool: &OverflowPool,
        reclaimed: &mut Vec<ScratchLocation>,
    ) -> BlockPrune {
        let Some((min, max)) = self.bounds() else {
            return BlockPrune::default();
        };
        if min > threshold || self.pruned_through.load(Ordering::Acquire) >= max.0 {
            return BlockPrune::default();
        }

        let mut outcome = BlockPrune {
            scanned: true,
            ..BlockPrune::default()
        };
        let mut new_min = EMPTY_MIN;
        let mut live_pages = 0u32;
        for slot in self.slots.iter().filter(|slot| !slot.is_empty()) {
            let compaction = slot.compact(threshold, pool);
            outcome.reclaimed += compaction.discarded.len();
            outcome.chunks_returned += compaction.chunks_returned;
            reclaimed.extend(compaction.discarded.iter().map(|record| record.location));
            if compaction.remaining > 0 {
                live_pages += 1;
            }
            if let Some(first) = compaction.first_tx {
                new_min = new_min.min(first.0);
            }
        }

        self.versions
            .fetch_sub(outcome.reclaimed as u64, Ordering::Relaxed);
        self.live_pages.store(live_pages, Ordering::Relaxed);
        if new_min == EMPTY_MIN {
            self.min_tx.store(EMPTY_MIN, Ordering::Release);
            self.max_tx.store(EMPTY_MAX, Ordering::Release);
        } else {
            self.min_tx.store(new_min, Ordering::Release);
        }
        if threshold >= max {
            self.pruned_through.store(max.0, Ordering::Release);
        }
        outcome
    }

    /// Pushes every page of the block with a version in `[from, to]`.
    pub(crate) fn pages_modified_between(
        &self,
        from: TxId,
        to: TxId,
        pool: &OverflowPool,
        out: &mut Vec<PageId>,
    ) {
        match self.bounds() {
            Some((min, max)) if min <= to && max >= from => {}
            _ => return,
        }
        for (idx, slot) in self.slots.iter().enumerate() {
            if !slot.is_empty() && slot.touched_between(from, to, pool) {
                out.push(PageId(self.base_page + idx as u64));
            }
        }
    }

    pub(crate) fn version_count(&self) -> u64 {
        self.versions.load(Ordering::Relaxed)
    }

    pub(crate) fn live_pages(&self) -> u32 {
        self.live_pages.load(Ordering::Relaxed)
    }
}
