use std::ops::ControlFlow;
use std::sync::atomic::{AtomicU32, Ordering};

use smallvec::SmallVec;

use super::overflow::{chunks_for_len, OverflowPool, OVERFLOW_CHUNK_VERSIONS};
use super::record::{empty_cells, RecordCell, VersionRecord, INLINE_VERSIONS};
use crate::primitives::concurrency::{LeaseId, SeqCounter, NO_LEASE};
use crate::types::{Result, SombraError, TxId};

type ChunkChain = SmallVec<[LeaseId; 4]>;

/// Ordered versions of a single page.
///
/// Records `[0, len)` are strictly increasing by transaction id. The first
/// [`INLINE_VERSIONS`] live inline, the rest in a chain of pooled overflow
/// chunks. Appends become visible through a release store of `len`;
/// compaction rewrites records in place inside a `seq` write phase.
pub(crate) struct PageSlot {
    seq: SeqCounter,
    len: AtomicU32,
    overflow: AtomicU32,
    inline: [RecordCell; INLINE_VERSIONS],
}

/// Outcome of [`PageSlot::compact`].
#[derive(Default)]
pub(crate) struct SlotCompaction {
    pub(crate) discarded: SmallVec<[VersionRecord; INLINE_VERSIONS]>,
    pub(crate) chunks_returned: usize,
    pub(crate) remaining: usize,
    pub(crate) first_tx: Option<TxId>,
}

impl PageSlot {
    pub(crate) fn new() -> Self {
        Self {
            seq: SeqCounter::new(),
            len: AtomicU32::new(0),
            overflow: AtomicU32::new(NO_LEASE),
            inline: empty_cells(),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.len.load(Ordering::Acquire) as usize
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Newest transaction id held by the slot. Writer side.
    pub(crate) fn max_tx(&self, pool: &OverflowPool) -> Option<TxId> {
        let len = self.len();
        if len == 0 {
            return None;
        }
        let chain = self.chunk_chain(pool);
        Some(TxId(self.cell_in(&chain, len - 1, pool).tx()))
    }

    /// Whether appending one record needs a fresh overflow chunk.
    pub(crate) fn append_needs_chunk(&self) -> bool {
        let len = self.len();
        len >= INLINE_VERSIONS && (len - INLINE_VERSIONS) % OVERFLOW_CHUNK_VERSIONS == 0
    }

    /// Appends `record`, taking a chunk from `reserved` when one is needed.
    ///
    /// The caller has already validated ordering and reserved chunks, so
    /// failures here mean the reservation was computed wrongly.
    pub(crate) fn append(
        &self,
        record: &VersionRecord,
        pool: &OverflowPool,
        reserved: &mut impl Iterator<Item = LeaseId>,
    ) -> Result<()> {
        let len = self.len();
        if let Some(max) = self.max_tx(pool) {
            if max >= record.transaction_id {
                return Err(SombraError::OutOfOrderTransaction {
                    tx_id: record.transaction_id,
                    last_published: max,
                    page: None,
                });
            }
        }
        if len < INLINE_VERSIONS {
            self.inline[len].store(record);
        } else {
            let idx = len - INLINE_VERSIONS;
            let chunk_no = idx / OVERFLOW_CHUNK_VERSIONS;
            let pos = idx % OVERFLOW_CHUNK_VERSIONS;
            let chain = self.chunk_chain(pool);
            if pos == 0 {
                let lease = reserved
                    .next()
                    .ok_or(SombraError::CommitAllocationFailure {
                        requested: 1,
                        available: pool.available(),
                    })?;
                let chunk = pool.get(lease);
                chunk.cells[0].store(record);
                chunk.set_next(None);
                match chunk_no.checked_sub(1) {
                    None => self.overflow.store(lease.raw(), Ordering::Release),
                    Some(prev) => pool.get(chain[prev]).set_next(Some(lease)),
                }
            } else {
                pool.get(chain[chunk_no]).cells[pos].store(record);
            }
        }
        self.len.store(len as u32 + 1, Ordering::Release);
        Ok(())
    }

    /// Newest record with `transaction_id <= snapshot`, freed markers included.
    pub(crate) fn newest_at(&self, snapshot: TxId, pool: &OverflowPool) -> Option<VersionRecord> {
        self.seq.read(|| {
            let mut candidate: Option<&RecordCell> = None;
            self.visit(self.len(), pool, |cell| {
                if cell.tx() > snapshot.0 {
                    return ControlFlow::Break(());
                }
                candidate = Some(cell);
                ControlFlow::Continue(())
            })?;
            Some(candidate.map(RecordCell::load))
        })
    }

    /// Consistent copy of every record in the slot.
    pub(crate) fn records(&self, pool: &OverflowPool) -> Vec<VersionRecord> {
        self.seq.read(|| {
            let len = self.len();
            let mut out = Vec::with_capacity(len);
            self.visit(len, pool, |cell| {
                out.push(cell.load());
                ControlFlow::Continue(())
            })?;
            Some(out)
        })
    }

    /// Whether any record falls inside `[from, to]`.
    pub(crate) fn touched_between(&self, from: TxId, to: TxId, pool: &OverflowPool) -> bool {
        self.seq.read(|| {
            let mut hit = false;
            self.visit(self.len(), pool, |cell| {
                let tx = cell.tx();
                if tx > to.0 {
                    return ControlFlow::Break(());
                }
                if tx >= from.0 {
                    hit = true;
                    return ControlFlow::Break(());
                }
                ControlFlow::Continue(())
            })?;
            Some(hit)
        })
    }

    /// Drops versions no snapshot at or after `threshold` can observe.
    ///
    /// Only the newest record `<= threshold` survives (flagged unused), and
    /// not even that one when it is a freed marker. Overflow chunks that end
    /// up empty go back to the pool.
    pub(crate) fn compact(&self, threshold: TxId, pool: &OverflowPool) -> SlotCompaction {
        let len = self.len();
        let chain = self.chunk_chain(pool);
        let mut records: SmallVec<[VersionRecord; 8]> = SmallVec::with_capacity(len);
        for idx in 0..len {
            records.push(self.cell_in(&chain, idx, pool).load());
        }
        let untouched = SlotCompaction {
            remaining: len,
            first_tx: records.first().map(|r| r.transaction_id),
            ..SlotCompaction::default()
        };
        let Some(keep) = records
            .iter()
            .rposition(|record| record.transaction_id <= threshold)
        else {
            return untouched;
        };
        let survivor = records[keep];
        let drop_count = if survivor.is_freed_marker { keep + 1 } else { keep };
        if drop_count == 0 {
            if !survivor.is_unused {
                self.cell_in(&chain, keep, pool).mark_unused();
            }
            return untouched;
        }

        let survivors = &records[drop_count..];
        let keep_chunks = chunks_for_len(survivors.len(), INLINE_VERSIONS);
        {
            let _write = self.seq.write();
            for (idx, record) in survivors.iter().enumerate() {
                let mut record = *record;
                if record.transaction_id <= threshold {
                    record.is_unused = true;
                }
                self.cell_in(&chain, idx, pool).store(&record);
            }
            for cell in self.inline.iter().skip(survivors.len()) {
                cell.clear();
            }
            self.len.store(survivors.len() as u32, Ordering::Release);
            match keep_chunks.checked_sub(1) {
                None => self.overflow.store(NO_LEASE, Ordering::Release),
                Some(last) => pool.get(chain[last]).set_next(None),
            }
        }
        let returned = &chain[keep_chunks..];
        pool.release_all(returned.iter().copied());

        SlotCompaction {
            discarded: records[..drop_count].iter().copied().collect(),
            chunks_returned: returned.len(),
            remaining: survivors.len(),
            first_tx: survivors.first().map(|r| r.transaction_id),
        }
    }

    #[cfg(test)]
    pub(crate) fn overflow_chunks(&self, pool: &OverflowPool) -> usize {
        self.chunk_chain(pool).len()
    }

    fn overflow_head(&self) -> Option<LeaseId> {
        LeaseId::from_raw(self.overflow.load(Ordering::Acquire))
    }

    fn chunk_chain(&self, pool: &OverflowPool) -> ChunkChain {
        let mut chain = ChunkChain::new();
        let mut next = self.overflow_head();
        while let Some(lease) = next {
            chain.push(lease);
            next = pool.get(lease).next();
        }
        chain
    }

    fn cell_in<'a>(&'a self, chain: &[LeaseId], idx: usize, pool: &'a OverflowPool) -> &'a RecordCell {
        if idx < INLINE_VERSIONS {
            return &self.inline[idx];
        }
        let idx = idx - INLINE_VERSIONS;
        &pool.get(chain[idx / OVERFLOW_CHUNK_VERSIONS]).cells[idx % OVERFLOW_CHUNK_VERSIONS]
    }

    /// Visits records `[0, len)` in order. Returns `None` when the overflow
    /// chain ends early, which only happens while a compaction is running.
    fn visit<'a>(
        &'a self,
        len: usize,
        pool: &'a OverflowPool,
        mut f: impl FnMut(&'a RecordCell) -> ControlFlow<()>,
    ) -> Option<()> {
        for cell in self.inline.iter().take(len) {
            if f(cell).is_break() {
                return Some(());
            }
        }
        let mut remaining = len.saturating_sub(INLINE_VERSIONS);
        let mut next = self.overflow_head();
        while remaining > 0 {
            let chunk = pool.get_raw(next?.raw())?;
            let take = remaining.min(OVERFLOW_CHUNK_VERSIONS);
            for cell in chunk.cells.iter().take(take) {
                if f(cell).is_break() {
                    return Some(());
                }
            }
            remaining -= take;
            next = chunk.next();
        }
        Some(())
    }
}
