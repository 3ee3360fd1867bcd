//! Page translation table.
//!
//! Maps `(page, snapshot)` to the scratch location holding the newest page
//! version visible to that snapshot. One writer at a time publishes and
//! prunes under [`SingleWriter`]; readers resolve without taking it.
//!
//! A publish appends every page's record before advancing the published tx
//! id. Every read clamps its snapshot to that id, so records of a
//! transaction that is still being published stay invisible until the whole
//! transaction is.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, error, warn};

use super::block::Block;
use super::metrics::{default_metrics, TranslationMetrics};
use super::options::PttOptions;
use super::overflow::OverflowPool;
use super::record::{PageVersion, VersionRecord};
use super::stats::{PruneReport, PttStats};
use crate::primitives::concurrency::{LockSnapshot, SingleWriter};
use crate::types::{PageId, Result, ScratchLocation, SombraError, TxId};

/// Multi-version map from page numbers to scratch locations.
pub struct PageTranslationTable {
    options: PttOptions,
    fan_out: u64,
    blocks: DashMap<u64, Arc<Block>>,
    pool: OverflowPool,
    writer: SingleWriter,
    last_published: AtomicU64,
    last_prune: AtomicU64,
    live_versions: AtomicU64,
    publishes: AtomicU64,
    prunes: AtomicU64,
    reclaimed_total: AtomicU64,
    metrics: Arc<dyn TranslationMetrics>,
}

impl PageTranslationTable {
    /// Creates an empty table.
    pub fn new(options: PttOptions) -> Result<Self> {
        Self::with_metrics(options, default_metrics())
    }

    /// Creates an empty table reporting to `metrics`.
    pub fn with_metrics(
        options: PttOptions,
        metrics: Arc<dyn TranslationMetrics>,
    ) -> Result<Self> {
        options.validate()?;
        Ok(Self {
            fan_out: options.block_fan_out as u64,
            blocks: DashMap::new(),
            pool: OverflowPool::with_capacity(options.overflow_pool_capacity),
            writer: SingleWriter::new(),
            last_published: AtomicU64::new(0),
            last_prune: AtomicU64::new(0),
            live_versions: AtomicU64::new(0),
            publishes: AtomicU64::new(0),
            prunes: AtomicU64::new(0),
            reclaimed_total: AtomicU64::new(0),
            metrics,
            options,
        })
    }

    /// Options the table was built with.
    pub fn options(&self) -> &PttOptions {
        &self.options
    }

    /// Registers every page a committing transaction modified as a new
    /// version at `tx_id`.
    ///
    /// Fails with [`SombraError::OutOfOrderTransaction`] (fatal) when `tx_id`
    /// does not exceed every id already published, and with
    /// [`SombraError::CommitAllocationFailure`] when overflow storage runs
    /// out. In both cases the table is left untouched.
    pub fn publish(&self, tx_id: TxId, pages: &BTreeMap<PageId, PageVersion>) -> Result<()> {
        let _writer = self.writer.acquire_writer();
        let last = TxId(self.last_published.load(Ordering::Acquire));
        debug!(tx_id = tx_id.0, pages = pages.len(), "ptt.publish.start");
        if tx_id <= last {
            return Err(self.ordering_violation(tx_id, last, None));
        }

        let mut chunks_needed = 0usize;
        for page in pages.keys() {
            let Some(block) = self.block(*page) else {
                continue;
            };
            let slot = block.slot_for(*page);
            if let Some(max) = slot.max_tx(&self.pool) {
                if max >= tx_id {
                    return Err(self.ordering_violation(tx_id, max, Some(*page)));
                }
            }
            if slot.append_needs_chunk() {
                chunks_needed += 1;
            }
        }

        let Some(leased) = self.pool.lease_many(chunks_needed) else {
            let available = self.pool.available();
            warn!(
                tx_id = tx_id.0,
                requested = chunks_needed,
                available,
                "ptt.publish.overflow_exhausted"
            );
            self.metrics.allocation_failed();
            return Err(SombraError::CommitAllocationFailure {
                requested: chunks_needed,
                available,
            });
        };
        if chunks_needed > 0 {
            self.metrics.overflow_leased(chunks_needed);
        }

        let mut reserved = leased.into_iter();
        for (page, version) in pages {
            let block = self.block_for_write(*page);
            let record = VersionRecord::new(tx_id, *version);
            if let Err(err) = block.publish(*page, &record, &self.pool, &mut reserved) {
                // Ordering and overflow chunks were checked above, so an
                // append failing here means earlier pages are already applied.
                unreachable!("ptt.publish.partial: tx {tx_id} page {page}: {err}");
            }
            self.warn_if_hot(*page, &block);
        }
        debug_assert!(reserved.next().is_none(), "overflow reservation over-counted");
        self.pool.release_all(reserved);

        self.live_versions
            .fetch_add(pages.len() as u64, Ordering::Relaxed);
        self.publishes.fetch_add(1, Ordering::Relaxed);
        self.last_published.store(tx_id.0, Ordering::Release);
        self.metrics.published(pages.len());
        debug!(
            tx_id = tx_id.0,
            pages = pages.len(),
            overflow_leased = chunks_needed,
            "ptt.publish.complete"
        );
        Ok(())
    }

    /// Scratch location of `page` as seen by `snapshot`.
    ///
    /// `None` means the reader must use the durable data file: either no
    /// scratch version exists at or below the snapshot, or the page was
    /// freed as of it.
    ///
    /// Snapshots above [`Self::highest_published_tx_id`] are clamped to it.
    /// Never waits on the writer latch. It can still wait briefly in two
    /// places: on a block map shard while the writer creates a block in the
    /// same shard, and in a retry loop while the writer compacts this page's
    /// slot during a prune.
    pub fn resolve(&self, snapshot: TxId, page: PageId) -> Option<ScratchLocation> {
        let location = self
            .resolve_record(snapshot, page)
            .filter(|record| !record.is_freed_marker)
            .map(|record| record.location);
        self.metrics.resolved(location.is_some());
        location
    }

    /// Newest record of `page` at or below `snapshot`, freed markers included.
    pub fn resolve_record(&self, snapshot: TxId, page: PageId) -> Option<VersionRecord> {
        let snapshot = self.visible(snapshot);
        self.block(page)?
            .slot_for(page)
            .newest_at(snapshot, &self.pool)
    }

    /// Every published version of `page` currently held, oldest first.
    pub fn versions(&self, page: PageId) -> Vec<VersionRecord> {
        let published = self.highest_published_tx_id();
        let Some(block) = self.block(page) else {
            return Vec::new();
        };
        let mut records = block.slot_for(page).records(&self.pool);
        records.retain(|record| record.transaction_id <= published);
        records
    }

    /// Pages with a version published in `[from, to]`, ascending.
    pub fn pages_modified_between(&self, from: TxId, to: TxId) -> Result<Vec<PageId>> {
        if from > to {
            return Err(SombraError::Invalid("range start exceeds range end"));
        }
        let to = self.visible(to);
        if from > to {
            return Ok(Vec::new());
        }
        let mut blocks = self.block_list();
        blocks.sort_unstable_by_key(|(id, _)| *id);
        let mut pages = Vec::new();
        for (_, block) in blocks {
            block.pages_modified_between(from, to, &self.pool, &mut pages);
        }
        Ok(pages)
    }

    /// Drops versions that no snapshot at or after `watermark` can observe
    /// and returns their scratch locations.
    ///
    /// `watermark` must already be durable in the data file.
    pub fn prune(&self, watermark: TxId) -> Vec<ScratchLocation> {
        self.prune_report(watermark).reclaimed
    }

    /// Same as [`Self::prune`] with per-pass details.
    pub fn prune_report(&self, watermark: TxId) -> PruneReport {
        let _writer = self.writer.acquire_writer();
        debug!(watermark = watermark.0, "ptt.prune.start");
        let mut report = PruneReport::default();
        for (_, block) in self.block_list() {
            let outcome = block.prune(watermark, &self.pool, &mut report.reclaimed);
            if outcome.scanned {
                report.blocks_scanned += 1;
            } else {
                report.blocks_skipped += 1;
            }
            report.overflow_returned += outcome.chunks_returned;
        }

        let reclaimed = report.reclaimed.len();
        self.live_versions
            .fetch_sub(reclaimed as u64, Ordering::Relaxed);
        self.reclaimed_total
            .fetch_add(reclaimed as u64, Ordering::Relaxed);
        self.prunes.fetch_add(1, Ordering::Relaxed);
        self.last_prune.store(watermark.0, Ordering::Release);
        self.metrics.pruned(reclaimed);
        if report.overflow_returned > 0 {
            self.metrics.overflow_returned(report.overflow_returned);
        }
        debug!(
            watermark = watermark.0,
            reclaimed,
            blocks_scanned = report.blocks_scanned,
            blocks_skipped = report.blocks_skipped,
            overflow_returned = report.overflow_returned,
            "ptt.prune.complete"
        );
        report
    }

    /// Highest transaction id published so far; 0 for a fresh table.
    pub fn highest_published_tx_id(&self) -> TxId {
        TxId(self.last_published.load(Ordering::Acquire))
    }

    /// Whether the table holds no versions at all.
    pub fn is_empty(&self) -> bool {
        self.version_count() == 0
    }

    /// Versions currently stored across all pages.
    pub fn version_count(&self) -> u64 {
        self.live_versions.load(Ordering::Relaxed)
    }

    /// Overflow chunks free in the pool.
    pub fn overflow_available(&self) -> usize {
        self.pool.available()
    }

    /// Watermark passed to the most recent prune.
    pub fn last_prune_watermark(&self) -> TxId {
        TxId(self.last_prune.load(Ordering::Acquire))
    }

    /// State of the writer latch.
    pub fn writer_snapshot(&self) -> LockSnapshot {
        self.writer.snapshot()
    }

    /// Gathers table-wide counters.
    pub fn stats(&self) -> PttStats {
        let blocks = self.block_list();
        PttStats {
            blocks: blocks.len(),
            live_pages: blocks
                .iter()
                .map(|(_, block)| u64::from(block.live_pages()))
                .sum(),
            live_versions: blocks.iter().map(|(_, block)| block.version_count()).sum(),
            overflow_in_use: self.pool.in_use(),
            overflow_available: self.pool.available(),
            highest_published_tx_id: self.highest_published_tx_id().0,
            last_prune_watermark: self.last_prune_watermark().0,
            publishes: self.publishes.load(Ordering::Relaxed),
            prunes: self.prunes.load(Ordering::Relaxed),
            reclaimed_total: self.reclaimed_total.load(Ordering::Relaxed),
        }
    }

    fn visible(&self, snapshot: TxId) -> TxId {
        snapshot.min(self.highest_published_tx_id())
    }

    fn block_id(&self, page: PageId) -> u64 {
        page.0 / self.fan_out
    }

    // Clones the Arc so the map shard is released before any slot traversal.
    fn block(&self, page: PageId) -> Option<Arc<Block>> {
        self.blocks
            .get(&self.block_id(page))
            .map(|entry| Arc::clone(entry.value()))
    }

    fn block_for_write(&self, page: PageId) -> Arc<Block> {
        if let Some(block) = self.block(page) {
            return block;
        }
        let id = self.block_id(page);
        let fan_out = self.options.block_fan_out;
        let entry = self
            .blocks
            .entry(id)
            .or_insert_with(|| Arc::new(Block::new(id * self.fan_out, fan_out)));
        Arc::clone(entry.value())
    }

    fn block_list(&self) -> Vec<(u64, Arc<Block>)> {
        self.blocks
            .iter()
            .map(|entry| (*entry.key(), Arc::clone(entry.value())))
            .collect()
    }

    fn ordering_violation(
        &self,
        tx_id: TxId,
        last_published: TxId,
        page: Option<PageId>,
    ) -> SombraError {
        error!(
            tx_id = tx_id.0,
            last_published = last_published.0,
            page = ?page,
            "ptt.publish.out_of_order"
        );
        SombraError::OutOfOrderTransaction {
            tx_id,
            last_published,
            page,
        }
    }

    fn warn_if_hot(&self, page: PageId, block: &Block) {
        let threshold = self.options.warn_versions_per_page;
        if threshold == 0 {
            return;
        }
        let versions = block.slot_for(page).len();
        if versions >= threshold && versions % threshold == 0 {
            warn!(
                page = page.0,
                versions,
                last_prune = self.last_prune.load(Ordering::Relaxed),
                "ptt.publish.hot_page"
            );
        }
    }
}
