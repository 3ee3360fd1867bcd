use serde::Serialize;

use crate::types::ScratchLocation;

/// Point-in-time counters for a [`super::PageTranslationTable`].
///
/// Gathered without the writer latch, so fields may disagree slightly with
/// each other while a publish or prune is running.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct PttStats {
    /// Blocks ever created.
    pub blocks: usize,
    /// Pages holding at least one version.
    pub live_pages: u64,
    /// Versions currently stored.
    pub live_versions: u64,
    /// Overflow chunks leased by page slots.
    pub overflow_in_use: usize,
    /// Overflow chunks free in the pool.
    pub overflow_available: usize,
    /// Highest transaction id published.
    pub highest_published_tx_id: u64,
    /// Watermark of the most recent prune, 0 before the first one.
    pub last_prune_watermark: u64,
    /// Successful publishes.
    pub publishes: u64,
    /// Prune passes.
    pub prunes: u64,
    /// Scratch locations reclaimed over the table's lifetime.
    pub reclaimed_total: u64,
}

/// Result of [`super::PageTranslationTable::prune_report`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PruneReport {
    /// Scratch locations that are free for reuse.
    pub reclaimed: Vec<ScratchLocation>,
    /// Blocks whose slots were compacted.
    pub blocks_scanned: usize,
    /// Blocks skipped through their tx bounds.
    pub blocks_skipped: usize,
    /// Overflow chunks handed back to the pool.
    pub overflow_returned: usize,
}
