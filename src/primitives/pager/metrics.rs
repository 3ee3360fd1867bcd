use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Sink for translation table activity.
///
/// Implementations are shared between the writer and every reader, so each
/// hook must be cheap and thread-safe. `resolved` runs on the lock-free read
/// path.
pub trait TranslationMetrics: Send + Sync {
    /// A transaction published `pages` page versions.
    fn published(&self, pages: usize);

    /// A resolve finished; `hit` is false when the caller must fall back to
    /// the data file.
    fn resolved(&self, hit: bool);

    /// A prune pass reclaimed `reclaimed` scratch locations.
    fn pruned(&self, reclaimed: usize);

    /// Overflow chunks were leased from the pool.
    fn overflow_leased(&self, chunks: usize);

    /// Overflow chunks went back to the pool.
    fn overflow_returned(&self, chunks: usize);

    /// A publish failed to reserve overflow storage.
    fn allocation_failed(&self);
}

/// Discards everything.
#[derive(Default)]
pub struct NoopMetrics;

impl TranslationMetrics for NoopMetrics {
    fn published(&self, _pages: usize) {}
    fn resolved(&self, _hit: bool) {}
    fn pruned(&self, _reclaimed: usize) {}
    fn overflow_leased(&self, _chunks: usize) {}
    fn overflow_returned(&self, _chunks: usize) {}
    fn allocation_failed(&self) {}
}

/// Atomic counters for every hook.
#[derive(Default, Debug)]
pub struct CounterMetrics {
    /// Successful publishes.
    pub publishes: AtomicU64,
    /// Page versions published.
    pub pages_published: AtomicU64,
    /// Resolves that found a scratch version.
    pub resolve_hits: AtomicU64,
    /// Resolves that fell back to the data file.
    pub resolve_misses: AtomicU64,
    /// Prune passes.
    pub prunes: AtomicU64,
    /// Scratch locations handed back by pruning.
    pub locations_reclaimed: AtomicU64,
    /// Overflow chunks leased.
    pub overflow_leased: AtomicU64,
    /// Overflow chunks returned.
    pub overflow_returned: AtomicU64,
    /// Publishes rejected for lack of overflow storage.
    pub allocation_failures: AtomicU64,
}

impl TranslationMetrics for CounterMetrics {
    fn published(&self, pages: usize) {
        self.publishes.fetch_add(1, Ordering::Relaxed);
        self.pages_published
            .fetch_add(pages as u64, Ordering::Relaxed);
    }

    fn resolved(&self, hit: bool) {
        if hit {
            self.resolve_hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.resolve_misses.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn pruned(&self, reclaimed: usize) {
        self.prunes.fetch_add(1, Ordering::Relaxed);
        self.locations_reclaimed
            .fetch_add(reclaimed as u64, Ordering::Relaxed);
    }

    fn overflow_leased(&self, chunks: usize) {
        self.overflow_leased
            .fetch_add(chunks as u64, Ordering::Relaxed);
    }

    fn overflow_returned(&self, chunks: usize) {
        self.overflow_returned
            .fetch_add(chunks as u64, Ordering::Relaxed);
    }

    fn allocation_failed(&self) {
        self.allocation_failures.fetch_add(1, Ordering::Relaxed);
    }
}

/// Default sink: [`NoopMetrics`].
pub fn default_metrics() -> Arc<dyn TranslationMetrics> {
    Arc::new(NoopMetrics)
}
