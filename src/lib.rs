//! Multi-version page translation for a paged storage engine.
//!
//! The [`PageTranslationTable`] lets one writer publish new page versions
//! while any number of readers resolve pages against a fixed snapshot
//! without locking. Pruning against the durable flush watermark hands
//! obsolete scratch locations back to the caller.

#![warn(missing_docs)]

pub mod logging;
pub mod primitives;
pub mod types;

pub use primitives::pager::{
    CounterMetrics, NoopMetrics, PageTranslationTable, PageVersion, PruneReport, PttOptions,
    PttStats, TranslationMetrics, VersionRecord,
};
pub use types::{JournalId, PageId, Result, ScratchLocation, SombraError, TxId};
