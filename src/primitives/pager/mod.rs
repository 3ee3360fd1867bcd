#![forbid(unsafe_code)]

mod block;
mod metrics;
mod options;
mod overflow;
mod record;
mod slot;
mod stats;
mod table;

pub use metrics::{default_metrics, CounterMetrics, NoopMetrics, TranslationMetrics};
pub use options::{PttOptions, MAX_BLOCK_FAN_OUT};
pub use overflow::OVERFLOW_CHUNK_VERSIONS;
pub use record::{PageVersion, VersionRecord, INLINE_VERSIONS};
pub use stats::{PruneReport, PttStats};
pub use table::PageTranslationTable;
