//! Concurrency stress for the page translation table.
//!
//! One writer publishes seeded random transactions and prunes behind a
//! lagging flush watermark while reader threads resolve pages at the latest
//! published snapshot. Every location encodes the page and transaction that
//! wrote it, so readers can detect torn records or versions newer than their
//! snapshot. Prints table stats as JSON and exits non-zero on any violation.

use std::collections::BTreeMap;
use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Barrier};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use clap::Parser;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use sombra_ptt::logging::init_logging;
use sombra_ptt::{
    CounterMetrics, JournalId, PageId, PageTranslationTable, PageVersion, PttOptions, PttStats,
    ScratchLocation, SombraError, TxId,
};
use tracing::{info, warn};

fn main() {
    if let Err(err) = run() {
        eprintln!("ptt-stress failed: {err}");
        std::process::exit(1);
    }
}

#[derive(Parser, Debug)]
#[command(name = "ptt-stress", about = "Stress the page translation table")]
struct Args {
    /// TOML file with a `[table]` section of table options.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Concurrent reader threads.
    #[arg(long, default_value_t = 4)]
    readers: usize,

    /// Transactions the writer publishes.
    #[arg(long, default_value_t = 20_000)]
    transactions: u64,

    /// Distinct pages the workload touches.
    #[arg(long, default_value_t = 1_024)]
    pages: u64,

    /// Maximum pages written per transaction.
    #[arg(long, default_value_t = 8)]
    pages_per_tx: usize,

    /// Prune every N transactions; 0 disables pruning.
    #[arg(long, default_value_t = 64)]
    prune_every: u64,

    /// How far the flush watermark trails the newest transaction.
    #[arg(long, default_value_t = 32)]
    flush_lag: u64,

    /// RNG seed for a repeatable workload.
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Log filter directives.
    #[arg(long, env = "SOMBRA_LOG", default_value = "sombra_ptt=info,ptt_stress=info")]
    log: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct StressConfig {
    table: PttOptions,
}

impl StressConfig {
    fn load(path: Option<&Path>) -> Result<Self, Box<dyn Error>> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let raw = fs::read_to_string(path)
            .map_err(|err| format!("reading {}: {err}", path.display()))?;
        Ok(toml::from_str(&raw)?)
    }
}

#[derive(Debug, Serialize)]
struct StressReport {
    seed: u64,
    elapsed_ms: u128,
    reads: u64,
    hits: u64,
    violations: u64,
    allocation_failures: u64,
    table: PttStats,
}

fn location_for(tx: u64, page: u64) -> ScratchLocation {
    ScratchLocation::new(page as u32, tx)
}

/// Reader threads sharing one stop flag.
struct Readers {
    done: Arc<AtomicBool>,
    handles: Vec<JoinHandle<()>>,
}

impl Readers {
    /// Signals every reader to stop and waits for all of them.
    fn stop(self) -> Result<(), Box<dyn Error>> {
        self.done.store(true, Ordering::Release);
        let mut panicked = false;
        for handle in self.handles {
            panicked |= handle.join().is_err();
        }
        if panicked {
            return Err("reader thread panicked".into());
        }
        Ok(())
    }
}

/// Publishes the seeded workload, stopping at the first fatal error.
fn drive_writer(table: &PageTranslationTable, args: &Args) -> Result<(), SombraError> {
    let mut rng = ChaCha8Rng::seed_from_u64(args.seed);
    for tx in 1..=args.transactions {
        let count = rng.gen_range(1..=args.pages_per_tx);
        let mut writes = BTreeMap::new();
        for _ in 0..count {
            let page = rng.gen_range(0..args.pages);
            let location = location_for(tx, page);
            let journal = JournalId((tx % 64) as u32);
            let version = if rng.gen_ratio(1, 16) {
                PageVersion::freed(location, journal)
            } else {
                PageVersion::live(location, journal)
            };
            writes.insert(PageId(page), version);
        }
        if let Err(err) = table.publish(TxId(tx), &writes) {
            if err.is_fatal() {
                return Err(err);
            }
            warn!(tx, error = %err, "ptt_stress.publish_failed");
        }
        if args.prune_every > 0 && tx % args.prune_every == 0 && tx > args.flush_lag {
            table.prune(TxId(tx - args.flush_lag));
        }
    }
    Ok(())
}

fn run() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    init_logging(&args.log)?;
    if args.pages == 0 || args.pages_per_tx == 0 {
        return Err("pages and pages-per-tx must be positive".into());
    }
    let config = StressConfig::load(args.config.as_deref())?;
    let metrics = Arc::new(CounterMetrics::default());
    let table = Arc::new(PageTranslationTable::with_metrics(
        config.table.clone(),
        metrics.clone(),
    )?);
    info!(
        readers = args.readers,
        transactions = args.transactions,
        pages = args.pages,
        options = ?config.table,
        "ptt_stress.start"
    );

    let done = Arc::new(AtomicBool::new(false));
    let reads = Arc::new(AtomicU64::new(0));
    let hits = Arc::new(AtomicU64::new(0));
    let violations = Arc::new(AtomicU64::new(0));
    let barrier = Arc::new(Barrier::new(args.readers + 1));
    let started = Instant::now();

    let handles: Vec<_> = (0..args.readers)
        .map(|reader| {
            let table = Arc::clone(&table);
            let done = Arc::clone(&done);
            let reads = Arc::clone(&reads);
            let hits = Arc::clone(&hits);
            let violations = Arc::clone(&violations);
            let barrier = Arc::clone(&barrier);
            let pages = args.pages;
            let seed = args.seed ^ (reader as u64 + 1);
            thread::spawn(move || {
                let mut rng = ChaCha8Rng::seed_from_u64(seed);
                barrier.wait();
                while !done.load(Ordering::Acquire) {
                    let snapshot = table.highest_published_tx_id();
                    let page = PageId(rng.gen_range(0..pages));
                    reads.fetch_add(1, Ordering::Relaxed);
                    let Some(record) = table.resolve_record(snapshot, page) else {
                        continue;
                    };
                    if !record.is_freed_marker {
                        hits.fetch_add(1, Ordering::Relaxed);
                    }
                    let tx = record.transaction_id;
                    if tx > snapshot || record.location != location_for(tx.0, page.0) {
                        violations.fetch_add(1, Ordering::Relaxed);
                        warn!(
                            page = page.0,
                            snapshot = snapshot.0,
                            tx = tx.0,
                            location = %record.location,
                            "ptt_stress.read_violation"
                        );
                    }
                }
            })
        })
        .collect();

    let readers = Readers { done, handles };

    barrier.wait();
    let written = drive_writer(&table, &args);
    readers.stop()?;
    written?;

    let report = StressReport {
        seed: args.seed,
        elapsed_ms: started.elapsed().as_millis(),
        reads: reads.load(Ordering::Relaxed),
        hits: hits.load(Ordering::Relaxed),
        violations: violations.load(Ordering::Relaxed),
        allocation_failures: metrics.allocation_failures.load(Ordering::Relaxed),
        table: table.stats(),
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    if report.violations > 0 {
        return Err(format!("{} read violations", report.violations).into());
    }
    Ok(())
}
