//! Snapshot semantics of the page translation table.
//!
//! Covers publish ordering, snapshot isolation, freed pages, prune
//! correctness and the diagnostic queries.

#![allow(missing_docs)]

use std::collections::BTreeMap;
use std::sync::Once;

use sombra_ptt::{
    JournalId, PageId, PageTranslationTable, PageVersion, PttOptions, Result, ScratchLocation,
    SombraError, TxId,
};
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("sombra_ptt=debug"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_ansi(false)
            .try_init();
    });
}

fn at(offset: u64) -> ScratchLocation {
    ScratchLocation::new(1, offset)
}

fn live(offset: u64) -> PageVersion {
    PageVersion::live(at(offset), JournalId(7))
}

fn freed(offset: u64) -> PageVersion {
    PageVersion::freed(at(offset), JournalId(7))
}

fn one(page: u64, version: PageVersion) -> BTreeMap<PageId, PageVersion> {
    BTreeMap::from([(PageId(page), version)])
}

fn table() -> Result<PageTranslationTable> {
    init_tracing();
    PageTranslationTable::new(PttOptions::default())
}

#[test]
fn newer_snapshots_see_newer_versions() -> Result<()> {
    let ptt = table()?;
    let p = 42;
    ptt.publish(TxId(5), &one(p, live(100)))?;
    ptt.publish(TxId(9), &one(p, live(200)))?;

    assert_eq!(ptt.resolve(TxId(4), PageId(p)), None);
    assert_eq!(ptt.resolve(TxId(5), PageId(p)), Some(at(100)));
    assert_eq!(ptt.resolve(TxId(7), PageId(p)), Some(at(100)));
    assert_eq!(ptt.resolve(TxId(9), PageId(p)), Some(at(200)));
    assert_eq!(ptt.resolve(TxId(1_000), PageId(p)), Some(at(200)));
    assert_eq!(ptt.resolve(TxId(9), PageId(p + 1)), None);
    Ok(())
}

#[test]
fn freed_page_is_absent_from_then_on() -> Result<()> {
    let ptt = table()?;
    let p = 3;
    ptt.publish(TxId(5), &one(p, live(100)))?;
    ptt.publish(TxId(8), &one(p, freed(0)))?;

    assert_eq!(ptt.resolve(TxId(6), PageId(p)), Some(at(100)));
    assert_eq!(ptt.resolve(TxId(8), PageId(p)), None);
    assert_eq!(ptt.resolve(TxId(100), PageId(p)), None);
    let marker = ptt.resolve_record(TxId(8), PageId(p)).expect("freed marker");
    assert!(marker.is_freed_marker);
    assert_eq!(marker.journal_id, JournalId(7));
    Ok(())
}

#[test]
fn stale_transaction_ids_are_rejected_without_side_effects() -> Result<()> {
    let ptt = table()?;
    ptt.publish(TxId(1), &one(1, live(10)))?;
    ptt.publish(TxId(4), &one(2, live(40)))?;
    let before = ptt.stats();

    for stale in [0, 1, 3, 4] {
        let err = ptt
            .publish(TxId(stale), &one(5, live(999)))
            .expect_err("stale tx must fail");
        assert!(err.is_fatal(), "{err}");
        assert!(matches!(
            err,
            SombraError::OutOfOrderTransaction {
                last_published: TxId(4),
                ..
            }
        ));
    }

    assert_eq!(ptt.stats(), before);
    assert_eq!(ptt.resolve(TxId(10), PageId(5)), None);
    assert_eq!(ptt.highest_published_tx_id(), TxId(4));
    ptt.publish(TxId(5), &one(5, live(50)))?;
    assert_eq!(ptt.resolve(TxId(5), PageId(5)), Some(at(50)));
    Ok(())
}

#[test]
fn prune_keeps_versions_visible_at_and_after_watermark() -> Result<()> {
    let ptt = table()?;
    let p = 11;
    for tx in 1..=4 {
        ptt.publish(TxId(tx), &one(p, live(tx * 10)))?;
    }
    let mut reclaimed = ptt.prune(TxId(3));
    reclaimed.sort();
    assert_eq!(reclaimed, vec![at(10), at(20)]);

    assert_eq!(ptt.resolve(TxId(3), PageId(p)), Some(at(30)));
    assert_eq!(ptt.resolve(TxId(4), PageId(p)), Some(at(40)));
    assert_eq!(ptt.version_count(), 2);

    let versions = ptt.versions(PageId(p));
    let txs: Vec<_> = versions.iter().map(|v| v.transaction_id).collect();
    assert_eq!(txs, vec![TxId(3), TxId(4)]);
    assert!(versions[0].is_unused);
    assert!(!versions[1].is_unused);

    assert!(ptt.prune(TxId(3)).is_empty(), "second prune at the same watermark");
    Ok(())
}

#[test]
fn durable_free_clears_page_and_table() -> Result<()> {
    let ptt = table()?;
    ptt.publish(TxId(1), &one(9, live(1)))?;
    ptt.publish(TxId(2), &one(9, freed(2)))?;
    let report = ptt.prune_report(TxId(2));
    assert_eq!(report.reclaimed.len(), 2);
    assert!(ptt.is_empty());
    assert!(ptt.versions(PageId(9)).is_empty());
    assert_eq!(ptt.resolve(TxId(2), PageId(9)), None);

    let stats = ptt.stats();
    assert_eq!(stats.blocks, 1, "blocks stay allocated once created");
    assert_eq!(stats.live_pages, 0);

    ptt.publish(TxId(3), &one(9, live(3)))?;
    assert_eq!(ptt.resolve(TxId(3), PageId(9)), Some(at(3)));
    Ok(())
}

#[test]
fn resolve_is_repeatable() -> Result<()> {
    let ptt = table()?;
    let pages: BTreeMap<_, _> = (0..64).map(|p| (PageId(p), live(p))).collect();
    ptt.publish(TxId(1), &pages)?;
    ptt.publish(TxId(2), &one(10, live(1_010)))?;
    let first: Vec<_> = (0..64).map(|p| ptt.resolve(TxId(1), PageId(p))).collect();
    for _ in 0..3 {
        let again: Vec<_> = (0..64).map(|p| ptt.resolve(TxId(1), PageId(p))).collect();
        assert_eq!(first, again);
    }
    ptt.publish(TxId(3), &one(10, live(2_010)))?;
    let after: Vec<_> = (0..64).map(|p| ptt.resolve(TxId(1), PageId(p))).collect();
    assert_eq!(first, after, "later publishes are invisible to older snapshots");
    Ok(())
}

#[test]
fn modified_pages_query_spans_blocks() -> Result<()> {
    let ptt = PageTranslationTable::new(PttOptions::new().block_fan_out(8))?;
    ptt.publish(TxId(1), &BTreeMap::from([(PageId(3), live(1)), (PageId(70), live(2))]))?;
    ptt.publish(TxId(2), &one(17, live(3)))?;
    ptt.publish(TxId(3), &one(3, live(4)))?;

    assert_eq!(
        ptt.pages_modified_between(TxId(1), TxId(1))?,
        vec![PageId(3), PageId(70)]
    );
    assert_eq!(
        ptt.pages_modified_between(TxId(2), TxId(3))?,
        vec![PageId(3), PageId(17)]
    );
    assert!(ptt.pages_modified_between(TxId(4), TxId(10))?.is_empty());
    assert_eq!(
        ptt.pages_modified_between(TxId(3), TxId(1)),
        Err(SombraError::Invalid("range start exceeds range end"))
    );
    Ok(())
}
