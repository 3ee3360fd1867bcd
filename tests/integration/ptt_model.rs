//! Model-based checks of the page translation table against a `BTreeMap`
//! oracle that keeps full page history.

#![allow(missing_docs)]

use std::collections::BTreeMap;

use proptest::prelude::*;
use sombra_ptt::{
    JournalId, PageId, PageTranslationTable, PageVersion, PttOptions, ScratchLocation, TxId,
};

const PAGES: u64 = 24;

#[derive(Debug, Clone)]
enum Op {
    Publish { gap: u64, writes: BTreeMap<u64, bool> },
    Prune { lag: u64 },
    Stale { back: u64 },
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        6 => (1u64..=3, prop::collection::btree_map(0..PAGES, prop::bool::weighted(0.15), 0..=6))
            .prop_map(|(gap, writes)| Op::Publish { gap, writes }),
        2 => (0u64..=4).prop_map(|lag| Op::Prune { lag }),
        1 => (0u64..=2).prop_map(|back| Op::Stale { back }),
    ]
}

#[derive(Clone, Copy, Debug)]
struct Entry {
    tx: u64,
    location: ScratchLocation,
    freed: bool,
}

#[derive(Default)]
struct Oracle {
    history: BTreeMap<u64, Vec<Entry>>,
    live: BTreeMap<u64, Vec<Entry>>,
    highest: u64,
    watermark: u64,
}

impl Oracle {
    fn publish(&mut self, tx: u64, writes: &BTreeMap<u64, bool>) {
        for (&page, &freed) in writes {
            let entry = Entry {
                tx,
                location: location(page, tx),
                freed,
            };
            self.history.entry(page).or_default().push(entry);
            self.live.entry(page).or_default().push(entry);
        }
        self.highest = tx;
    }

    fn prune(&mut self, watermark: u64) -> Vec<ScratchLocation> {
        let mut reclaimed = Vec::new();
        for entries in self.live.values_mut() {
            let Some(keep) = entries.iter().rposition(|e| e.tx <= watermark) else {
                continue;
            };
            let drop = if entries[keep].freed { keep + 1 } else { keep };
            reclaimed.extend(entries.drain(..drop).map(|e| e.location));
        }
        self.watermark = watermark;
        reclaimed.sort();
        reclaimed
    }

    fn resolve(&self, snapshot: u64, page: u64) -> Option<ScratchLocation> {
        self.history
            .get(&page)?
            .iter()
            .rev()
            .find(|e| e.tx <= snapshot)
            .filter(|e| !e.freed)
            .map(|e| e.location)
    }

    fn live_txs(&self, page: u64) -> Vec<u64> {
        self.live
            .get(&page)
            .map(|entries| entries.iter().map(|e| e.tx).collect())
            .unwrap_or_default()
    }

    fn live_count(&self) -> u64 {
        self.live.values().map(|entries| entries.len() as u64).sum()
    }
}

fn location(page: u64, tx: u64) -> ScratchLocation {
    ScratchLocation::new(page as u32, tx)
}

fn check_snapshot(
    ptt: &PageTranslationTable,
    oracle: &Oracle,
    snapshot: u64,
) -> Result<(), TestCaseError> {
    for page in 0..PAGES {
        prop_assert_eq!(
            ptt.resolve(TxId(snapshot), PageId(page)),
            oracle.resolve(snapshot, page),
            "page {} at snapshot {}",
            page,
            snapshot
        );
    }
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(96))]

    #[test]
    fn prop_table_matches_history_oracle(ops in prop::collection::vec(arb_op(), 1..64)) {
        let ptt = PageTranslationTable::new(PttOptions::new().block_fan_out(4)).unwrap();
        let mut oracle = Oracle::default();

        for op in ops {
            match op {
                Op::Publish { gap, writes } => {
                    let tx = oracle.highest + gap;
                    let pages: BTreeMap<PageId, PageVersion> = writes
                        .iter()
                        .map(|(&page, &freed)| {
                            let loc = location(page, tx);
                            let version = if freed {
                                PageVersion::freed(loc, JournalId(1))
                            } else {
                                PageVersion::live(loc, JournalId(1))
                            };
                            (PageId(page), version)
                        })
                        .collect();
                    ptt.publish(TxId(tx), &pages).unwrap();
                    oracle.publish(tx, &writes);
                }
                Op::Prune { lag } => {
                    let watermark = oracle.highest.saturating_sub(lag).max(oracle.watermark);
                    let mut reclaimed = ptt.prune(TxId(watermark));
                    reclaimed.sort();
                    prop_assert_eq!(reclaimed, oracle.prune(watermark));
                }
                Op::Stale { back } => {
                    let tx = oracle.highest.saturating_sub(back);
                    let err = ptt.publish(TxId(tx), &BTreeMap::new()).unwrap_err();
                    prop_assert!(err.is_fatal());
                }
            }
            prop_assert_eq!(ptt.highest_published_tx_id(), TxId(oracle.highest));
            prop_assert_eq!(ptt.version_count(), oracle.live_count());
            check_snapshot(&ptt, &oracle, oracle.watermark)?;
            check_snapshot(&ptt, &oracle, oracle.highest)?;
        }

        for snapshot in oracle.watermark..=oracle.highest {
            check_snapshot(&ptt, &oracle, snapshot)?;
        }
        for page in 0..PAGES {
            let txs: Vec<u64> = ptt
                .versions(PageId(page))
                .iter()
                .map(|v| v.transaction_id.0)
                .collect();
            prop_assert_eq!(txs, oracle.live_txs(page));
        }
    }

    #[test]
    fn prop_modified_pages_match_history(
        batches in prop::collection::vec(prop::collection::btree_set(0..PAGES, 1..=5), 1..24),
        from in 1u64..24,
        span in 0u64..8,
    ) {
        let ptt = PageTranslationTable::new(PttOptions::new().block_fan_out(8)).unwrap();
        let mut expected = std::collections::BTreeSet::new();
        let to = from + span;
        for (idx, pages) in batches.iter().enumerate() {
            let tx = idx as u64 + 1;
            let writes: BTreeMap<PageId, PageVersion> = pages
                .iter()
                .map(|&p| (PageId(p), PageVersion::live(location(p, tx), JournalId(1))))
                .collect();
            ptt.publish(TxId(tx), &writes).unwrap();
            if (from..=to).contains(&tx) {
                expected.extend(pages.iter().copied().map(PageId));
            }
        }
        let got = ptt.pages_modified_between(TxId(from), TxId(to)).unwrap();
        prop_assert_eq!(got, expected.into_iter().collect::<Vec<_>>());
    }
}
