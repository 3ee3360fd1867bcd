//! Sequence counter for optimistic, lock-free reads.
//!
//! The counter is even while the protected data is stable and odd while a
//! writer is rewriting it. Readers sample it before and after copying the
//! data out and retry when the samples differ or the first one was odd.
//! Protected data must itself be stored in atomics so a racing read is
//! merely stale, never undefined.

use std::hint;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;

const SPINS_BEFORE_YIELD: u32 = 64;

/// Sequence counter guarding a group of atomic fields.
#[derive(Debug, Default)]
pub struct SeqCounter {
    seq: AtomicU64,
}

/// Guard for an in-progress write; restores an even sequence on drop.
pub struct SeqWriteGuard<'a> {
    counter: &'a SeqCounter,
}

impl Drop for SeqWriteGuard<'_> {
    fn drop(&mut self) {
        self.counter.seq.fetch_add(1, Ordering::AcqRel);
    }
}

impl SeqCounter {
    /// Creates a counter in the stable state.
    pub const fn new() -> Self {
        Self {
            seq: AtomicU64::new(0),
        }
    }

    /// Enters the write phase. Callers must already be serialized against
    /// other writers of the same data.
    pub fn write(&self) -> SeqWriteGuard<'_> {
        let prev = self.seq.fetch_add(1, Ordering::AcqRel);
        debug_assert!(prev & 1 == 0, "nested seq write");
        SeqWriteGuard { counter: self }
    }

    /// Runs `read` until it produces a value without overlapping a write.
    ///
    /// `read` returns `None` when it observed a structurally impossible
    /// state (only possible mid-write); that attempt is retried as well.
    pub fn read<T>(&self, mut read: impl FnMut() -> Option<T>) -> T {
        let mut spins = 0u32;
        loop {
            let start = self.seq.load(Ordering::Acquire);
            if start & 1 == 0 {
                if let Some(value) = read() {
                    if self.seq.load(Ordering::Acquire) == start {
                        return value;
                    }
                }
            }
            spins += 1;
            if spins < SPINS_BEFORE_YIELD {
                hint::spin_loop();
            } else {
                thread::yield_now();
            }
        }
    }

    /// Current raw sequence value.
    pub fn sequence(&self) -> u64 {
        self.seq.load(Ordering::Relaxed)
    }
}
