use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::{Mutex, MutexGuard};

mod pool;
mod seq;

pub use pool::{LeaseId, ObjectPool, PoolItem, NO_LEASE};
pub use seq::{SeqCounter, SeqWriteGuard};

/// In-process single-writer latch.
///
/// Serializes mutating operations (publish/prune) on one structure. Readers
/// never touch it.
#[derive(Default)]
pub struct SingleWriter {
    lock: Mutex<()>,
    held: AtomicBool,
    acquisitions: AtomicU64,
    contended: AtomicU64,
}

/// Snapshot of latch state for observability.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockSnapshot {
    /// Whether the writer latch is currently held.
    pub writer: bool,
    /// Total number of successful acquisitions.
    pub acquisitions: u64,
    /// Acquisitions that had to wait for another writer.
    pub contended: u64,
}

/// Guard representing a held writer latch.
pub struct WriterGuard<'a> {
    owner: &'a SingleWriter,
    _guard: MutexGuard<'a, ()>,
}

impl Drop for WriterGuard<'_> {
    fn drop(&mut self) {
        self.owner.held.store(false, Ordering::Release);
    }
}

impl SingleWriter {
    /// Creates an unlocked latch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquires the writer latch, blocking while another writer holds it.
    pub fn acquire_writer(&self) -> WriterGuard<'_> {
        let guard = match self.lock.try_lock() {
            Some(guard) => guard,
            None => {
                self.contended.fetch_add(1, Ordering::Relaxed);
                self.lock.lock()
            }
        };
        self.on_acquired(guard)
    }

    /// Attempts to acquire the writer latch without blocking.
    pub fn try_acquire_writer(&self) -> Option<WriterGuard<'_>> {
        self.lock.try_lock().map(|guard| self.on_acquired(guard))
    }

    /// Returns a snapshot of the current latch state.
    pub fn snapshot(&self) -> LockSnapshot {
        LockSnapshot {
            writer: self.held.load(Ordering::Acquire),
            acquisitions: self.acquisitions.load(Ordering::Relaxed),
            contended: self.contended.load(Ordering::Relaxed),
        }
    }

    fn on_acquired<'a>(&'a self, guard: MutexGuard<'a, ()>) -> WriterGuard<'a> {
        self.held.store(true, Ordering::Release);
        self.acquisitions.fetch_add(1, Ordering::Relaxed);
        WriterGuard {
            owner: self,
            _guard: guard,
        }
    }
}
