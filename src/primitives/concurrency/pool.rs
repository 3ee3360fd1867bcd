//! Bounded object pool with index-based leases.
//!
//! Every item is allocated up front and lives as long as the pool, so a
//! reader that follows a stale lease index always lands on a valid item.
//! Only `lease`/`release` synchronize; `get` is a plain slice index.

use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;

/// Raw index meaning "no lease".
pub const NO_LEASE: u32 = u32::MAX;

/// Items stored in an [`ObjectPool`].
pub trait PoolItem: Send + Sync {
    /// Builds an item in its recycled state.
    fn empty() -> Self;
    /// Resets the item before it goes back on the free list.
    fn recycle(&self);
}

/// Handle to a leased pool item.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct LeaseId(u32);

impl LeaseId {
    /// Rebuilds a lease from its raw index, rejecting [`NO_LEASE`].
    pub fn from_raw(raw: u32) -> Option<Self> {
        (raw != NO_LEASE).then_some(Self(raw))
    }

    /// Raw index of the lease.
    pub fn raw(self) -> u32 {
        self.0
    }
}

/// Fixed-capacity pool of reusable items.
pub struct ObjectPool<T> {
    items: Box<[T]>,
    free: Mutex<Vec<u32>>,
    available: AtomicUsize,
}

impl<T: PoolItem> ObjectPool<T> {
    /// Allocates `capacity` items, all initially free.
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.min(NO_LEASE as usize);
        let items: Box<[T]> = (0..capacity).map(|_| T::empty()).collect();
        // Lowest indices are handed out first.
        let free: Vec<u32> = (0..capacity as u32).rev().collect();
        Self {
            items,
            free: Mutex::new(free),
            available: AtomicUsize::new(capacity),
        }
    }

    /// Total number of items.
    pub fn capacity(&self) -> usize {
        self.items.len()
    }

    /// Number of items not currently leased.
    pub fn available(&self) -> usize {
        self.available.load(Ordering::Acquire)
    }

    /// Number of items currently leased.
    pub fn in_use(&self) -> usize {
        self.capacity() - self.available()
    }

    /// Leases a single item.
    pub fn lease(&self) -> Option<LeaseId> {
        let mut free = self.free.lock();
        let raw = free.pop()?;
        self.available.store(free.len(), Ordering::Release);
        Some(LeaseId(raw))
    }

    /// Leases `count` items, or none at all when fewer are free.
    pub fn lease_many(&self, count: usize) -> Option<Vec<LeaseId>> {
        if count == 0 {
            return Some(Vec::new());
        }
        let mut free = self.free.lock();
        if free.len() < count {
            return None;
        }
        let split = free.len() - count;
        let leased = free.drain(split..).rev().map(LeaseId).collect();
        self.available.store(free.len(), Ordering::Release);
        Some(leased)
    }

    /// Returns an item to the pool after recycling it.
    pub fn release(&self, lease: LeaseId) {
        self.items[lease.0 as usize].recycle();
        let mut free = self.free.lock();
        debug_assert!(!free.contains(&lease.0), "double release of pool item");
        free.push(lease.0);
        self.available.store(free.len(), Ordering::Release);
    }

    /// Returns several leases; convenience for rollback paths.
    pub fn release_all(&self, leases: impl IntoIterator<Item = LeaseId>) {
        for lease in leases {
            self.release(lease);
        }
    }

    /// Borrows a leased item.
    pub fn get(&self, lease: LeaseId) -> &T {
        &self.items[lease.0 as usize]
    }

    /// Borrows the item behind a raw index, if it is in range.
    pub fn get_raw(&self, raw: u32) -> Option<&T> {
        self.items.get(raw as usize)
    }
}
