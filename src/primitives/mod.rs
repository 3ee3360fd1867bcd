//! Low-level building blocks of the page layer.
//!
//! Concurrency controls shared by the translation table and the table
//! itself.

/// Writer latch, sequence counters and the bounded object pool.
pub mod concurrency;

/// Multi-version page translation table.
///
/// Maps logical pages to scratch locations per transaction snapshot.
pub mod pager;
