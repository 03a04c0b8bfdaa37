//! Atomic counter buffers.
//!
//! One type serves both the per-bin occupancy counts of the binning pass and
//! the per-bin cursors of the scatter pass. Increments use relaxed ordering;
//! the dispatch boundary that follows each pass publishes the final values.

use std::sync::atomic::{AtomicU32, Ordering};

use crate::error::{Result, ScanError};

/// Fixed-length buffer of atomic `u32` counters.
#[derive(Debug)]
pub struct AtomicCounters {
    cells: Vec<AtomicU32>,
}

impl AtomicCounters {
    /// Allocate `len` counters set to zero.
    pub fn zeroed(len: usize) -> Result<Self> {
        let mut cells = Vec::new();
        cells
            .try_reserve_exact(len)
            .map_err(|_| ScanError::AllocationFailure {
                buffer: "atomic counters",
                bytes: len.saturating_mul(std::mem::size_of::<AtomicU32>()),
            })?;
        cells.extend((0..len).map(|_| AtomicU32::new(0)));
        Ok(Self { cells })
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Add `value` to counter `index` and return its previous value.
    #[inline]
    pub fn fetch_add(&self, index: usize, value: u32) -> u32 {
        self.cells[index].fetch_add(value, Ordering::Relaxed)
    }

    #[inline]
    pub fn load(&self, index: usize) -> u32 {
        self.cells[index].load(Ordering::Relaxed)
    }

    /// Set every counter back to zero.
    pub fn reset(&self) {
        for cell in &self.cells {
            cell.store(0, Ordering::Relaxed);
        }
    }

    /// Overwrite the counters with values read back from a device.
    pub fn store_all(&self, values: &[u32]) {
        debug_assert_eq!(values.len(), self.cells.len());
        for (cell, &value) in self.cells.iter().zip(values) {
            cell.store(value, Ordering::Relaxed);
        }
    }

    /// Snapshot of all counters.
    pub fn to_vec(&self) -> Vec<u32> {
        self.cells
            .iter()
            .map(|c| c.load(Ordering::Relaxed))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rayon::prelude::*;

    #[test]
    fn test_fetch_add_returns_previous() {
        let counters = AtomicCounters::zeroed(4).unwrap();
        assert_eq!(counters.fetch_add(2, 1), 0);
        assert_eq!(counters.fetch_add(2, 1), 1);
        assert_eq!(counters.fetch_add(2, 5), 2);
        assert_eq!(counters.to_vec(), vec![0, 0, 7, 0]);
    }

    #[test]
    fn test_concurrent_increments_not_lost() {
        let counters = AtomicCounters::zeroed(8).unwrap();
        (0..80_000usize).into_par_iter().for_each(|i| {
            counters.fetch_add(i % 8, 1);
        });
        assert_eq!(counters.to_vec(), vec![10_000; 8]);
    }

    #[test]
    fn test_concurrent_ranks_unique() {
        let counters = AtomicCounters::zeroed(1).unwrap();
        let mut ranks: Vec<u32> = (0..1000)
            .into_par_iter()
            .map(|_| counters.fetch_add(0, 1))
            .collect();
        ranks.sort_unstable();
        assert_eq!(ranks, (0..1000).collect::<Vec<u32>>());
    }

    #[test]
    fn test_reset_and_store() {
        let counters = AtomicCounters::zeroed(3).unwrap();
        counters.store_all(&[4, 5, 6]);
        assert_eq!(counters.load(1), 5);
        counters.reset();
        assert_eq!(counters.to_vec(), vec![0, 0, 0]);
        assert!(!counters.is_empty());
        assert_eq!(counters.len(), 3);
    }
}
