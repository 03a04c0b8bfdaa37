//! Counting-sort spatial bucketing.
//!
//! Points are grouped by uniform-grid bin in three dependent dispatch stages:
//!
//! 1. `bin_count`: every point computes its bin id and atomically increments
//!    that bin's counter.
//! 2. Scan of the counters, giving each bin's first slot (see [`crate::scan`]).
//! 3. `bin_scatter`: every point draws a rank from its bin's cursor and lands
//!    at `offset + rank`.
//!
//! The output is contiguous per bin in ascending bin order. Order within a bin
//! follows the cursor increments and is not stable across runs.

pub mod binner;
pub mod grid;
#[cfg(feature = "cuda")]
pub(crate) mod kernels;
pub mod neighbors;
pub mod scatter;
pub mod statistics;

pub use grid::{BinGrid, CELL_GRID_RESOLUTION, NEIGHBOR_GRID_RESOLUTION};
pub use neighbors::{nearest_neighbors, neighborhood_centroids, FrnnResult};
pub use statistics::{compute_cell_statistics, CellStatistics};

use std::ops::Range;

use serde::Serialize;
use tracing::debug;

use crate::error::{Result, ScanError};
use crate::runtime::{alloc_zeroed, AtomicCounters, ComputeContext, LaunchDims, FLAT_WORK_GROUP_SIZE};
use crate::scan::run_scan;
use crate::timing::PipelineTiming;
use crate::Point;

/// Binning kernel.
pub const BIN_COUNT_KERNEL: &str = "bin_count";
/// Scatter kernel.
pub const BIN_SCATTER_KERNEL: &str = "bin_scatter";

/// Grid-sorted point set with its bin bookkeeping.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BucketSortResult {
    /// Points grouped by ascending bin id.
    pub points: Vec<Point>,
    /// Input index of the point in each sorted slot.
    pub source_indices: Vec<u32>,
    /// Occupancy per bin, zero-padded to the scan's padded length.
    pub bin_counts: Vec<u32>,
    /// Exclusive prefix sum of `bin_counts`.
    pub bin_offsets: Vec<u32>,
    pub grid: BinGrid,
    pub timing: PipelineTiming,
}

impl BucketSortResult {
    /// Slots of `points` belonging to `bin`.
    pub fn bin_range(&self, bin: usize) -> Range<usize> {
        let start = self.bin_offsets[bin] as usize;
        start..start + self.bin_counts[bin] as usize
    }

    /// Points of one bin.
    pub fn bin_points(&self, bin: usize) -> &[Point] {
        &self.points[self.bin_range(bin)]
    }

    /// Number of sorted entries: the end of the last bin's range.
    pub fn sorted_len(&self) -> usize {
        match (self.bin_offsets.last(), self.bin_counts.last()) {
            (Some(&offset), Some(&count)) => offset as usize + count as usize,
            _ => 0,
        }
    }

    /// Number of bins holding at least one point.
    pub fn occupied_bins(&self) -> usize {
        self.bin_counts.iter().filter(|&&c| c > 0).count()
    }
}

impl ComputeContext {
    /// Sort `points` into a grid of `resolution³` bins.
    pub fn bucket_sort(&self, points: &[Point], resolution: u32) -> Result<BucketSortResult> {
        self.bucket_sort_with_grid(points, BinGrid::new(resolution)?)
    }

    /// Sort `points` into the bins of `grid`.
    pub fn bucket_sort_with_grid(&self, points: &[Point], grid: BinGrid) -> Result<BucketSortResult> {
        let n = points.len();
        if u32::try_from(n).is_err() {
            return Err(ScanError::ArgumentBinding {
                kernel: BIN_COUNT_KERNEL,
                argument: "points",
                reason: format!("{n} points exceed the u32 index range"),
            });
        }

        // Reject oversized grids before touching any buffer
        let plan = self.plan_scan(grid.bin_count())?;
        let padded = plan.padded_count;
        let mut timing = PipelineTiming::new();

        if n == 0 {
            return Ok(BucketSortResult {
                points: Vec::new(),
                source_indices: Vec::new(),
                bin_counts: alloc_zeroed(padded, "bin counts")?,
                bin_offsets: alloc_zeroed(padded, "bin offsets")?,
                grid,
                timing,
            });
        }

        let backend = self.backend();
        let launch = LaunchDims::flat(n, FLAT_WORK_GROUP_SIZE.min(self.work_group_size()));

        // Pass 1: count
        let counters = AtomicCounters::zeroed(padded)?;
        let mut bin_ids: Vec<u32> = alloc_zeroed(n, "bin ids")?;
        timing.record(backend.bin_count(launch, grid, points, &mut bin_ids, &counters)?);
        let bin_counts = counters.to_vec();

        // Offsets
        let mut bin_offsets: Vec<u32> = alloc_zeroed(padded, "bin offsets")?;
        let total = run_scan(backend, &plan, &bin_counts, &mut bin_offsets, &mut timing)?;
        if total as usize != n {
            return Err(ScanError::DispatchFailure {
                kernel: BIN_COUNT_KERNEL,
                reason: format!("counted {total} points, expected {n}"),
            });
        }

        // Pass 2: scatter, reusing the counters as cursors
        counters.reset();
        let mut sorted: Vec<Point> = alloc_zeroed(n, "sorted points")?;
        let mut source_indices: Vec<u32> = alloc_zeroed(n, "source indices")?;
        timing.record(backend.bin_scatter(
            launch,
            points,
            &bin_ids,
            &bin_offsets,
            &counters,
            &mut sorted,
            &mut source_indices,
        )?);

        debug!(
            points = n,
            resolution = grid.resolution(),
            bins = grid.bin_count(),
            dispatches = timing.dispatch_count(),
            "Bucket sort complete"
        );

        Ok(BucketSortResult {
            points: sorted,
            source_indices,
            bin_counts,
            bin_offsets,
            grid,
            timing,
        })
    }
}
