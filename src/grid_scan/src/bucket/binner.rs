//! Binning pass: bin id per point and concurrent occupancy counts.

use rayon::prelude::*;

use super::grid::BinGrid;
use crate::error::{Result, ScanError};
use crate::runtime::AtomicCounters;
use crate::Point;

/// Work item `index` of the binning pass.
///
/// Returns the point's bin id after counting it.
#[inline]
pub fn count_point(
    grid: BinGrid,
    counts: &AtomicCounters,
    index: usize,
    point: &Point,
) -> Result<u32> {
    let bin = grid.bin_of(point).ok_or(ScanError::PointOutsideGrid {
        index,
        point: *point,
    })?;
    counts.fetch_add(bin as usize, 1);
    Ok(bin)
}

/// Fails with the lowest-index point outside `grid`, if any.
pub fn check_inside(grid: BinGrid, points: &[Point]) -> Result<()> {
    match points.par_iter().position_first(|p| grid.cell_of(p).is_none()) {
        Some(index) => Err(ScanError::PointOutsideGrid {
            index,
            point: points[index],
        }),
        None => Ok(()),
    }
}

/// Bin ids of every point, sequentially; the reference for the binning pass.
pub fn bin_ids_cpu(grid: BinGrid, points: &[Point]) -> Result<Vec<u32>> {
    points
        .iter()
        .enumerate()
        .map(|(index, point)| {
            grid.bin_of(point)
                .ok_or(ScanError::PointOutsideGrid { index, point: *point })
        })
        .collect()
}
