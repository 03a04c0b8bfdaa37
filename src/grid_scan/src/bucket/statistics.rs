//! Per-cell point statistics over a grid-sorted point set.

use nalgebra::{Matrix3, Vector3};
use rayon::prelude::*;
use serde::Serialize;
use tracing::debug;

use super::{BinGrid, BucketSortResult};
use crate::error::Result;
use crate::runtime::ComputeContext;

/// Count, mean and sample covariance of the points in one bin.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CellStatistics {
    pub bin: u32,
    pub count: usize,
    pub mean: Vector3<f64>,
    /// `None` when the cell has too few points for a covariance.
    pub covariance: Option<Matrix3<f64>>,
}

impl CellStatistics {
    /// Build from accumulated sums.
    ///
    /// Cov = (Σxxᵀ − n·μμᵀ) / (n − 1), computed once `count` reaches
    /// `min_points` (and at least two).
    pub fn from_sums(
        bin: u32,
        sum: &Vector3<f64>,
        sum_sq: &Matrix3<f64>,
        count: usize,
        min_points: usize,
    ) -> Self {
        let n = count as f64;
        let mean = sum / n;
        let covariance = (count >= min_points.max(2))
            .then(|| (sum_sq - mean * mean.transpose() * n) / (n - 1.0));

        Self {
            bin,
            count,
            mean,
            covariance,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.covariance.is_some()
    }

    /// Integer coordinates of the cell in `grid`.
    pub fn cell(&self, grid: BinGrid) -> [u32; 3] {
        grid.cell_coords(self.bin)
    }
}

/// Statistics of every occupied bin, in ascending bin order.
///
/// One work item per bin walks the bin's contiguous range of sorted points.
pub fn compute_cell_statistics(
    sorted: &BucketSortResult,
    min_points_per_cell: usize,
) -> Vec<CellStatistics> {
    let bins = sorted.grid.bin_count();
    sorted.bin_counts[..bins]
        .par_iter()
        .enumerate()
        .filter(|&(_, &count)| count > 0)
        .map(|(bin, &count)| {
            let mut sum = Vector3::zeros();
            let mut sum_sq = Matrix3::zeros();
            for p in sorted.bin_points(bin) {
                let v = Vector3::new(p[0] as f64, p[1] as f64, p[2] as f64);
                sum += v;
                sum_sq += v * v.transpose();
            }
            CellStatistics::from_sums(bin as u32, &sum, &sum_sq, count as usize, min_points_per_cell)
        })
        .collect()
}

impl ComputeContext {
    /// Bucket `points` on the cell grid and compute per-cell statistics.
    pub fn cell_statistics(
        &self,
        points: &[crate::Point],
    ) -> Result<(BucketSortResult, Vec<CellStatistics>)> {
        let config = self.config();
        let sorted = self.bucket_sort(points, config.cell_resolution)?;
        let cells = compute_cell_statistics(&sorted, config.min_points_per_cell);

        debug!(
            points = points.len(),
            occupied = cells.len(),
            valid = cells.iter().filter(|c| c.is_valid()).count(),
            "Cell statistics computed"
        );
        Ok((sorted, cells))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{clustered_cloud, uniform_cloud};
    use approx::assert_relative_eq;

    #[test]
    fn test_from_sums() {
        // Points (0,0,0) and (2,0,0)
        let sum = Vector3::new(2.0, 0.0, 0.0);
        let mut sum_sq = Matrix3::zeros();
        sum_sq[(0, 0)] = 4.0;

        let stats = CellStatistics::from_sums(0, &sum, &sum_sq, 2, 2);
        assert_relative_eq!(stats.mean, Vector3::new(1.0, 0.0, 0.0));
        let cov = stats.covariance.unwrap();
        assert_relative_eq!(cov[(0, 0)], 2.0);
        assert_relative_eq!(cov[(1, 1)], 0.0);
    }

    #[test]
    fn test_sparse_cell_has_no_covariance() {
        let stats = CellStatistics::from_sums(3, &Vector3::zeros(), &Matrix3::zeros(), 1, 1);
        assert!(!stats.is_valid());
        assert_eq!(stats.count, 1);
    }

    #[test]
    fn test_matches_brute_force() {
        let ctx = ComputeContext::new().unwrap();
        let points = clustered_cloud(3, 300, 0.03, 42);
        let (sorted, cells) = ctx.cell_statistics(&points).unwrap();
        let grid = sorted.grid;

        assert_eq!(cells.iter().map(|c| c.count).sum::<usize>(), points.len());
        assert!(cells.windows(2).all(|w| w[0].bin < w[1].bin));

        for cell in cells.iter().filter(|c| c.is_valid()) {
            let members: Vec<Vector3<f64>> = points
                .iter()
                .filter(|p| grid.bin_of(p) == Some(cell.bin))
                .map(|p| Vector3::new(p[0] as f64, p[1] as f64, p[2] as f64))
                .collect();
            let n = members.len() as f64;
            let mean = members.iter().sum::<Vector3<f64>>() / n;
            let cov = members
                .iter()
                .map(|v| (v - mean) * (v - mean).transpose())
                .sum::<Matrix3<f64>>()
                / (n - 1.0);

            assert_eq!(cell.count, members.len());
            assert_relative_eq!(cell.mean, mean, epsilon = 1e-9);
            assert_relative_eq!(cell.covariance.unwrap(), cov, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_min_points_threshold() {
        let ctx = ComputeContext::new().unwrap();
        let points = uniform_cloud(2000, 5);
        let sorted = ctx.bucket_sort(&points, 8).unwrap();

        for cell in compute_cell_statistics(&sorted, 6) {
            assert_eq!(cell.is_valid(), cell.count >= 6);
            let [x, y, z] = cell.cell(sorted.grid);
            assert!(x < 8 && y < 8 && z < 8);
        }
    }
}
