//! Fixed-radius neighbor queries over a grid-sorted point set.
//!
//! A query point only visits the bins within `⌈r·D⌉` cells of its own on each
//! axis. Bins along x are adjacent in the sorted order, so every (y, z) row of
//! the search window is a single contiguous slice of the sorted points.

use rayon::prelude::*;
use serde::Serialize;
use tracing::debug;

use super::BucketSortResult;
use crate::error::Result;
use crate::runtime::ComputeContext;
use crate::Point;

/// Output of [`ComputeContext::fixed_radius_neighbors`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrnnResult {
    pub sorted: BucketSortResult,
    /// Sorted index of the closest other point within the radius.
    pub nearest: Vec<Option<u32>>,
    /// Mean of all points within the radius, the query itself included.
    pub centroids: Vec<Point>,
}

#[inline]
fn distance_squared(a: &Point, b: &Point) -> f32 {
    let dx = a[0] - b[0];
    let dy = a[1] - b[1];
    let dz = a[2] - b[2];
    dx * dx + dy * dy + dz * dz
}

/// Visit every sorted point in the bin window around `query`, in ascending
/// sorted index.
fn for_each_candidate(
    sorted: &BucketSortResult,
    query: &Point,
    reach: u32,
    mut visit: impl FnMut(usize, &Point),
) {
    let grid = sorted.grid;
    let Some([cx, cy, cz]) = grid.cell_of(query) else {
        return;
    };
    let last = grid.resolution() - 1;
    let window = |c: u32| c.saturating_sub(reach)..=(c.saturating_add(reach)).min(last);
    let (x_lo, x_hi) = (cx.saturating_sub(reach), cx.saturating_add(reach).min(last));

    for z in window(cz) {
        for y in window(cy) {
            let first = grid.bin_index([x_lo, y, z]) as usize;
            let end = sorted.bin_range(grid.bin_index([x_hi, y, z]) as usize).end;
            let start = sorted.bin_offsets[first] as usize;
            for (j, p) in sorted.points[start..end].iter().enumerate() {
                visit(start + j, p);
            }
        }
    }
}

fn search_reach(sorted: &BucketSortResult, radius: f32) -> u32 {
    (radius * sorted.grid.resolution() as f32).ceil().max(0.0) as u32
}

/// Closest other point within `radius` for every sorted point.
///
/// Ties resolve to the lower sorted index.
pub fn nearest_neighbors(sorted: &BucketSortResult, radius: f32) -> Vec<Option<u32>> {
    let reach = search_reach(sorted, radius);
    let r2 = radius * radius;

    sorted
        .points
        .par_iter()
        .enumerate()
        .map(|(i, query)| {
            let mut best: Option<(u32, f32)> = None;
            for_each_candidate(sorted, query, reach, |j, p| {
                if j == i {
                    return;
                }
                let d2 = distance_squared(query, p);
                if d2 <= r2 && best.map_or(true, |(_, b)| d2 < b) {
                    best = Some((j as u32, d2));
                }
            });
            best.map(|(j, _)| j)
        })
        .collect()
}

/// Mean of the points within `radius` of every sorted point.
pub fn neighborhood_centroids(sorted: &BucketSortResult, radius: f32) -> Vec<Point> {
    let reach = search_reach(sorted, radius);
    let r2 = radius * radius;

    sorted
        .points
        .par_iter()
        .map(|query| {
            let mut sum = [0.0f64; 3];
            let mut count = 0usize;
            for_each_candidate(sorted, query, reach, |_, p| {
                if distance_squared(query, p) <= r2 {
                    for (s, &c) in sum.iter_mut().zip(p) {
                        *s += c as f64;
                    }
                    count += 1;
                }
            });
            let n = count.max(1) as f64;
            sum.map(|s| (s / n) as f32)
        })
        .collect()
}

impl ComputeContext {
    /// Bucket `points` on the neighbor grid, then run both radius queries
    /// with the configured radius.
    pub fn fixed_radius_neighbors(&self, points: &[Point]) -> Result<FrnnResult> {
        let config = self.config();
        let sorted = self.bucket_sort(points, config.neighbor_resolution)?;
        let nearest = nearest_neighbors(&sorted, config.neighbor_radius);
        let centroids = neighborhood_centroids(&sorted, config.neighbor_radius);

        debug!(
            points = points.len(),
            radius = config.neighbor_radius,
            with_neighbor = nearest.iter().filter(|n| n.is_some()).count(),
            "Fixed-radius queries complete"
        );

        Ok(FrnnResult {
            sorted,
            nearest,
            centroids,
        })
    }
}
