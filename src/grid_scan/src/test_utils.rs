//! Synthetic point clouds in normalized coordinates.
//!
//! All generators are seeded and deterministic.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;

use crate::Point;

/// Largest `f32` below 1.0.
const BELOW_ONE: f32 = 1.0 - f32::EPSILON / 2.0;

/// `n` points uniformly distributed in `[0, 1)³`.
pub fn uniform_cloud(n: usize, seed: u64) -> Vec<Point> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n)
        .map(|_| [rng.gen::<f32>(), rng.gen::<f32>(), rng.gen::<f32>()])
        .collect()
}

/// One point at the center of every cell of a `resolution³` grid, shuffled.
pub fn lattice_cloud(resolution: u32, seed: u64) -> Vec<Point> {
    let d = resolution as f32;
    let mut points = Vec::with_capacity((resolution as usize).pow(3));
    for z in 0..resolution {
        for y in 0..resolution {
            for x in 0..resolution {
                points.push([
                    (x as f32 + 0.5) / d,
                    (y as f32 + 0.5) / d,
                    (z as f32 + 0.5) / d,
                ]);
            }
        }
    }
    points.shuffle(&mut StdRng::seed_from_u64(seed));
    points
}

/// Gaussian clusters with uniformly placed centers, clamped into `[0, 1)³`.
pub fn clustered_cloud(
    clusters: usize,
    points_per_cluster: usize,
    sigma: f32,
    seed: u64,
) -> Vec<Point> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut points = Vec::with_capacity(clusters * points_per_cluster);
    for _ in 0..clusters {
        let center: Point = [rng.gen(), rng.gen(), rng.gen()];
        for _ in 0..points_per_cluster {
            points.push(center.map(|c| {
                let offset: f32 = rng.sample(StandardNormal);
                (c + sigma * offset).clamp(0.0, BELOW_ONE)
            }));
        }
    }
    points
}
