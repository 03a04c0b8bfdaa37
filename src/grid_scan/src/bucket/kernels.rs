//! CubeCL kernels for the counting sort.
//!
//! Points are passed flattened as `[N * 3]` coordinates and must already be
//! known to lie in `[0, 1)³`.

use cubecl::prelude::*;

/// Bin id per point and atomic occupancy counts.
#[cube(launch_unchecked)]
pub fn bin_count_kernel(
    points: &Array<f32>,
    num_points: u32,
    resolution: u32,
    bin_ids: &mut Array<u32>,
    counts: &mut Array<Atomic<u32>>,
) {
    let idx = ABSOLUTE_POS;
    if idx >= num_points {
        terminate!();
    }

    let d = f32::cast_from(resolution);
    let last = resolution - 1;
    let base = idx * 3;

    let mut ix = u32::cast_from(f32::floor(points[base] * d));
    let mut iy = u32::cast_from(f32::floor(points[base + 1] * d));
    let mut iz = u32::cast_from(f32::floor(points[base + 2] * d));
    if ix > last {
        ix = last;
    }
    if iy > last {
        iy = last;
    }
    if iz > last {
        iz = last;
    }

    let bin = ix + resolution * iy + resolution * resolution * iz;
    bin_ids[idx] = bin;
    Atomic::add(&counts[bin], 1u32);
}

/// Scatter every point to `offsets[bin] + rank`, drawing ranks from `cursor`.
#[cube(launch_unchecked)]
pub fn bin_scatter_kernel(
    points: &Array<f32>,
    bin_ids: &Array<u32>,
    offsets: &Array<u32>,
    num_points: u32,
    cursor: &mut Array<Atomic<u32>>,
    sorted: &mut Array<f32>,
    source_index: &mut Array<u32>,
) {
    let idx = ABSOLUTE_POS;
    if idx >= num_points {
        terminate!();
    }

    let bin = bin_ids[idx];
    let rank = Atomic::add(&cursor[bin], 1u32);
    let dest = offsets[bin] + rank;

    sorted[dest * 3] = points[idx * 3];
    sorted[dest * 3 + 1] = points[idx * 3 + 1];
    sorted[dest * 3 + 2] = points[idx * 3 + 2];
    source_index[dest] = idx;
}
