//! CubeCL kernels for the block scan and carry propagation.
//!
//! One cube scans `block_len = 2·CUBE_DIM_X` elements in shared memory.
//! `levels` is `log2(block_len)`.

use cubecl::prelude::*;

/// Block-local exclusive scan with per-block totals.
///
/// # Inputs
/// - `input`: [len] values, read as zero past `len`
/// - `len`: logical element count
///
/// # Outputs
/// - `output`: [len] block-local exclusive sums
/// - `block_sums`: [cube count] total of each block
#[cube(launch_unchecked)]
pub fn prefix_sum_kernel(
    input: &Array<u32>,
    output: &mut Array<u32>,
    block_sums: &mut Array<u32>,
    len: u32,
    #[comptime] block_len: u32,
    #[comptime] levels: u32,
) {
    let lid = UNIT_POS_X;
    let base = CUBE_POS_X * block_len;
    let mut temp = SharedMemory::<u32>::new(block_len);

    let a = 2 * lid;
    let b = a + 1;
    let mut va = 0u32;
    let mut vb = 0u32;
    if base + a < len {
        va = input[base + a];
    }
    if base + b < len {
        vb = input[base + b];
    }
    temp[a] = va;
    temp[b] = vb;

    // Up-sweep
    let mut offset = 1u32;
    for level in 0..levels {
        let active = block_len >> (level + 1);
        sync_cube();
        if lid < active {
            let ai = offset * (a + 1) - 1;
            let bi = offset * (a + 2) - 1;
            temp[bi] += temp[ai];
        }
        offset *= 2;
    }

    if lid == 0 {
        block_sums[CUBE_POS_X] = temp[block_len - 1];
        temp[block_len - 1] = 0;
    }

    // Down-sweep
    for level in 0..levels {
        offset /= 2;
        let active = 1u32 << level;
        sync_cube();
        if lid < active {
            let ai = offset * (a + 1) - 1;
            let bi = offset * (a + 2) - 1;
            let left = temp[ai];
            temp[ai] = temp[bi];
            temp[bi] += left;
        }
    }

    sync_cube();
    if base + a < len {
        output[base + a] = temp[a];
    }
    if base + b < len {
        output[base + b] = temp[b];
    }
}

/// Add `carries[block]` to every element of `block`, skipping block 0.
#[cube(launch_unchecked)]
pub fn prefix_sum_post_kernel(
    data: &mut Array<u32>,
    carries: &Array<u32>,
    #[comptime] block_len: u32,
) {
    let block = CUBE_POS_X + 1;
    let carry = carries[block];
    let base = block * block_len + 2 * UNIT_POS_X;
    data[base] += carry;
    data[base + 1] += carry;
}
