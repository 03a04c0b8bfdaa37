//! Work-efficient exclusive scan of one block in local memory.
//!
//! A block of `n = 2·local` elements is reduced in place by an up-sweep over a
//! balanced binary tree, the root is cleared, and a down-sweep distributes the
//! partial sums back to the leaves. Each tree level is one barrier-delimited
//! phase, so a block passes `2·log2(n) + 1` barriers in total.

use crate::runtime::WorkGroup;

/// Scan `input` into `output` as one work group.
///
/// `output` holds at most `2 · group.local_size()` elements; slots of the
/// local tree past the end of `input` are zero. Returns the block total.
pub fn prefix_sum_group(group: &mut WorkGroup, input: &[u32], output: &mut [u32]) -> u32 {
    let n = 2 * group.local_size();
    debug_assert!(n.is_power_of_two());
    debug_assert!(output.len() <= n);

    let mut temp = vec![0u32; n];
    let load = |i: usize| input.get(i).copied().unwrap_or(0);

    group.for_each_item(|lid| {
        temp[2 * lid] = load(2 * lid);
        temp[2 * lid + 1] = load(2 * lid + 1);
    });

    // Up-sweep
    let mut offset = 1;
    let mut active = n >> 1;
    while active > 0 {
        group.barrier();
        group.for_each_item(|lid| {
            if lid < active {
                let ai = offset * (2 * lid + 1) - 1;
                let bi = offset * (2 * lid + 2) - 1;
                temp[bi] = temp[bi].wrapping_add(temp[ai]);
            }
        });
        offset <<= 1;
        active >>= 1;
    }

    let mut total = 0;
    group.for_each_item(|lid| {
        if lid == 0 {
            total = temp[n - 1];
            temp[n - 1] = 0;
        }
    });

    // Down-sweep
    let mut active = 1;
    while active < n {
        offset >>= 1;
        group.barrier();
        group.for_each_item(|lid| {
            if lid < active {
                let ai = offset * (2 * lid + 1) - 1;
                let bi = offset * (2 * lid + 2) - 1;
                let left = temp[ai];
                temp[ai] = temp[bi];
                temp[bi] = temp[bi].wrapping_add(left);
            }
        });
        active <<= 1;
    }

    group.barrier();
    let len = output.len();
    group.for_each_item(|lid| {
        for i in [2 * lid, 2 * lid + 1] {
            if i < len {
                output[i] = temp[i];
            }
        }
    });

    total
}

/// Sequential exclusive scan, the reference every parallel path must match.
pub fn exclusive_scan_cpu(input: &[u32]) -> Vec<u32> {
    let mut sum = 0u32;
    input
        .iter()
        .map(|&x| {
            let prev = sum;
            sum = sum.wrapping_add(x);
            prev
        })
        .collect()
}

/// Sequential inclusive scan.
pub fn inclusive_scan_cpu(input: &[u32]) -> Vec<u32> {
    let mut sum = 0u32;
    input
        .iter()
        .map(|&x| {
            sum = sum.wrapping_add(x);
            sum
        })
        .collect()
}
