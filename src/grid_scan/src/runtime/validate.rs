//! Launch and argument checks shared by every backend.
//!
//! A device rejects malformed launches itself; these checks reproduce that
//! contract on the host side so both backends fail the same way before any
//! buffer is touched.

use tracing::trace;

use super::LaunchDims;
use crate::bucket::grid::BinGrid;
use crate::bucket::{BIN_COUNT_KERNEL, BIN_SCATTER_KERNEL};
use crate::error::{Result, ScanError};
use crate::scan::{PREFIX_SUM_KERNEL, PREFIX_SUM_POST_KERNEL};

fn launch(kernel: &'static str, launch: LaunchDims, max_work_group_size: usize) -> Result<()> {
    let reject = |reason: String| Err(ScanError::DispatchFailure { kernel, reason });

    if launch.global == 0 {
        return reject("empty global range".into());
    }
    if launch.local == 0 || launch.local > max_work_group_size {
        return reject(format!(
            "work-group size {} outside 1..={max_work_group_size}",
            launch.local
        ));
    }
    if launch.global % launch.local != 0 {
        return reject(format!(
            "global size {} is not a multiple of work-group size {}",
            launch.global, launch.local
        ));
    }
    trace!(kernel, global = launch.global, local = launch.local, "dispatch");
    Ok(())
}

fn bind(
    kernel: &'static str,
    argument: &'static str,
    ok: bool,
    reason: impl FnOnce() -> String,
) -> Result<()> {
    if ok {
        Ok(())
    } else {
        Err(ScanError::ArgumentBinding {
            kernel,
            argument,
            reason: reason(),
        })
    }
}

/// Two elements per work item; `block_sums` takes one total per group.
pub(crate) fn prefix_sum(
    dims: LaunchDims,
    max_work_group_size: usize,
    input_len: usize,
    output_len: usize,
    block_sums_len: usize,
) -> Result<()> {
    let kernel = PREFIX_SUM_KERNEL;
    launch(kernel, dims, max_work_group_size)?;
    if !dims.local.is_power_of_two() {
        return Err(ScanError::DispatchFailure {
            kernel,
            reason: format!("work-group size {} is not a power of two", dims.local),
        });
    }

    let span = 2 * dims.local;
    let groups = dims.groups();
    bind(kernel, "output", output_len.div_ceil(span) == groups, || {
        format!("{output_len} elements do not fill {groups} blocks of {span}")
    })?;
    bind(kernel, "input", input_len >= output_len, || {
        format!("{input_len} elements, need {output_len}")
    })?;
    bind(kernel, "block_sums", block_sums_len >= groups, || {
        format!("{block_sums_len} slots for {groups} blocks")
    })
}

/// Group `g` covers block `g + 1` of `data`.
pub(crate) fn prefix_sum_post(
    dims: LaunchDims,
    max_work_group_size: usize,
    data_len: usize,
    carries_len: usize,
) -> Result<()> {
    let kernel = PREFIX_SUM_POST_KERNEL;
    launch(kernel, dims, max_work_group_size)?;

    let span = 2 * dims.local;
    let blocks = dims.groups() + 1;
    bind(kernel, "data", data_len == blocks * span, || {
        format!("{data_len} elements, expected {blocks} blocks of {span}")
    })?;
    bind(kernel, "carries", carries_len >= blocks, || {
        format!("{carries_len} carries for {blocks} blocks")
    })
}

pub(crate) fn bin_count(
    dims: LaunchDims,
    max_work_group_size: usize,
    grid: BinGrid,
    points: usize,
    bin_ids_len: usize,
    counts_len: usize,
) -> Result<()> {
    let kernel = BIN_COUNT_KERNEL;
    launch(kernel, dims, max_work_group_size)?;
    bind(kernel, "points", dims.global >= points, || {
        format!("{points} points for {} work items", dims.global)
    })?;
    bind(kernel, "bin_ids", bin_ids_len == points, || {
        format!("{bin_ids_len} slots for {points} points")
    })?;
    bind(kernel, "counts", counts_len >= grid.bin_count(), || {
        format!("{counts_len} counters for {} bins", grid.bin_count())
    })
}

#[allow(clippy::too_many_arguments)]
pub(crate) fn bin_scatter(
    dims: LaunchDims,
    max_work_group_size: usize,
    points: usize,
    bin_ids_len: usize,
    offsets_len: usize,
    cursor_len: usize,
    sorted_len: usize,
    source_index_len: usize,
) -> Result<()> {
    let kernel = BIN_SCATTER_KERNEL;
    launch(kernel, dims, max_work_group_size)?;
    bind(kernel, "points", dims.global >= points, || {
        format!("{points} points for {} work items", dims.global)
    })?;
    bind(kernel, "bin_ids", bin_ids_len == points, || {
        format!("{bin_ids_len} bin ids for {points} points")
    })?;
    bind(kernel, "cursor", cursor_len == offsets_len, || {
        format!("{cursor_len} cursors for {offsets_len} offsets")
    })?;
    bind(
        kernel,
        "sorted",
        sorted_len == points && source_index_len == points,
        || format!("{sorted_len} sorted / {source_index_len} index slots for {points} points"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_launch_limits() {
        assert!(launch("k", LaunchDims::new(8, 4), 4).is_ok());
        assert!(launch("k", LaunchDims::new(0, 4), 4).is_err());
        assert!(launch("k", LaunchDims::new(8, 8), 4).is_err());
        assert!(launch("k", LaunchDims::new(6, 4), 4).is_err());
    }

    #[test]
    fn test_prefix_sum_rejects_non_power_of_two() {
        let err = prefix_sum(LaunchDims::new(6, 3), 8, 12, 12, 2).unwrap_err();
        assert!(matches!(err, ScanError::DispatchFailure { .. }));
    }

    #[test]
    fn test_prefix_sum_binding() {
        assert!(prefix_sum(LaunchDims::new(1, 1), 8, 1, 1, 1).is_ok());
        assert!(matches!(
            prefix_sum(LaunchDims::new(8, 4), 8, 16, 16, 1),
            Err(ScanError::ArgumentBinding {
                argument: "block_sums",
                ..
            })
        ));
        assert!(matches!(
            prefix_sum(LaunchDims::new(8, 4), 8, 8, 16, 2),
            Err(ScanError::ArgumentBinding {
                argument: "input",
                ..
            })
        ));
    }

    #[test]
    fn test_post_binding() {
        assert!(prefix_sum_post(LaunchDims::new(8, 4), 8, 24, 4).is_ok());
        assert!(prefix_sum_post(LaunchDims::new(8, 4), 8, 16, 4).is_err());
        assert!(prefix_sum_post(LaunchDims::new(8, 4), 8, 24, 2).is_err());
    }

    #[test]
    fn test_bin_count_binding() {
        let grid = BinGrid::new(2).unwrap();
        assert!(bin_count(LaunchDims::new(4, 4), 8, grid, 3, 3, 8).is_ok());
        assert!(bin_count(LaunchDims::new(4, 4), 8, grid, 3, 3, 4).is_err());
        assert!(bin_count(LaunchDims::new(4, 4), 8, grid, 5, 5, 8).is_err());
    }
}
