//! Host SIMT emulator.
//!
//! Work groups of a dispatch run in parallel on rayon. Inside a work group the
//! work items run in lockstep phases: [`WorkGroup::for_each_item`] executes one
//! barrier-free phase for every local id, and [`WorkGroup::barrier`] marks the
//! synchronization point between phases. Code between two barriers must only
//! touch local-memory slots owned by the current item or written before the
//! previous barrier, exactly as on a device.

use rayon::prelude::*;

use super::{alloc_zeroed, validate, AtomicCounters, ComputeBackend, DeviceCapabilities, LaunchDims};
use crate::bucket::grid::BinGrid;
use crate::bucket::{binner, scatter, BIN_COUNT_KERNEL, BIN_SCATTER_KERNEL};
use crate::config::EngineConfig;
use crate::error::{Result, ScanError};
use crate::scan::{block, carry, PREFIX_SUM_KERNEL, PREFIX_SUM_POST_KERNEL};
use crate::timing::{DispatchRecord, DispatchTimer};
use crate::Point;

/// One work group of an emulated dispatch.
#[derive(Debug)]
pub struct WorkGroup {
    id: usize,
    local_size: usize,
    barriers: usize,
}

impl WorkGroup {
    pub fn new(id: usize, local_size: usize) -> Self {
        Self {
            id,
            local_size,
            barriers: 0,
        }
    }

    /// Work-group index within the dispatch.
    pub fn id(&self) -> usize {
        self.id
    }

    pub fn local_size(&self) -> usize {
        self.local_size
    }

    /// Run one phase for every work item, in local-id order.
    #[inline]
    pub fn for_each_item(&self, mut item: impl FnMut(usize)) {
        for local_id in 0..self.local_size {
            item(local_id);
        }
    }

    /// Work-group barrier; every item has finished the previous phase.
    #[inline]
    pub fn barrier(&mut self) {
        self.barriers += 1;
    }

    /// Barriers passed so far.
    pub fn barriers(&self) -> usize {
        self.barriers
    }
}

/// Compute backend running every kernel on the host.
pub struct HostRuntime {
    max_work_group_size: usize,
    pool: Option<rayon::ThreadPool>,
}

impl HostRuntime {
    /// Emulate a device with the given work-group limit on the global pool.
    pub fn new(max_work_group_size: usize) -> Self {
        Self {
            max_work_group_size,
            pool: None,
        }
    }

    /// Build from configuration, creating a dedicated pool when requested.
    pub fn from_config(config: &EngineConfig) -> Result<Self> {
        let pool = match config.host_threads {
            Some(threads) => Some(
                rayon::ThreadPoolBuilder::new()
                    .num_threads(threads)
                    .thread_name(|i| format!("grid-scan-{i}"))
                    .build()
                    .map_err(|e| {
                        ScanError::InvalidConfig(format!("failed to build host thread pool: {e}"))
                    })?,
            ),
            None => None,
        };

        Ok(Self {
            max_work_group_size: config.host_work_group_size,
            pool,
        })
    }

    fn install<R: Send>(&self, op: impl FnOnce() -> R + Send) -> R {
        match &self.pool {
            Some(pool) => pool.install(op),
            None => op(),
        }
    }
}

impl ComputeBackend for HostRuntime {
    fn name(&self) -> &'static str {
        "host"
    }

    fn capabilities(&self) -> DeviceCapabilities {
        DeviceCapabilities {
            max_work_group_size: self.max_work_group_size,
        }
    }

    fn prefix_sum(
        &self,
        launch: LaunchDims,
        input: &[u32],
        output: &mut [u32],
        block_sums: &mut [u32],
    ) -> Result<DispatchRecord> {
        validate::prefix_sum(
            launch,
            self.max_work_group_size,
            input.len(),
            output.len(),
            block_sums.len(),
        )?;

        let span = 2 * launch.local;
        let groups = launch.groups();
        let timer = DispatchTimer::start();
        self.install(|| {
            output
                .par_chunks_mut(span)
                .zip(block_sums[..groups].par_iter_mut())
                .enumerate()
                .for_each(|(group_id, (out, block_sum))| {
                    let start = group_id * span;
                    let mut group = WorkGroup::new(group_id, launch.local);
                    *block_sum =
                        block::prefix_sum_group(&mut group, &input[start..start + out.len()], out);
                });
        });

        Ok(timer.finish(PREFIX_SUM_KERNEL, launch))
    }

    fn prefix_sum_post(
        &self,
        launch: LaunchDims,
        data: &mut [u32],
        carries: &[u32],
    ) -> Result<DispatchRecord> {
        validate::prefix_sum_post(launch, self.max_work_group_size, data.len(), carries.len())?;

        let span = 2 * launch.local;
        let timer = DispatchTimer::start();
        self.install(|| {
            data[span..]
                .par_chunks_mut(span)
                .enumerate()
                .for_each(|(group_id, block)| {
                    let group = WorkGroup::new(group_id, launch.local);
                    carry::add_carry_group(&group, carries[group_id + 1], block);
                });
        });

        Ok(timer.finish(PREFIX_SUM_POST_KERNEL, launch))
    }

    fn bin_count(
        &self,
        launch: LaunchDims,
        grid: BinGrid,
        points: &[Point],
        bin_ids: &mut [u32],
        counts: &AtomicCounters,
    ) -> Result<DispatchRecord> {
        validate::bin_count(
            launch,
            self.max_work_group_size,
            grid,
            points.len(),
            bin_ids.len(),
            counts.len(),
        )?;

        let timer = DispatchTimer::start();
        let counted = self.install(|| {
            bin_ids
                .par_iter_mut()
                .zip(points.par_iter())
                .enumerate()
                .try_for_each(|(index, (bin_id, point))| {
                    *bin_id = binner::count_point(grid, counts, index, point)?;
                    Ok::<(), ScanError>(())
                })
        });
        if let Err(err) = counted {
            // Whichever item failed first depends on scheduling; report the lowest index
            self.install(|| binner::check_inside(grid, points))?;
            return Err(err);
        }

        Ok(timer.finish(BIN_COUNT_KERNEL, launch))
    }

    fn bin_scatter(
        &self,
        launch: LaunchDims,
        points: &[Point],
        bin_ids: &[u32],
        offsets: &[u32],
        cursor: &AtomicCounters,
        sorted: &mut [Point],
        source_index: &mut [u32],
    ) -> Result<DispatchRecord> {
        validate::bin_scatter(
            launch,
            self.max_work_group_size,
            points.len(),
            bin_ids.len(),
            offsets.len(),
            cursor.len(),
            sorted.len(),
            source_index.len(),
        )?;

        let timer = DispatchTimer::start();
        let mut destinations: Vec<u32> = alloc_zeroed(points.len(), "scatter destinations")?;
        self.install(|| -> Result<()> {
            destinations
                .par_iter_mut()
                .zip(bin_ids.par_iter())
                .try_for_each(|(destination, &bin)| {
                    *destination = scatter::destination(offsets, cursor, bin)?;
                    Ok::<(), ScanError>(())
                })?;
            scatter::place_points(points, &destinations, sorted, source_index)
        })?;

        Ok(timer.finish(BIN_SCATTER_KERNEL, launch))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_work_group_lockstep() {
        let mut group = WorkGroup::new(3, 4);
        let mut seen = Vec::new();
        group.for_each_item(|lid| seen.push(lid));
        group.barrier();
        group.barrier();

        assert_eq!(seen, vec![0, 1, 2, 3]);
        assert_eq!(group.id(), 3);
        assert_eq!(group.barriers(), 2);
    }

    #[test]
    fn test_rejects_oversized_work_group() {
        let host = HostRuntime::new(4);
        let mut out = vec![0u32; 16];
        let mut sums = vec![0u32; 2];
        let err = host
            .prefix_sum(LaunchDims::new(8, 8), &[1; 16], &mut out, &mut sums)
            .unwrap_err();
        assert!(matches!(err, ScanError::DispatchFailure { .. }));
    }

    #[test]
    fn test_rejects_ragged_global_size() {
        let host = HostRuntime::new(8);
        let mut out = vec![0u32; 16];
        let mut sums = vec![0u32; 2];
        let err = host
            .prefix_sum(LaunchDims::new(6, 4), &[1; 16], &mut out, &mut sums)
            .unwrap_err();
        assert!(matches!(err, ScanError::DispatchFailure { .. }));
    }

    #[test]
    fn test_rejects_short_block_sums() {
        let host = HostRuntime::new(8);
        let mut out = vec![0u32; 16];
        let mut sums = vec![0u32; 1];
        let err = host
            .prefix_sum(LaunchDims::new(8, 4), &[1; 16], &mut out, &mut sums)
            .unwrap_err();
        assert!(matches!(
            err,
            ScanError::ArgumentBinding {
                argument: "block_sums",
                ..
            }
        ));
    }

    #[test]
    fn test_prefix_sum_two_groups() {
        let host = HostRuntime::new(2);
        let input: Vec<u32> = (1..=8).collect();
        let mut out = vec![0u32; 8];
        let mut sums = vec![0u32; 2];
        let record = host
            .prefix_sum(LaunchDims::new(4, 2), &input, &mut out, &mut sums)
            .unwrap();

        assert_eq!(out, vec![0, 1, 3, 6, 0, 5, 11, 18]);
        assert_eq!(sums, vec![10, 26]);
        assert_eq!(record.kernel, PREFIX_SUM_KERNEL);
        assert_eq!(record.global_size, 4);
    }

    #[test]
    fn test_prefix_sum_post_skips_first_block() {
        let host = HostRuntime::new(2);
        let mut data = vec![0, 1, 3, 6, 0, 5, 11, 18];
        host.prefix_sum_post(LaunchDims::new(2, 2), &mut data, &[0, 10])
            .unwrap();
        assert_eq!(data, vec![0, 1, 3, 6, 10, 15, 21, 28]);
    }

    #[test]
    fn test_bin_count_reports_first_outside_point() {
        let host = HostRuntime::new(256);
        let grid = BinGrid::new(8).unwrap();
        let mut points = vec![[0.25f32; 3]; 4096];
        for i in (1000..4096).step_by(3) {
            points[i] = [0.25, 2.0, 0.25];
        }

        for _ in 0..8 {
            let mut ids = vec![0u32; 4096];
            let counts = AtomicCounters::zeroed(grid.bin_count()).unwrap();
            let err = host
                .bin_count(LaunchDims::new(4096, 256), grid, &points, &mut ids, &counts)
                .unwrap_err();
            assert_eq!(
                err,
                ScanError::PointOutsideGrid {
                    index: 1000,
                    point: [0.25, 2.0, 0.25]
                }
            );
        }
    }

    #[test]
    fn test_dedicated_pool() {
        let config = EngineConfig::builder().host_threads(2).build().unwrap();
        let host = HostRuntime::from_config(&config).unwrap();
        let input = vec![1u32; 4];
        let mut out = vec![0u32; 4];
        let mut sums = vec![0u32; 1];
        host.prefix_sum(LaunchDims::new(2, 2), &input, &mut out, &mut sums)
            .unwrap();
        assert_eq!(out, vec![0, 1, 2, 3]);
        assert_eq!(sums[0], 4);
    }
}
