//! CubeCL CUDA backend.
//!
//! Every dispatch uploads its arguments, launches one kernel, waits for the
//! device and reads the results back, so each call is a full dispatch
//! boundary like the host emulator's.
//!
//! # Example
//!
//! ```ignore
//! use grid_scan::runtime::CudaBackend;
//! use grid_scan::{ComputeContext, EngineConfig};
//!
//! let ctx = ComputeContext::with_backend(Box::new(CudaBackend::new()?), EngineConfig::default())?;
//! let result = ctx.bucket_sort(&points, 100)?;
//! ```

use std::panic::{catch_unwind, AssertUnwindSafe};

use cubecl::client::ComputeClient;
use cubecl::cuda::{CudaDevice, CudaRuntime};
use cubecl::prelude::*;
use tracing::debug;

use super::{validate, AtomicCounters, ComputeBackend, DeviceCapabilities, LaunchDims};
use crate::bucket::grid::BinGrid;
use crate::bucket::kernels::{bin_count_kernel, bin_scatter_kernel};
use crate::bucket::{binner, scatter, BIN_COUNT_KERNEL, BIN_SCATTER_KERNEL};
use crate::error::{Result, ScanError};
use crate::scan::kernels::{prefix_sum_kernel, prefix_sum_post_kernel};
use crate::scan::{PREFIX_SUM_KERNEL, PREFIX_SUM_POST_KERNEL};
use crate::timing::{DispatchRecord, DispatchTimer};
use crate::Point;

/// Type alias for CUDA compute client
type CudaClient = ComputeClient<<CudaRuntime as Runtime>::Server>;

/// Work-group limit reported for every CUDA device.
///
/// A fixed assumption rather than a device query: 1024 threads per block
/// holds on every NVIDIA architecture CubeCL targets.
pub const CUDA_MAX_WORK_GROUP_SIZE: usize = 1024;

/// Compute backend dispatching CubeCL kernels to a CUDA device.
pub struct CudaBackend {
    /// CUDA device (kept alive for backend lifetime)
    #[allow(dead_code)]
    device: CudaDevice,
    client: CudaClient,
}

impl CudaBackend {
    /// Open the default CUDA device.
    pub fn new() -> Result<Self> {
        Self::with_device_id(0)
    }

    /// Open a specific CUDA device.
    pub fn with_device_id(device_id: usize) -> Result<Self> {
        let device = catch_unwind(|| CudaDevice::new(device_id)).map_err(|_| {
            ScanError::InvalidConfig(format!("CUDA device {device_id} is not available"))
        })?;
        let client = CudaRuntime::client(&device);
        debug!(device_id, "CUDA backend ready");
        Ok(Self { device, client })
    }

    /// Run a launch closure, surfacing compiler panics as build failures.
    fn launch(&self, kernel: &'static str, launch: impl FnOnce()) -> Result<()> {
        catch_unwind(AssertUnwindSafe(launch)).map_err(|payload| {
            let diagnostics = payload
                .downcast_ref::<String>()
                .cloned()
                .or_else(|| payload.downcast_ref::<&str>().map(|s| s.to_string()))
                .unwrap_or_else(|| "unknown compiler error".to_string());
            ScanError::KernelCompileFailure {
                kernel,
                diagnostics,
            }
        })?;
        cubecl::future::block_on(self.client.sync());
        Ok(())
    }

    fn read_u32(&self, handle: &cubecl::server::Handle, out: &mut [u32]) {
        let bytes = self.client.read_one(handle.clone());
        out.copy_from_slice(&u32::from_bytes(&bytes)[..out.len()]);
    }
}

fn cube_dims(launch: LaunchDims) -> (CubeCount, CubeDim) {
    (
        CubeCount::Static(launch.groups() as u32, 1, 1),
        CubeDim::new(launch.local as u32, 1, 1),
    )
}

impl ComputeBackend for CudaBackend {
    fn name(&self) -> &'static str {
        "cuda"
    }

    /// Reports [`CUDA_MAX_WORK_GROUP_SIZE`]; the device is not queried.
    fn capabilities(&self) -> DeviceCapabilities {
        DeviceCapabilities {
            max_work_group_size: CUDA_MAX_WORK_GROUP_SIZE,
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
            CUDA_MAX_WORK_GROUP_SIZE,
            input.len(),
            output.len(),
            block_sums.len(),
        )?;

        let len = output.len();
        let groups = launch.groups();
        let block_len = 2 * launch.local as u32;
        let timer = DispatchTimer::start();

        let input_gpu = self.client.create(u32::as_bytes(&input[..len]));
        let output_gpu = self.client.empty(len * std::mem::size_of::<u32>());
        let sums_gpu = self.client.empty(groups * std::mem::size_of::<u32>());

        let (count, dim) = cube_dims(launch);
        self.launch(PREFIX_SUM_KERNEL, || unsafe {
            prefix_sum_kernel::launch_unchecked::<CudaRuntime>(
                &self.client,
                count,
                dim,
                ArrayArg::from_raw_parts::<u32>(&input_gpu, len, 1),
                ArrayArg::from_raw_parts::<u32>(&output_gpu, len, 1),
                ArrayArg::from_raw_parts::<u32>(&sums_gpu, groups, 1),
                ScalarArg::new(len as u32),
                block_len,
                block_len.trailing_zeros(),
            );
        })?;

        self.read_u32(&output_gpu, output);
        self.read_u32(&sums_gpu, &mut block_sums[..groups]);
        Ok(timer.finish(PREFIX_SUM_KERNEL, launch))
    }

    fn prefix_sum_post(
        &self,
        launch: LaunchDims,
        data: &mut [u32],
        carries: &[u32],
    ) -> Result<DispatchRecord> {
        validate::prefix_sum_post(launch, CUDA_MAX_WORK_GROUP_SIZE, data.len(), carries.len())?;

        let timer = DispatchTimer::start();
        let data_gpu = self.client.create(u32::as_bytes(data));
        let carries_gpu = self.client.create(u32::as_bytes(carries));

        let (count, dim) = cube_dims(launch);
        self.launch(PREFIX_SUM_POST_KERNEL, || unsafe {
            prefix_sum_post_kernel::launch_unchecked::<CudaRuntime>(
                &self.client,
                count,
                dim,
                ArrayArg::from_raw_parts::<u32>(&data_gpu, data.len(), 1),
                ArrayArg::from_raw_parts::<u32>(&carries_gpu, carries.len(), 1),
                2 * launch.local as u32,
            );
        })?;

        self.read_u32(&data_gpu, data);
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
            CUDA_MAX_WORK_GROUP_SIZE,
            grid,
            points.len(),
            bin_ids.len(),
            counts.len(),
        )?;

        // Out-of-range points would index past the counters on the device
        binner::check_inside(grid, points)?;

        let n = points.len();
        let timer = DispatchTimer::start();
        let points_gpu = self.client.create(f32::as_bytes(points.as_flattened()));
        let ids_gpu = self.client.empty(n * std::mem::size_of::<u32>());
        let initial = counts.to_vec();
        let counts_gpu = self.client.create(u32::as_bytes(&initial));

        let (count, dim) = cube_dims(launch);
        self.launch(BIN_COUNT_KERNEL, || unsafe {
            bin_count_kernel::launch_unchecked::<CudaRuntime>(
                &self.client,
                count,
                dim,
                ArrayArg::from_raw_parts::<f32>(&points_gpu, n * 3, 1),
                ScalarArg::new(n as u32),
                ScalarArg::new(grid.resolution()),
                ArrayArg::from_raw_parts::<u32>(&ids_gpu, n, 1),
                ArrayArg::from_raw_parts::<Atomic<u32>>(&counts_gpu, initial.len(), 1),
            );
        })?;

        self.read_u32(&ids_gpu, bin_ids);
        let mut final_counts = initial;
        self.read_u32(&counts_gpu, &mut final_counts);
        counts.store_all(&final_counts);
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
            CUDA_MAX_WORK_GROUP_SIZE,
            points.len(),
            bin_ids.len(),
            offsets.len(),
            cursor.len(),
            sorted.len(),
            source_index.len(),
        )?;

        let n = points.len();
        let timer = DispatchTimer::start();
        let points_gpu = self.client.create(f32::as_bytes(points.as_flattened()));
        let ids_gpu = self.client.create(u32::as_bytes(bin_ids));
        let offsets_gpu = self.client.create(u32::as_bytes(offsets));
        let initial = cursor.to_vec();
        let cursor_gpu = self.client.create(u32::as_bytes(&initial));
        let sorted_gpu = self.client.empty(n * 3 * std::mem::size_of::<f32>());
        let source_gpu = self.client.empty(n * std::mem::size_of::<u32>());

        let (count, dim) = cube_dims(launch);
        self.launch(BIN_SCATTER_KERNEL, || unsafe {
            bin_scatter_kernel::launch_unchecked::<CudaRuntime>(
                &self.client,
                count,
                dim,
                ArrayArg::from_raw_parts::<f32>(&points_gpu, n * 3, 1),
                ArrayArg::from_raw_parts::<u32>(&ids_gpu, n, 1),
                ArrayArg::from_raw_parts::<u32>(&offsets_gpu, offsets.len(), 1),
                ScalarArg::new(n as u32),
                ArrayArg::from_raw_parts::<Atomic<u32>>(&cursor_gpu, initial.len(), 1),
                ArrayArg::from_raw_parts::<f32>(&sorted_gpu, n * 3, 1),
                ArrayArg::from_raw_parts::<u32>(&source_gpu, n, 1),
            );
        })?;

        self.read_u32(&source_gpu, source_index);
        scatter::check_permutation(source_index)?;

        let sorted_bytes = self.client.read_one(sorted_gpu);
        let coords = f32::from_bytes(&sorted_bytes);
        for (dst, c) in sorted.iter_mut().zip(coords.chunks_exact(3)) {
            *dst = [c[0], c[1], c[2]];
        }

        let mut final_cursor = initial;
        self.read_u32(&cursor_gpu, &mut final_cursor);
        cursor.store_all(&final_cursor);
        Ok(timer.finish(BIN_SCATTER_KERNEL, launch))
    }
}

/// Check if CUDA is available on this system.
pub fn is_cuda_available() -> bool {
    // Try to create a device - if it fails, CUDA is not available
    catch_unwind(|| {
        let _device = CudaDevice::new(0);
    })
    .is_ok()
}
