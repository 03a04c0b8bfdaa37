//! Compute runtime: the explicit context every pipeline runs against.
//!
//! A [`ComputeContext`] owns one [`ComputeBackend`] and the work-group size
//! derived from the backend's capabilities and the [`EngineConfig`]. There is
//! no global device state; every operation takes the context by reference.
//!
//! Backends expose one blocking dispatch method per kernel. Each call runs the
//! kernel to completion and returns a [`DispatchRecord`]; the dispatch
//! boundary is the only ordering guarantee between work groups.
//!
//! # Example
//!
//! ```ignore
//! use grid_scan::ComputeContext;
//!
//! let ctx = ComputeContext::new()?;
//! let scanned = ctx.scan(&[3, 1, 4, 1, 5], 5)?;
//! assert_eq!(scanned.values, vec![0, 3, 4, 8, 9]);
//! ```

pub mod counters;
#[cfg(feature = "cuda")]
pub mod cuda;
pub mod host;
pub(crate) mod validate;

pub use counters::AtomicCounters;
#[cfg(feature = "cuda")]
pub use cuda::{is_cuda_available, CudaBackend};
pub use host::{HostRuntime, WorkGroup};

use serde::Serialize;
use tracing::debug;

use crate::bucket::grid::BinGrid;
use crate::config::{BackendKind, EngineConfig};
use crate::error::{Result, ScanError};
use crate::timing::DispatchRecord;
use crate::Point;

/// Work-group size for flat one-item-per-element kernels.
pub const FLAT_WORK_GROUP_SIZE: usize = 256;

/// Global and local dimensions of a one-dimensional dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LaunchDims {
    /// Total work items.
    pub global: usize,
    /// Work items per work group.
    pub local: usize,
}

impl LaunchDims {
    pub fn new(global: usize, local: usize) -> Self {
        Self { global, local }
    }

    /// One work item per element, rounded up to whole work groups.
    pub fn flat(items: usize, local: usize) -> Self {
        let local = local.max(1);
        Self {
            global: items.div_ceil(local) * local,
            local,
        }
    }

    /// Number of work groups.
    pub fn groups(&self) -> usize {
        if self.local == 0 {
            0
        } else {
            self.global / self.local
        }
    }
}

/// Device limits relevant to scan planning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DeviceCapabilities {
    /// Maximum work items in one work group.
    pub max_work_group_size: usize,
}

/// Kernel dispatch primitive of a device.
///
/// Every method blocks until the dispatch has completed on all work groups.
pub trait ComputeBackend: Send + Sync {
    /// Short backend identifier for logs.
    fn name(&self) -> &'static str;

    /// Limits the orchestrators plan against; backends may report fixed values.
    fn capabilities(&self) -> DeviceCapabilities;

    /// Block-local exclusive scan.
    ///
    /// Work group `g` scans `input[2·g·local .. 2·(g+1)·local]` into the same
    /// range of `output` and writes the range total to `block_sums[g]`.
    fn prefix_sum(
        &self,
        launch: LaunchDims,
        input: &[u32],
        output: &mut [u32],
        block_sums: &mut [u32],
    ) -> Result<DispatchRecord>;

    /// Carry propagation.
    ///
    /// Work group `g` adds `carries[g + 1]` to every element of block `g + 1`
    /// of `data`; block 0 carries zero and is not launched.
    fn prefix_sum_post(
        &self,
        launch: LaunchDims,
        data: &mut [u32],
        carries: &[u32],
    ) -> Result<DispatchRecord>;

    /// Binning pass: one work item per point.
    fn bin_count(
        &self,
        launch: LaunchDims,
        grid: BinGrid,
        points: &[Point],
        bin_ids: &mut [u32],
        counts: &AtomicCounters,
    ) -> Result<DispatchRecord>;

    /// Scatter pass: one work item per point.
    #[allow(clippy::too_many_arguments)]
    fn bin_scatter(
        &self,
        launch: LaunchDims,
        points: &[Point],
        bin_ids: &[u32],
        offsets: &[u32],
        cursor: &AtomicCounters,
        sorted: &mut [Point],
        source_index: &mut [u32],
    ) -> Result<DispatchRecord>;
}

/// Explicit context passed to every core operation.
pub struct ComputeContext {
    backend: Box<dyn ComputeBackend>,
    config: EngineConfig,
    work_group_size: usize,
}

impl ComputeContext {
    /// Host-emulated context with default configuration.
    pub fn new() -> Result<Self> {
        Self::from_config(EngineConfig::default())
    }

    /// Create the backend named by `config` and wrap it.
    pub fn from_config(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let backend: Box<dyn ComputeBackend> = match config.backend {
            BackendKind::Host => Box::new(HostRuntime::from_config(&config)?),
            BackendKind::Cuda => cuda_backend()?,
        };
        Self::with_backend(backend, config)
    }

    /// Wrap an existing backend.
    pub fn with_backend(backend: Box<dyn ComputeBackend>, config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let device_limit = backend.capabilities().max_work_group_size;
        if device_limit == 0 {
            return Err(ScanError::InvalidConfig(format!(
                "backend `{}` reports a zero work-group limit",
                backend.name()
            )));
        }
        let requested = config
            .max_work_group_size
            .map_or(device_limit, |cap| cap.min(device_limit));
        let work_group_size = prev_power_of_two(requested);

        debug!(
            backend = backend.name(),
            device_limit, work_group_size, "Compute context ready"
        );

        Ok(Self {
            backend,
            config,
            work_group_size,
        })
    }

    pub fn backend(&self) -> &dyn ComputeBackend {
        self.backend.as_ref()
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    pub fn capabilities(&self) -> DeviceCapabilities {
        self.backend.capabilities()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Work items per work group used by scans (a power of two).
    pub fn work_group_size(&self) -> usize {
        self.work_group_size
    }

    /// Elements covered by one scan block (two per work item).
    pub fn block_len(&self) -> usize {
        2 * self.work_group_size
    }
}

#[cfg(feature = "cuda")]
fn cuda_backend() -> Result<Box<dyn ComputeBackend>> {
    Ok(Box::new(CudaBackend::new()?))
}

#[cfg(not(feature = "cuda"))]
fn cuda_backend() -> Result<Box<dyn ComputeBackend>> {
    Err(ScanError::InvalidConfig(
        "cuda backend requested but grid_scan was built without the `cuda` feature".into(),
    ))
}

/// Largest power of two not above `n` (`n >= 1`).
pub(crate) fn prev_power_of_two(n: usize) -> usize {
    debug_assert!(n > 0);
    1 << (usize::BITS - 1 - n.leading_zeros())
}

/// Allocate a zero-filled buffer, reporting failure instead of aborting.
pub(crate) fn alloc_zeroed<T: Clone + Default>(len: usize, buffer: &'static str) -> Result<Vec<T>> {
    let mut data = Vec::new();
    data.try_reserve_exact(len)
        .map_err(|_| ScanError::AllocationFailure {
            buffer,
            bytes: len.saturating_mul(std::mem::size_of::<T>()),
        })?;
    data.resize(len, T::default());
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_launch_dims_flat() {
        let launch = LaunchDims::flat(1000, 256);
        assert_eq!(launch.global, 1024);
        assert_eq!(launch.groups(), 4);

        let empty = LaunchDims::flat(0, 256);
        assert_eq!(empty.global, 0);
        assert_eq!(empty.groups(), 0);
    }

    #[test]
    fn test_prev_power_of_two() {
        assert_eq!(prev_power_of_two(1), 1);
        assert_eq!(prev_power_of_two(2), 2);
        assert_eq!(prev_power_of_two(1000), 512);
        assert_eq!(prev_power_of_two(1024), 1024);
    }

    #[test]
    fn test_alloc_zeroed() {
        let buf: Vec<u32> = alloc_zeroed(16, "test").unwrap();
        assert_eq!(buf, vec![0; 16]);
    }

    #[test]
    fn test_alloc_failure_reported() {
        let result: Result<Vec<u64>> = alloc_zeroed(usize::MAX / 4, "huge");
        assert!(matches!(
            result,
            Err(ScanError::AllocationFailure { buffer: "huge", .. })
        ));
    }

    #[test]
    fn test_context_defaults() {
        let ctx = ComputeContext::new().unwrap();
        assert_eq!(ctx.backend_name(), "host");
        assert_eq!(ctx.work_group_size(), 1024);
        assert_eq!(ctx.block_len(), 2048);
    }

    #[test]
    fn test_context_caps_work_group_size() {
        let config = EngineConfig::builder()
            .max_work_group_size(100)
            .build()
            .unwrap();
        let ctx = ComputeContext::from_config(config).unwrap();
        assert_eq!(ctx.work_group_size(), 64);
        assert_eq!(ctx.capabilities().max_work_group_size, 1024);
    }

    #[test]
    fn test_context_rounds_device_limit_down() {
        let config = EngineConfig::builder()
            .host_work_group_size(48)
            .build()
            .unwrap();
        let ctx = ComputeContext::from_config(config).unwrap();
        assert_eq!(ctx.work_group_size(), 32);
    }

    #[cfg(not(feature = "cuda"))]
    #[test]
    fn test_cuda_backend_unavailable_without_feature() {
        let config = EngineConfig::builder()
            .backend(BackendKind::Cuda)
            .build()
            .unwrap();
        assert!(matches!(
            ComputeContext::from_config(config),
            Err(ScanError::InvalidConfig(_))
        ));
    }
}
