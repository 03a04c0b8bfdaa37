//! Two-level parallel prefix sum and counting-sort spatial bucketing.
//!
//! This library provides a work-efficient exclusive scan bounded to two
//! hierarchy levels, and reuses it to group 3D points into a uniform grid
//! for fixed-radius neighbor search and per-cell statistics.
//!
//! # Architecture
//!
//! Every operation runs against an explicit [`ComputeContext`]:
//! - Scan: block scan → scan of block totals → carry propagation
//! - Bucket sort: bin counting → scan of counts → atomic-cursor scatter
//! - Consumers: cell statistics (D=40), radius queries (D=100)
//!
//! Kernels run on a host SIMT emulator by default, or on CUDA through CubeCL
//! with the `cuda` feature.
//!
//! # Usage
//!
//! ```ignore
//! use grid_scan::{ComputeContext, EngineConfig};
//!
//! let ctx = ComputeContext::from_config(EngineConfig::default())?;
//!
//! let scanned = ctx.scan(&[1, 1, 1, 1], 4)?;
//! assert_eq!(scanned.values, vec![0, 1, 2, 3]);
//!
//! let points: Vec<[f32; 3]> = load_normalized_cloud();
//! let sorted = ctx.bucket_sort(&points, 100)?;
//! for bin in 0..sorted.grid.bin_count() {
//!     let cell = sorted.bin_points(bin);
//! }
//! ```

pub mod bucket;
pub mod config;
pub mod error;
pub mod runtime;
pub mod scan;
pub mod test_utils;
pub mod timing;

/// A point in normalized `[0, 1)³` coordinates.
pub type Point = [f32; 3];

pub use bucket::{
    compute_cell_statistics, nearest_neighbors, neighborhood_centroids, BinGrid,
    BucketSortResult, CellStatistics, FrnnResult,
};
pub use config::{BackendKind, EngineConfig, EngineConfigBuilder};
pub use error::{Result, ScanError};
pub use scan::{
    ceil_elements_for_scan, exclusive_scan_cpu, inclusive_scan_cpu, ScanOutput, ScanPlan,
};
pub use timing::{DispatchRecord, PipelineTiming};

// Compute runtime
pub use runtime::{AtomicCounters, ComputeBackend, ComputeContext, HostRuntime, LaunchDims};
#[cfg(feature = "cuda")]
pub use runtime::{is_cuda_available, CudaBackend};
