//! Engine configuration.

use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::bucket::grid::{BinGrid, CELL_GRID_RESOLUTION, NEIGHBOR_GRID_RESOLUTION};
use crate::error::{Result, ScanError};

/// Work-group limit reported by the host emulator (CUDA's per-block limit).
pub const DEFAULT_HOST_WORK_GROUP_SIZE: usize = 1024;

/// Search radius of the fixed-radius neighbor queries (normalized units).
pub const DEFAULT_NEIGHBOR_RADIUS: f32 = 0.01;

/// Which compute backend a context dispatches to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// SIMT emulation on the host thread pool.
    #[default]
    Host,
    /// CubeCL CUDA kernels (feature `cuda`).
    Cuda,
}

/// Configuration for a [`ComputeContext`](crate::ComputeContext).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Backend to dispatch kernels to.
    pub backend: BackendKind,

    /// Upper bound on the work-group size used for scans.
    ///
    /// The effective size is the minimum of this value and the device
    /// limit, rounded down to a power of two. `None` uses the device limit.
    pub max_work_group_size: Option<usize>,

    /// Work-group limit the host emulator reports as its capability.
    pub host_work_group_size: usize,

    /// Size of a dedicated host thread pool (`None` = global rayon pool).
    pub host_threads: Option<usize>,

    /// Grid resolution per axis for fixed-radius neighbor search.
    pub neighbor_resolution: u32,

    /// Fixed search radius in normalized coordinates.
    pub neighbor_radius: f32,

    /// Grid resolution per axis for cell statistics.
    pub cell_resolution: u32,

    /// Minimum points in a cell before its covariance is computed.
    pub min_points_per_cell: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Host,
            max_work_group_size: None,
            host_work_group_size: DEFAULT_HOST_WORK_GROUP_SIZE,
            host_threads: None,
            neighbor_resolution: NEIGHBOR_GRID_RESOLUTION,
            neighbor_radius: DEFAULT_NEIGHBOR_RADIUS,
            cell_resolution: CELL_GRID_RESOLUTION,
            min_points_per_cell: 6,
        }
    }
}

impl EngineConfig {
    /// Create a builder with default settings.
    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder::new()
    }

    /// Parse a JSON document; missing fields take their defaults.
    pub fn from_json_str(json: &str) -> anyhow::Result<Self> {
        let config: Self =
            serde_json::from_str(json).context("Failed to parse engine configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Load a JSON configuration file.
    pub fn from_json_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_json_str(&text).with_context(|| format!("Invalid config in {}", path.display()))
    }

    /// Check every field against its domain.
    pub fn validate(&self) -> Result<()> {
        if self.max_work_group_size == Some(0) {
            return Err(ScanError::InvalidConfig(
                "max_work_group_size must be at least 1".into(),
            ));
        }
        if self.host_work_group_size == 0 {
            return Err(ScanError::InvalidConfig(
                "host_work_group_size must be at least 1".into(),
            ));
        }
        if self.host_threads == Some(0) {
            return Err(ScanError::InvalidConfig(
                "host_threads must be at least 1".into(),
            ));
        }
        BinGrid::new(self.neighbor_resolution)?;
        BinGrid::new(self.cell_resolution)?;
        if !(self.neighbor_radius.is_finite() && self.neighbor_radius > 0.0) {
            return Err(ScanError::InvalidConfig(format!(
                "neighbor_radius must be positive, got {}",
                self.neighbor_radius
            )));
        }
        Ok(())
    }
}

/// Builder for [`EngineConfig`].
#[derive(Debug, Clone)]
pub struct EngineConfigBuilder {
    config: EngineConfig,
}

impl EngineConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: EngineConfig::default(),
        }
    }

    pub fn backend(mut self, backend: BackendKind) -> Self {
        self.config.backend = backend;
        self
    }

    /// Cap the work-group size used by scans.
    pub fn max_work_group_size(mut self, size: usize) -> Self {
        self.config.max_work_group_size = Some(size);
        self
    }

    /// Set the work-group limit the host emulator reports.
    pub fn host_work_group_size(mut self, size: usize) -> Self {
        self.config.host_work_group_size = size;
        self
    }

    /// Run host dispatches on a dedicated pool with this many threads.
    pub fn host_threads(mut self, threads: usize) -> Self {
        self.config.host_threads = Some(threads);
        self
    }

    pub fn neighbor_resolution(mut self, resolution: u32) -> Self {
        self.config.neighbor_resolution = resolution;
        self
    }

    pub fn neighbor_radius(mut self, radius: f32) -> Self {
        self.config.neighbor_radius = radius;
        self
    }

    pub fn cell_resolution(mut self, resolution: u32) -> Self {
        self.config.cell_resolution = resolution;
        self
    }

    pub fn min_points_per_cell(mut self, min_points: usize) -> Self {
        self.config.min_points_per_cell = min_points;
        self
    }

    /// Validate and return the configuration.
    pub fn build(self) -> Result<EngineConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

impl Default for EngineConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
