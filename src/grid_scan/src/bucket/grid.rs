//! Uniform 3D bin grid over the unit cube.

use serde::{Deserialize, Serialize};

use crate::error::{Result, ScanError};
use crate::Point;

/// Resolution used for fixed-radius neighbor search.
pub const NEIGHBOR_GRID_RESOLUTION: u32 = 100;

/// Resolution used for per-cell point statistics.
pub const CELL_GRID_RESOLUTION: u32 = 40;

/// Largest resolution whose `D³` bins are addressable with `u32`.
pub const MAX_GRID_RESOLUTION: u32 = 1625;

/// Grid of `D × D × D` bins covering `[0, 1)³`.
///
/// Bin index is `⌊x·D⌋ + D·⌊y·D⌋ + D²·⌊z·D⌋`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BinGrid {
    resolution: u32,
}

impl BinGrid {
    pub fn new(resolution: u32) -> Result<Self> {
        if resolution == 0 || resolution > MAX_GRID_RESOLUTION {
            return Err(ScanError::InvalidConfig(format!(
                "grid resolution must be in 1..={MAX_GRID_RESOLUTION}, got {resolution}"
            )));
        }
        Ok(Self { resolution })
    }

    pub fn resolution(&self) -> u32 {
        self.resolution
    }

    /// Total number of bins, `D³`.
    pub fn bin_count(&self) -> usize {
        (self.resolution as usize).pow(3)
    }

    /// Integer cell coordinates of `point`, or `None` outside `[0, 1)³`.
    #[inline]
    pub fn cell_of(&self, point: &Point) -> Option<[u32; 3]> {
        let d = self.resolution as f32;
        let mut cell = [0u32; 3];
        for (c, &x) in cell.iter_mut().zip(point) {
            // NaN fails both comparisons
            if !(0.0..1.0).contains(&x) {
                return None;
            }
            // x·D can round up to D for x just below 1
            *c = ((x * d) as u32).min(self.resolution - 1);
        }
        Some(cell)
    }

    /// Bin id of `point`, or `None` outside `[0, 1)³`.
    #[inline]
    pub fn bin_of(&self, point: &Point) -> Option<u32> {
        self.cell_of(point).map(|c| self.bin_index(c))
    }

    /// Linear bin id of integer cell coordinates.
    #[inline]
    pub fn bin_index(&self, [x, y, z]: [u32; 3]) -> u32 {
        let d = self.resolution;
        x + d * y + d * d * z
    }

    /// Inverse of [`bin_index`](Self::bin_index).
    #[inline]
    pub fn cell_coords(&self, bin: u32) -> [u32; 3] {
        let d = self.resolution;
        [bin % d, (bin / d) % d, bin / (d * d)]
    }
}
