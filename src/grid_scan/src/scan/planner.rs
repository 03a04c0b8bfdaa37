//! Scan planning: padding, block decomposition and the two-level ceiling.

use serde::Serialize;
use tracing::{trace, warn};

use crate::error::{Result, ScanError};
use crate::runtime::{ComputeContext, LaunchDims};

/// Hierarchy levels a scan may use: block scan plus one scan of block totals.
pub const SCAN_LEVELS: u32 = 2;

/// Largest element count a two-level scan accepts: `B²` for `B = 2·wg`.
pub fn scan_capacity(work_group_size: usize) -> usize {
    (2 * work_group_size).saturating_pow(SCAN_LEVELS)
}

/// Padded element count and block count for a scan of `elements`.
///
/// Multi-block inputs are padded to whole blocks of `2·work_group_size`;
/// single-block inputs to the next power of two.
pub fn ceil_elements_for_scan(elements: usize, work_group_size: usize) -> (usize, usize) {
    if elements == 0 {
        return (0, 0);
    }
    let block_len = 2 * work_group_size;
    let block_count = elements.div_ceil(block_len);
    if block_count > 1 {
        (block_count * block_len, block_count)
    } else {
        (elements.next_power_of_two(), 1)
    }
}

/// Launch geometry of one scan invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ScanPlan {
    /// Logical element count.
    pub elements: usize,
    /// Elements after padding.
    pub padded_count: usize,
    pub block_count: usize,
    /// `B`: elements per full block.
    pub block_len: usize,
    /// Work items per block of the first level.
    pub threads_per_block: usize,
    /// Length of the carry buffer, present only on the two-level path.
    pub carry_len: Option<usize>,
}

impl ScanPlan {
    /// Plan a scan of `elements` with blocks of `2·work_group_size`.
    pub fn new(elements: usize, work_group_size: usize) -> Result<Self> {
        let block_len = 2 * work_group_size;
        let (padded_count, block_count) = ceil_elements_for_scan(elements, work_group_size);

        let plan = if block_count > 1 {
            let carry_len = block_count.next_power_of_two();
            if carry_len > block_len {
                let capacity = scan_capacity(work_group_size);
                warn!(elements, carry_len, block_len, capacity, "Scan exceeds two levels");
                return Err(ScanError::CapacityExceeded {
                    elements,
                    carry_len,
                    block_len,
                    capacity,
                });
            }
            Self {
                elements,
                padded_count,
                block_count,
                block_len,
                threads_per_block: work_group_size,
                carry_len: Some(carry_len),
            }
        } else {
            Self {
                elements,
                padded_count,
                block_count,
                block_len,
                threads_per_block: (padded_count / 2).max(1),
                carry_len: None,
            }
        };

        trace!(?plan, "Scan planned");
        Ok(plan)
    }

    pub fn is_empty(&self) -> bool {
        self.block_count == 0
    }

    pub fn is_two_level(&self) -> bool {
        self.carry_len.is_some()
    }

    /// First level: one work group per block.
    pub fn block_launch(&self) -> LaunchDims {
        LaunchDims::new(
            self.block_count * self.threads_per_block,
            self.threads_per_block,
        )
    }

    /// Second level: one work group over the whole carry buffer.
    pub fn carry_launch(&self) -> Option<LaunchDims> {
        self.carry_len.map(|len| {
            let threads = (len / 2).max(1);
            LaunchDims::new(threads, threads)
        })
    }

    /// Carry propagation: one work group per block after the first.
    pub fn post_launch(&self) -> Option<LaunchDims> {
        self.carry_len.map(|_| {
            LaunchDims::new(
                (self.padded_count - self.block_len) / 2,
                self.threads_per_block,
            )
        })
    }
}

impl ComputeContext {
    /// Padded element count and block count for this context's block size.
    pub fn ceil_elements_for_scan(&self, elements: usize) -> (usize, usize) {
        ceil_elements_for_scan(elements, self.work_group_size())
    }

    /// Full plan for a scan of `elements`, or `CapacityExceeded`.
    pub fn plan_scan(&self, elements: usize) -> Result<ScanPlan> {
        ScanPlan::new(elements, self.work_group_size())
    }

    /// Largest scan this context accepts.
    pub fn scan_capacity(&self) -> usize {
        scan_capacity(self.work_group_size())
    }
}
