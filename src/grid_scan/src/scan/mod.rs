//! Two-level parallel exclusive prefix sum.
//!
//! The scan runs as up to three dependent dispatches:
//!
//! 1. `prefix_sum` over every block, writing block-local exclusive sums and
//!    each block's total into the carry buffer.
//! 2. `prefix_sum` once more over the carry buffer (two-level path only).
//! 3. `prefix_sum_post`, adding each block's scanned carry to its elements.
//!
//! A single-block input stops after stage 1. Inputs needing a third level are
//! rejected by the planner with [`ScanError::CapacityExceeded`].

pub mod block;
pub mod carry;
#[cfg(feature = "cuda")]
pub(crate) mod kernels;
pub mod planner;

pub use block::{exclusive_scan_cpu, inclusive_scan_cpu};
pub use planner::{ceil_elements_for_scan, scan_capacity, ScanPlan, SCAN_LEVELS};

use serde::Serialize;
use tracing::debug;

use crate::error::{Result, ScanError};
use crate::runtime::{alloc_zeroed, ComputeBackend, ComputeContext};
use crate::timing::PipelineTiming;

/// Block scan kernel.
pub const PREFIX_SUM_KERNEL: &str = "prefix_sum";
/// Carry propagation kernel.
pub const PREFIX_SUM_POST_KERNEL: &str = "prefix_sum_post";

/// Result of [`ComputeContext::scan`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScanOutput {
    /// Exclusive prefix sums, one per input element.
    pub values: Vec<u32>,
    /// Sum of all input elements.
    pub total: u32,
    pub plan: ScanPlan,
    pub timing: PipelineTiming,
}

impl ComputeContext {
    /// Exclusive prefix sum of the first `element_count` values of `input`.
    pub fn scan(&self, input: &[u32], element_count: usize) -> Result<ScanOutput> {
        if element_count > input.len() {
            return Err(ScanError::ArgumentBinding {
                kernel: PREFIX_SUM_KERNEL,
                argument: "input",
                reason: format!(
                    "element count {element_count} exceeds buffer of {}",
                    input.len()
                ),
            });
        }

        let plan = self.plan_scan(element_count)?;
        let mut timing = PipelineTiming::new();
        if plan.is_empty() {
            return Ok(ScanOutput {
                values: Vec::new(),
                total: 0,
                plan,
                timing,
            });
        }

        let mut padded: Vec<u32> = alloc_zeroed(plan.padded_count, "scan input")?;
        padded[..element_count].copy_from_slice(&input[..element_count]);
        let mut values: Vec<u32> = alloc_zeroed(plan.padded_count, "scan output")?;

        let total = run_scan(self.backend(), &plan, &padded, &mut values, &mut timing)?;
        values.truncate(element_count);

        debug!(
            elements = element_count,
            blocks = plan.block_count,
            two_level = plan.is_two_level(),
            dispatches = timing.dispatch_count(),
            "Scan complete"
        );

        Ok(ScanOutput {
            values,
            total,
            plan,
            timing,
        })
    }
}

/// Scan a padded buffer according to `plan`; returns the grand total.
///
/// `input` and `output` hold exactly `plan.padded_count` elements.
pub(crate) fn run_scan(
    backend: &dyn ComputeBackend,
    plan: &ScanPlan,
    input: &[u32],
    output: &mut [u32],
    timing: &mut PipelineTiming,
) -> Result<u32> {
    match (plan.carry_len, plan.carry_launch(), plan.post_launch()) {
        (Some(carry_len), Some(carry_launch), Some(post_launch)) => {
            let mut carries: Vec<u32> = alloc_zeroed(carry_len, "carry buffer")?;
            timing.record(backend.prefix_sum(
                plan.block_launch(),
                input,
                output,
                &mut carries[..plan.block_count],
            )?);

            let mut scanned: Vec<u32> = alloc_zeroed(carry_len, "scanned carries")?;
            let mut grand_total = [0u32; 1];
            timing.record(backend.prefix_sum(
                carry_launch,
                &carries,
                &mut scanned,
                &mut grand_total,
            )?);

            timing.record(backend.prefix_sum_post(post_launch, output, &scanned)?);
            Ok(grand_total[0])
        }
        _ => {
            let mut block_total = [0u32; 1];
            timing.record(backend.prefix_sum(
                plan.block_launch(),
                input,
                output,
                &mut block_total,
            )?);
            Ok(block_total[0])
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn context_with_work_group(size: usize) -> ComputeContext {
        let config = EngineConfig::builder()
            .max_work_group_size(size)
            .build()
            .unwrap();
        ComputeContext::from_config(config).unwrap()
    }

    #[test]
    fn test_scan_ten_ones() {
        let ctx = ComputeContext::new().unwrap();
        let out = ctx.scan(&[1; 10], 10).unwrap();

        assert_eq!(out.values, (0..10).collect::<Vec<u32>>());
        assert_eq!(out.total, 10);
        assert_eq!(out.plan.padded_count, 16);
        assert_eq!(out.timing.dispatch_count(), 1);
    }

    #[test]
    fn test_scan_single_element() {
        let ctx = ComputeContext::new().unwrap();
        let out = ctx.scan(&[7], 1).unwrap();
        assert_eq!(out.values, vec![0]);
        assert_eq!(out.total, 7);
    }

    #[test]
    fn test_scan_empty() {
        let ctx = ComputeContext::new().unwrap();
        let out = ctx.scan(&[], 0).unwrap();
        assert!(out.values.is_empty());
        assert_eq!(out.total, 0);
        assert_eq!(out.timing.dispatch_count(), 0);
    }

    #[test]
    fn test_scan_ignores_trailing_elements() {
        let ctx = ComputeContext::new().unwrap();
        let out = ctx.scan(&[1, 2, 3, 100, 100], 3).unwrap();
        assert_eq!(out.values, vec![0, 1, 3]);
        assert_eq!(out.total, 6);
    }

    #[test]
    fn test_scan_rejects_short_buffer() {
        let ctx = ComputeContext::new().unwrap();
        assert!(matches!(
            ctx.scan(&[1, 2], 3),
            Err(ScanError::ArgumentBinding {
                argument: "input",
                ..
            })
        ));
    }

    #[test]
    fn test_two_level_matches_reference() {
        let ctx = context_with_work_group(4);
        let mut rng = StdRng::seed_from_u64(42);

        for n in [9, 17, 31, 40, 63, 64] {
            let input: Vec<u32> = (0..n).map(|_| rng.gen_range(0..1000)).collect();
            let out = ctx.scan(&input, n).unwrap();
            assert_eq!(out.values, exclusive_scan_cpu(&input), "n = {n}");
            assert_eq!(out.total, input.iter().sum::<u32>());
            assert!(out.plan.is_two_level());
            assert_eq!(
                out.timing.kernels(),
                vec![PREFIX_SUM_KERNEL, PREFIX_SUM_KERNEL, PREFIX_SUM_POST_KERNEL]
            );
        }
    }

    #[test]
    fn test_large_scan_default_context() {
        let ctx = ComputeContext::new().unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        let n = 100_000;
        let input: Vec<u32> = (0..n).map(|_| rng.gen_range(0..16)).collect();

        let out = ctx.scan(&input, n).unwrap();
        assert_eq!(out.values, exclusive_scan_cpu(&input));
        assert_eq!(out.plan.block_count, n.div_ceil(2048));
    }

    #[test]
    fn test_scan_is_pure() {
        let ctx = context_with_work_group(8);
        let input: Vec<u32> = (0..200).map(|i| (i * 31) % 17).collect();
        let first = ctx.scan(&input, input.len()).unwrap();
        let second = ctx.scan(&input, input.len()).unwrap();
        assert_eq!(first.values, second.values);
        assert_eq!(first.total, second.total);
    }

    #[test]
    fn test_scan_capacity_exceeded() {
        let ctx = context_with_work_group(4);
        let input = vec![1u32; 65];
        assert!(ctx.scan(&input, 64).is_ok());
        assert!(matches!(
            ctx.scan(&input, 65),
            Err(ScanError::CapacityExceeded { capacity: 64, .. })
        ));
    }
}
