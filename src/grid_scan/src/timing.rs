//! Per-dispatch result records and pipeline timing.
//!
//! Every dispatch returns a [`DispatchRecord`] synchronously; orchestrators
//! compose them into a [`PipelineTiming`]. Wall-clock measurement is only
//! taken when the `profiling` feature is enabled; otherwise elapsed times are
//! reported as zero and the timer compiles to a no-op.

use serde::Serialize;
#[cfg(feature = "profiling")]
use std::time::Instant;

use crate::runtime::LaunchDims;

/// Outcome of one completed dispatch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DispatchRecord {
    /// Kernel name.
    pub kernel: &'static str,
    /// Total work items launched.
    pub global_size: usize,
    /// Work items per work group.
    pub local_size: usize,
    /// Elapsed time of the dispatch (0 without `profiling`).
    pub elapsed_ms: f64,
}

impl DispatchRecord {
    pub fn new(kernel: &'static str, launch: LaunchDims, elapsed_ms: f64) -> Self {
        Self {
            kernel,
            global_size: launch.global,
            local_size: launch.local,
            elapsed_ms,
        }
    }
}

/// Ordered dispatch records of one pipeline invocation.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PipelineTiming {
    pub stages: Vec<DispatchRecord>,
    pub total_ms: f64,
}

impl PipelineTiming {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a finished stage.
    pub fn record(&mut self, record: DispatchRecord) {
        self.total_ms += record.elapsed_ms;
        self.stages.push(record);
    }

    /// Number of dispatches issued.
    pub fn dispatch_count(&self) -> usize {
        self.stages.len()
    }

    /// Names of the kernels in dispatch order.
    pub fn kernels(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.kernel).collect()
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Wall clock of one dispatch, started before its buffers are bound.
#[cfg(feature = "profiling")]
pub struct DispatchTimer(Instant);

#[cfg(feature = "profiling")]
impl DispatchTimer {
    #[inline]
    pub fn start() -> Self {
        Self(Instant::now())
    }

    /// Stop the clock and record the dispatch.
    #[inline]
    pub fn finish(self, kernel: &'static str, launch: LaunchDims) -> DispatchRecord {
        let elapsed_ms = self.0.elapsed().as_secs_f64() * 1000.0;
        DispatchRecord::new(kernel, launch, elapsed_ms)
    }
}

/// Dispatch timer without `profiling`; records report zero.
#[cfg(not(feature = "profiling"))]
pub struct DispatchTimer;

#[cfg(not(feature = "profiling"))]
impl DispatchTimer {
    #[inline(always)]
    pub fn start() -> Self {
        Self
    }

    #[inline(always)]
    pub fn finish(self, kernel: &'static str, launch: LaunchDims) -> DispatchRecord {
        DispatchRecord::new(kernel, launch, 0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_timing_accumulates() {
        let mut timing = PipelineTiming::new();
        timing.record(DispatchRecord::new(
            "prefix_sum",
            LaunchDims::new(8, 4),
            1.5,
        ));
        timing.record(DispatchRecord::new(
            "prefix_sum_post",
            LaunchDims::new(4, 4),
            0.5,
        ));

        assert_eq!(timing.dispatch_count(), 2);
        assert_eq!(timing.kernels(), vec!["prefix_sum", "prefix_sum_post"]);
        assert_eq!(timing.total_ms, 2.0);
    }

    #[test]
    fn test_pipeline_timing_json() {
        let mut timing = PipelineTiming::new();
        timing.record(DispatchRecord::new("bin_count", LaunchDims::new(256, 256), 0.0));

        let json = timing.to_json().unwrap();
        assert!(json.contains("\"kernel\":\"bin_count\""));
        assert!(json.contains("\"global_size\":256"));
    }

    #[test]
    fn test_dispatch_timer_records_launch() {
        let record = DispatchTimer::start().finish("prefix_sum", LaunchDims::new(16, 8));
        assert_eq!(record.kernel, "prefix_sum");
        assert_eq!(record.global_size, 16);
        assert_eq!(record.local_size, 8);
        #[cfg(not(feature = "profiling"))]
        assert_eq!(record.elapsed_ms, 0.0);
        #[cfg(feature = "profiling")]
        assert!(record.elapsed_ms >= 0.0);
    }
}
