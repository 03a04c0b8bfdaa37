//! Error taxonomy for the scan and bucketing pipelines.
//!
//! Every failure aborts the whole count → scan → scatter pipeline. Nothing is
//! retried and no partial result is returned.

use thiserror::Error;

/// Errors raised by scan planning, kernel dispatch and bucketing.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ScanError {
    /// A device or host buffer could not be created.
    #[error("failed to allocate {bytes} bytes for {buffer}")]
    AllocationFailure { buffer: &'static str, bytes: usize },

    /// A kernel could not be built; diagnostics are passed through unchanged.
    #[error("kernel `{kernel}` failed to build: {diagnostics}")]
    KernelCompileFailure {
        kernel: &'static str,
        diagnostics: String,
    },

    /// A buffer or scalar bound to a kernel does not match the launch.
    #[error("kernel `{kernel}` argument `{argument}`: {reason}")]
    ArgumentBinding {
        kernel: &'static str,
        argument: &'static str,
        reason: String,
    },

    /// The dataset needs more than two scan levels.
    #[error(
        "scan of {elements} elements needs {carry_len} carry slots, \
         but one block holds {block_len} (capacity {capacity} elements)"
    )]
    CapacityExceeded {
        elements: usize,
        carry_len: usize,
        block_len: usize,
        capacity: usize,
    },

    /// The device rejected a dispatch, or a dispatch broke its output contract.
    #[error("dispatch of `{kernel}` failed: {reason}")]
    DispatchFailure { kernel: &'static str, reason: String },

    /// A point's normalized coordinates fall outside `[0, 1)`.
    #[error("point {index} at {point:?} lies outside the unit grid")]
    PointOutsideGrid { index: usize, point: [f32; 3] },

    /// Engine configuration rejected at build time.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result alias used across the crate.
pub type Result<T, E = ScanError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capacity_message_names_limits() {
        let err = ScanError::CapacityExceeded {
            elements: 70,
            carry_len: 16,
            block_len: 8,
            capacity: 64,
        };
        let msg = err.to_string();
        assert!(msg.contains("70 elements"));
        assert!(msg.contains("capacity 64"));
    }

    #[test]
    fn test_compile_diagnostics_verbatim() {
        let err = ScanError::KernelCompileFailure {
            kernel: "prefix_sum",
            diagnostics: "line 3: unknown intrinsic".into(),
        };
        assert_eq!(
            err.to_string(),
            "kernel `prefix_sum` failed to build: line 3: unknown intrinsic"
        );
    }
}
