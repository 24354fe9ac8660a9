//! Errors raised while configuring a device or running a histogram pass.
//!
//! Every variant is fatal for the pass it was raised in. A pass that fails never leaves a
//! result behind that [`crate::device::Device::extract_result`] would hand out as valid.

/// Errors that can occur while building or running a histogram pass.
#[derive(Debug, thiserror::Error)]
pub enum HistogramError {
    /// Device storage could not be reserved.
    #[error("failed to allocate {elements} elements ({bytes} bytes) of device storage")]
    AllocationFailure { elements: usize, bytes: usize },

    /// A host/device copy did not complete, because source and destination disagree in size.
    #[error("transfer of {what} failed: expected {expected} elements, got {actual}")]
    TransferFailure {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    /// A bin count left the range of the 32-bit working counter before saturation.
    #[error("bin {bin} overflowed its 32-bit counter while merging partition {partition}")]
    OverflowAssumptionViolated { bin: usize, partition: usize },

    /// The input has more pixels than a single 32-bit counter can represent.
    #[error("input of {pixels} pixels may overflow a 32-bit bin counter")]
    InputTooLarge { pixels: u64 },

    /// The bin or input geometry is unusable.
    #[error("invalid geometry: {0}")]
    InvalidGeometry(String),

    /// The partition/worker layout is unusable.
    #[error("invalid launch configuration: {0}")]
    InvalidLaunchConfig(String),

    /// A pixel holds a bin id outside of the histogram.
    #[error("pixel {index} holds bin id {value}, but the histogram only has {bins} bins")]
    InvalidBinId { index: usize, value: u32, bins: usize },

    /// A grid was built from data of the wrong shape.
    #[error("grid shape mismatch: expected {expected} pixels, got {actual}")]
    ShapeMismatch { expected: usize, actual: usize },

    /// A pass was launched before the input was staged.
    #[error("input has not been staged on the device")]
    InputNotStaged,

    /// A result was requested before a pass completed.
    #[error("no completed histogram pass to extract")]
    ResultNotReady,

    /// The device thread pool could not be started.
    #[error("failed to start device thread pool: {0}")]
    DevicePool(#[from] rayon::ThreadPoolBuildError),
}

pub type Result<T> = core::result::Result<T, HistogramError>;
