//! Immutable configuration handed to every component at construction.
//!
//! [`Geometry`] fixes the shape of the histogram and of the input grid. [`LaunchConfig`] fixes
//! how a pass is spread over the device: how many partitions, how many lanes per partition,
//! and which increment strategy the lanes use.

use crate::error::{HistogramError, Result};
use crate::histogram::IncrementStrategy;

/// Bits of a bin id selecting the horizontal bin.
pub const HISTO_LOG: u32 = 10;
/// Number of horizontal bins.
pub const HISTO_WIDTH: usize = 1 << HISTO_LOG;
/// Number of vertical bins.
pub const HISTO_HEIGHT: usize = 1;
/// Width of the input grid, padded to a multiple of 128 pixels.
pub const INPUT_WIDTH: usize = (4000 + 128) & !127;
/// Height of the input grid.
pub const INPUT_HEIGHT: usize = 4000;

/// Largest `HISTO_LOG` accepted by [`Geometry::new`].
pub const MAX_HISTO_LOG: u32 = 16;
/// Largest number of bins accepted by [`Geometry::new`] (64MiB of working counters).
pub const MAX_BINS: usize = 1 << 24;

/// Shape of the histogram and of the grid it is computed over.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Geometry {
    histo_log: u32,
    histo_height: usize,
    input_width: usize,
    input_height: usize,
}

impl Geometry {
    /// The geometry the crate is built around.
    pub const DEFAULT: Geometry = Geometry {
        histo_log: HISTO_LOG,
        histo_height: HISTO_HEIGHT,
        input_width: INPUT_WIDTH,
        input_height: INPUT_HEIGHT,
    };

    /// Creates a validated geometry.
    ///
    /// # Errors
    ///
    /// - [`HistogramError::InvalidGeometry`] for empty dimensions, a `histo_log` above
    ///   [`MAX_HISTO_LOG`], or more than [`MAX_BINS`] bins.
    /// - [`HistogramError::InputTooLarge`] if the grid has more pixels than a `u32` counter can
    ///   count, in which case a single bin could overflow before saturation.
    pub fn new(
        histo_log: u32,
        histo_height: usize,
        input_width: usize,
        input_height: usize,
    ) -> Result<Self> {
        if histo_log > MAX_HISTO_LOG {
            return Err(HistogramError::InvalidGeometry(format!(
                "histo_log {histo_log} exceeds {MAX_HISTO_LOG}"
            )));
        }
        if histo_height == 0 || input_width == 0 || input_height == 0 {
            return Err(HistogramError::InvalidGeometry(format!(
                "dimensions must be non-zero (histo_height {histo_height}, input {input_width}x{input_height})"
            )));
        }

        let bins = (1usize << histo_log)
            .checked_mul(histo_height)
            .filter(|&bins| bins <= MAX_BINS)
            .ok_or_else(|| {
                HistogramError::InvalidGeometry(format!(
                    "{} x {histo_height} bins exceeds {MAX_BINS}",
                    1usize << histo_log
                ))
            })?;
        debug_assert!(bins > 0);

        let pixels = (input_width as u64).saturating_mul(input_height as u64);
        if pixels > u32::MAX as u64 {
            return Err(HistogramError::InputTooLarge { pixels });
        }

        Ok(Geometry {
            histo_log,
            histo_height,
            input_width,
            input_height,
        })
    }

    #[inline]
    pub fn histo_log(&self) -> u32 {
        self.histo_log
    }

    #[inline]
    pub fn histo_width(&self) -> usize {
        1 << self.histo_log
    }

    #[inline]
    pub fn histo_height(&self) -> usize {
        self.histo_height
    }

    /// Total number of bins, `HISTO_WIDTH * HISTO_HEIGHT`.
    #[inline]
    pub fn bins(&self) -> usize {
        self.histo_width() * self.histo_height
    }

    #[inline]
    pub fn input_width(&self) -> usize {
        self.input_width
    }

    #[inline]
    pub fn input_height(&self) -> usize {
        self.input_height
    }

    /// Total number of pixels, `INPUT_WIDTH * INPUT_HEIGHT`.
    #[inline]
    pub fn pixels(&self) -> usize {
        self.input_width * self.input_height
    }

    /// Mask selecting the `bottom` field of a bin id.
    #[inline]
    pub fn bottom_mask(&self) -> u32 {
        (1u32 << self.histo_log) - 1
    }
}

impl Default for Geometry {
    fn default() -> Self {
        Geometry::DEFAULT
    }
}

/// Order in which partitions (and the lanes inside them) are handed to the scheduler.
///
/// The result of a pass never depends on this; it exists so tests can perturb the schedule.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum LaunchOrder {
    /// `0, 1, 2, ...`
    #[default]
    Forward,
    /// `n-1, n-2, ..., 0`
    Reverse,
    /// Even indices first, then odd ones.
    Interleaved,
}

impl LaunchOrder {
    /// Returns the indices `0..count` in launch order.
    pub fn sequence(self, count: usize) -> Vec<usize> {
        match self {
            LaunchOrder::Forward => (0..count).collect(),
            LaunchOrder::Reverse => (0..count).rev().collect(),
            LaunchOrder::Interleaved => (0..count)
                .step_by(2)
                .chain((1..count).step_by(2))
                .collect(),
        }
    }
}

/// How a pass is spread over the device.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LaunchConfig {
    /// Number of partitions (work-groups), each with a private bin table.
    pub partitions: usize,
    /// Number of concurrent lanes inside each partition.
    pub workers_per_partition: usize,
    /// Fast storage available to a single partition. A bin table larger than this
    /// makes the pass fall back to [`LaunchConfig::coarse_partitions`].
    pub local_storage_bytes: usize,
    /// Partition count used when the bin table does not fit local storage.
    pub coarse_partitions: usize,
    /// How lanes inside a partition increment their shared table.
    pub strategy: IncrementStrategy,
    /// Order in which partitions and lanes are launched.
    pub order: LaunchOrder,
    /// Device thread count. `None` lets rayon decide.
    pub threads: Option<usize>,
}

impl LaunchConfig {
    pub const DEFAULT: LaunchConfig = LaunchConfig {
        partitions: 64,
        workers_per_partition: 8,
        local_storage_bytes: 48 * 1024,
        coarse_partitions: 4,
        strategy: IncrementStrategy::Atomic,
        order: LaunchOrder::Forward,
        threads: None,
    };

    pub fn with_strategy(mut self, strategy: IncrementStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_order(mut self, order: LaunchOrder) -> Self {
        self.order = order;
        self
    }

    pub fn with_partitions(mut self, partitions: usize, workers_per_partition: usize) -> Self {
        self.partitions = partitions;
        self.workers_per_partition = workers_per_partition;
        self
    }

    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = Some(threads);
        self
    }

    /// Checks that every count is usable.
    pub fn validate(&self) -> Result<()> {
        if self.partitions == 0 || self.coarse_partitions == 0 {
            return Err(HistogramError::InvalidLaunchConfig(format!(
                "partition counts must be non-zero (partitions {}, coarse {})",
                self.partitions, self.coarse_partitions
            )));
        }
        if self.workers_per_partition == 0 {
            return Err(HistogramError::InvalidLaunchConfig(
                "workers_per_partition must be non-zero".into(),
            ));
        }
        if self.threads == Some(0) {
            return Err(HistogramError::InvalidLaunchConfig(
                "threads must be non-zero when set".into(),
            ));
        }
        Ok(())
    }
}

impl Default for LaunchConfig {
    fn default() -> Self {
        LaunchConfig::DEFAULT
    }
}
