//! Host-side orchestration of a histogram pass.
//!
//! A [`Device`] stands in for the accelerator: a dedicated thread pool plus the configuration
//! every pass runs with. The host drives it through the same steps a GPU would need:
//!
//! 1. [`Device::allocate_input_buffer`] / [`Device::allocate_bin_buffer`]
//! 2. [`Device::stage_input_and_clear_bins`]
//! 3. [`Device::run_histogram_pass`], as many times as needed
//! 4. [`Device::extract_result`]
//! 5. [`Device::release`] (or simply dropping the buffers)
//!
//! [`Device::histogram`] runs all of the above for a single grid.

use crate::config::{Geometry, LaunchConfig};
use crate::error::{HistogramError, Result};
use crate::grid::PixelGrid;
use crate::histogram::{merge_saturated, PartitionPlan, PrivateCounterBank, SaturatedHistogram};
use log::debug;

pub mod buffer;
pub use buffer::{BinBuffer, InputBuffer, PassState};
use buffer::DeviceWords;

/// The parallel histogram engine.
pub struct Device {
    geometry: Geometry,
    launch: LaunchConfig,
    plan: PartitionPlan,
    pool: rayon::ThreadPool,
}

impl Device {
    /// Starts a device for `geometry`.
    ///
    /// # Errors
    ///
    /// - [`HistogramError::InvalidLaunchConfig`] if `launch` fails validation.
    /// - [`HistogramError::DevicePool`] if the thread pool cannot be started.
    pub fn new(geometry: Geometry, launch: LaunchConfig) -> Result<Self> {
        launch.validate()?;

        let mut builder =
            rayon::ThreadPoolBuilder::new().thread_name(|index| format!("histo2d-device-{index}"));
        if let Some(threads) = launch.threads {
            builder = builder.num_threads(threads);
        }
        let pool = builder.build()?;

        let plan = PartitionPlan::new(&geometry, &launch, geometry.pixels());
        debug!(
            "device ready: {} bins, {}x{} input, {} partitions ({:?}) x {} lanes, {:?}, {} threads",
            geometry.bins(),
            geometry.input_width(),
            geometry.input_height(),
            plan.partitions(),
            plan.granularity(),
            launch.workers_per_partition,
            launch.strategy,
            pool.current_num_threads()
        );

        Ok(Device {
            geometry,
            launch,
            plan,
            pool,
        })
    }

    /// Starts a device with the default geometry and launch configuration.
    pub fn with_defaults() -> Result<Self> {
        Self::new(Geometry::DEFAULT, LaunchConfig::DEFAULT)
    }

    #[inline]
    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    #[inline]
    pub fn launch(&self) -> &LaunchConfig {
        &self.launch
    }

    #[inline]
    pub fn plan(&self) -> &PartitionPlan {
        &self.plan
    }

    /// Reserves storage for one full grid, `INPUT_HEIGHT * INPUT_WIDTH` bin ids.
    pub fn allocate_input_buffer(&self) -> Result<InputBuffer> {
        Ok(InputBuffer {
            words: DeviceWords::zeroed(self.geometry.pixels())?,
            staged: None,
        })
    }

    /// Reserves storage for one bin table, `HISTO_WIDTH * HISTO_HEIGHT` zeroed counters.
    pub fn allocate_bin_buffer(&self) -> Result<BinBuffer> {
        Ok(BinBuffer {
            words: DeviceWords::zeroed(self.geometry.bins())?,
            state: core::cell::Cell::new(PassState::Uninitialized),
        })
    }

    /// Copies `grid` to the device and zeroes the bins.
    ///
    /// # Errors
    ///
    /// - [`HistogramError::InvalidGeometry`] if `grid` was built for another geometry.
    /// - [`HistogramError::TransferFailure`] if a buffer does not match this device.
    ///
    /// On error neither buffer is considered staged.
    pub fn stage_input_and_clear_bins(
        &self,
        grid: &PixelGrid,
        input: &mut InputBuffer,
        bins: &mut BinBuffer,
    ) -> Result<()> {
        input.staged = None;
        bins.set_state(PassState::Uninitialized);

        if grid.geometry() != &self.geometry {
            return Err(HistogramError::InvalidGeometry(format!(
                "grid geometry {:?} does not match device geometry {:?}",
                grid.geometry(),
                self.geometry
            )));
        }
        self.check_input(input)?;
        self.check_bins(bins)?;

        input.words.as_mut_slice().copy_from_slice(grid.as_flat());
        bins.words.as_mut_slice().fill(0);

        input.staged = Some(self.geometry);
        bins.set_state(PassState::Staged);
        debug!("staged {} pixels, cleared {} bins", input.len(), bins.len());
        Ok(())
    }

    /// Runs one full pass: counting, barrier, merging. Blocks until the result is in `bins`.
    ///
    /// Every pass starts from fresh private tables and overwrites every bin, so repeated
    /// passes over the same input produce the same result.
    ///
    /// # Errors
    ///
    /// - [`HistogramError::InputNotStaged`] if no grid has been staged in `input`.
    /// - [`HistogramError::InvalidGeometry`] if `input` was staged by a device with another
    ///   geometry.
    /// - [`HistogramError::TransferFailure`] if a buffer does not match this device.
    /// - [`HistogramError::OverflowAssumptionViolated`] if a bin overflows while merging.
    ///
    /// On error `bins` drops back to [`PassState::Uninitialized`] and holds no result.
    pub fn run_histogram_pass(&self, input: &InputBuffer, bins: &mut BinBuffer) -> Result<()> {
        self.check_staged(input)?;
        self.check_bins(bins)?;

        let pixels = input.words.as_slice();
        let bin_count = bins.len();

        bins.set_state(PassState::Counting);
        let bank = self.pool.install(|| {
            PrivateCounterBank::count(&self.plan, pixels, bin_count, &self.launch)
        });
        bins.set_state(PassState::Barrier);
        debug_assert_eq!(bank.total(), pixels.len() as u64);

        self.merge_into(&bank, bins)?;
        debug!(
            "pass complete: {} pixels over {} partitions",
            pixels.len(),
            bank.len()
        );
        Ok(())
    }

    /// Copies the saturated histogram back to the host, one byte per bin.
    ///
    /// Extraction does not modify the buffer; extracting twice yields identical histograms.
    ///
    /// # Errors
    ///
    /// [`HistogramError::ResultNotReady`] if no pass completed since the bins were cleared.
    pub fn extract_result(&self, bins: &BinBuffer) -> Result<SaturatedHistogram> {
        if !bins.state().has_result() {
            return Err(HistogramError::ResultNotReady);
        }
        self.check_bins(bins)?;

        let histogram = SaturatedHistogram::from_counts(bins.words.as_slice());
        bins.set_state(PassState::Extracted);
        Ok(histogram)
    }

    /// Frees both buffers.
    pub fn release(&self, input: InputBuffer, bins: BinBuffer) {
        debug!(
            "releasing {} input words and {} bin words",
            input.len(),
            bins.len()
        );
        drop(input);
        drop(bins);
    }

    /// Runs the whole lifecycle for one grid: allocate, stage, run, extract, release.
    pub fn histogram(&self, grid: &PixelGrid) -> Result<SaturatedHistogram> {
        let mut input = self.allocate_input_buffer()?;
        let mut bins = self.allocate_bin_buffer()?;

        self.stage_input_and_clear_bins(grid, &mut input, &mut bins)?;
        self.run_histogram_pass(&input, &mut bins)?;
        let histogram = self.extract_result(&bins)?;

        self.release(input, bins);
        Ok(histogram)
    }

    /// Merges `bank` into `bins`. A failed merge leaves no result behind.
    fn merge_into(&self, bank: &PrivateCounterBank, bins: &mut BinBuffer) -> Result<()> {
        bins.set_state(PassState::Merging);
        let output = bins.words.as_mut_slice();
        let merged = self.pool.install(|| merge_saturated(bank, output));
        if let Err(error) = merged {
            bins.set_state(PassState::Uninitialized);
            return Err(error);
        }

        bins.set_state(PassState::Saturated);
        Ok(())
    }

    /// Bin ids in `input` are only in range for the geometry they were staged with.
    fn check_staged(&self, input: &InputBuffer) -> Result<()> {
        match input.staged_geometry() {
            None => return Err(HistogramError::InputNotStaged),
            Some(staged) if staged != &self.geometry => {
                return Err(HistogramError::InvalidGeometry(format!(
                    "input was staged for geometry {staged:?}, device geometry is {:?}",
                    self.geometry
                )))
            }
            Some(_) => {}
        }
        self.check_input(input)
    }

    fn check_input(&self, input: &InputBuffer) -> Result<()> {
        if input.len() != self.geometry.pixels() {
            return Err(HistogramError::TransferFailure {
                what: "input",
                expected: self.geometry.pixels(),
                actual: input.len(),
            });
        }
        Ok(())
    }

    fn check_bins(&self, bins: &BinBuffer) -> Result<()> {
        if bins.len() != self.geometry.bins() {
            return Err(HistogramError::TransferFailure {
                what: "bins",
                expected: self.geometry.bins(),
                actual: bins.len(),
            });
        }
        Ok(())
    }
}
