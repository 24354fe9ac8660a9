//! The global merge stage.
//!
//! Sums every partition's table bin by bin and saturates the result. Bins are independent, so
//! the output is split into disjoint chunks and each chunk is reduced by its own task; no two
//! tasks ever write the same output bin and no locking is needed.

use super::{saturate, PrivateCounterBank};
use crate::error::{HistogramError, Result};
use rayon::prelude::*;

/// Output bins reduced by a single merge task.
pub const MERGE_BINS_PER_TASK: usize = 256;

/// Writes `min(sum of all partitions, 255)` for every bin into `output`.
///
/// The counts are written as 32-bit words, which is how the bin buffer is laid out on the
/// device; narrowing to bytes happens on extraction.
///
/// # Errors
///
/// [`HistogramError::OverflowAssumptionViolated`] if a bin's sum leaves the `u32` range. The
/// contents of `output` are unspecified in that case.
///
/// Must be called from inside the device thread pool, after counting completed.
pub fn merge_saturated(bank: &PrivateCounterBank, output: &mut [u32]) -> Result<()> {
    debug_assert!(bank.tables().iter().all(|table| table.bins() == output.len()));

    output
        .par_chunks_mut(MERGE_BINS_PER_TASK)
        .enumerate()
        .try_for_each(|(chunk, words)| {
            let first_bin = chunk * MERGE_BINS_PER_TASK;
            for (offset, word) in words.iter_mut().enumerate() {
                let bin = first_bin + offset;
                let mut sum = 0u32;
                for (partition, table) in bank.tables().iter().enumerate() {
                    sum = sum.checked_add(table.counter[bin]).ok_or(
                        HistogramError::OverflowAssumptionViolated { bin, partition },
                    )?;
                }
                *word = saturate(sum) as u32;
            }
            Ok(())
        })
}
