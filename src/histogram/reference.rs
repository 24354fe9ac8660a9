//! Sequential reference implementation, and comparison against it.
//!
//! Nothing here is fast. It exists so every parallel pass has a trusted answer to be compared
//! with, bin for bin.

use super::{BinTable, SaturatedHistogram, SATURATION_LIMIT};
use crate::grid::PixelGrid;

/// Generic, slower version of the histogram that doesn't assume anything.
/// This is the reference implementation to run other tests against.
///
/// Visits pixels strictly in row-major order and increments a bin only while it is below
/// `255`, so no count ever leaves the output range.
pub fn histogram_reference(grid: &PixelGrid) -> SaturatedHistogram {
    let mut counter = vec![0u8; grid.geometry().bins()];

    for row in grid.rows() {
        for &bin in row {
            let count = &mut counter[bin as usize];
            if (*count as u32) < SATURATION_LIMIT {
                *count += 1;
            }
        }
    }

    SaturatedHistogram {
        inner: super::Histogram {
            counter: counter.into_boxed_slice(),
        },
    }
}

/// Exact, unsaturated tally of `grid`.
pub fn exact_counts(grid: &PixelGrid) -> BinTable {
    let mut table = BinTable::zeroed(grid.geometry().bins());
    for &bin in grid.as_flat() {
        table.counter[bin as usize] += 1;
    }
    table
}

/// A bin where the compared histograms disagree.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Mismatch {
    pub bin: usize,
    pub expected: u8,
    pub actual: u8,
}

/// Outcome of comparing a histogram against the reference.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Comparison {
    /// Every disagreeing bin, in bin order.
    pub mismatches: Vec<Mismatch>,
    /// Set if the two histograms do not even have the same number of bins.
    pub length_mismatch: Option<(usize, usize)>,
}

impl Comparison {
    #[inline]
    pub fn passed(&self) -> bool {
        self.mismatches.is_empty() && self.length_mismatch.is_none()
    }
}

/// Compares `actual` against `expected`, recording every mismatching bin rather than stopping
/// at the first.
pub fn compare(expected: &SaturatedHistogram, actual: &SaturatedHistogram) -> Comparison {
    let length_mismatch =
        (expected.bins() != actual.bins()).then_some((expected.bins(), actual.bins()));

    let mismatches = expected
        .as_bytes()
        .iter()
        .zip(actual.as_bytes())
        .enumerate()
        .filter(|(_, (expected, actual))| expected != actual)
        .map(|(bin, (&expected, &actual))| Mismatch {
            bin,
            expected,
            actual,
        })
        .collect();

    Comparison {
        mismatches,
        length_mismatch,
    }
}
