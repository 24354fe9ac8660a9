//! This module contains the implementation of the saturating 2D histogram.
//!
//! A histogram is simply a counter of how many times an individual bin id has appeared in a
//! grid. For example, given the bin ids `[0, 1, 2, 0, 1]`, the histogram would be
//! `[2, 2, 1, 0, ...]`.
//!
//! Counting is done in 32-bit [`BinTable`]s. The externally visible result is a
//! [`SaturatedHistogram`], where every count is clamped to `255` rather than wrapping.
//!
//! The parallel pass is split in two stages:
//!
//! - [`bank`]: every partition of the input counts into its own private table.
//! - [`merge`]: once every partition is done, the tables are summed bin by bin and saturated.
//!
//! [`reference`] is the sequential oracle the parallel pass is checked against.

use core::ops::{Deref, DerefMut};

pub mod bank;
pub mod merge;
pub mod reference;
pub mod strategy;

pub use bank::*;
pub use merge::*;
pub use reference::*;
pub use strategy::*;

/// Largest count representable in the output.
pub const SATURATION_LIMIT: u32 = u8::MAX as u32;

/// Clamps a count to the output width.
#[inline(always)]
pub fn saturate(count: u32) -> u8 {
    count.min(SATURATION_LIMIT) as u8
}

/// The implementation of a generic histogram, storing the count for each bin using type `T`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Histogram<T> {
    pub counter: Box<[T]>,
}

/// Working table of exact counts, one `u32` per bin.
///
/// Max safe input size is 4,294,967,295 pixels, which [`crate::config::Geometry`] enforces.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct BinTable {
    pub inner: Histogram<u32>,
}

impl Deref for BinTable {
    type Target = Histogram<u32>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl DerefMut for BinTable {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.inner
    }
}

impl BinTable {
    /// Creates a zero'd table with `bins` entries.
    pub fn zeroed(bins: usize) -> Self {
        Self::from_counts(vec![0; bins])
    }

    pub fn from_counts(counts: Vec<u32>) -> Self {
        BinTable {
            inner: Histogram {
                counter: counts.into_boxed_slice(),
            },
        }
    }

    #[inline]
    pub fn bins(&self) -> usize {
        self.counter.len()
    }

    /// Sum of all counts. Equals the number of pixels counted.
    pub fn total(&self) -> u64 {
        self.counter.iter().map(|&count| count as u64).sum()
    }

    /// Clamps every count to `255`.
    pub fn saturate(&self) -> SaturatedHistogram {
        SaturatedHistogram::from_counts(&self.counter)
    }
}

/// The result of a pass: one byte per bin, each `min(count, 255)`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SaturatedHistogram {
    pub inner: Histogram<u8>,
}

impl Deref for SaturatedHistogram {
    type Target = Histogram<u8>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl SaturatedHistogram {
    /// Narrows wide counts to bytes, saturating anything above `255`.
    pub fn from_counts(counts: &[u32]) -> Self {
        SaturatedHistogram {
            inner: Histogram {
                counter: counts.iter().map(|&count| saturate(count)).collect(),
            },
        }
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.counter
    }

    #[inline]
    pub fn bins(&self) -> usize {
        self.counter.len()
    }

    #[inline]
    pub fn get(&self, bin: usize) -> Option<u8> {
        self.counter.get(bin).copied()
    }
}
