//! The input model: a grid of pre-computed histogram bin ids, one per pixel.
//!
//! A bin id packs two coordinates. The low `HISTO_LOG` bits (`bottom`) select the horizontal
//! bin, the remaining bits (`top`) select the vertical one:
//!
//! ```text
//! bin id = bottom | (top << HISTO_LOG)
//! ```
//!
//! The grid is stored flattened, row by row, which is also the layout copied to the device.

use crate::config::Geometry;
use crate::error::{HistogramError, Result};

#[cfg(any(test, feature = "bench"))]
pub mod walk;

/// A packed (bottom, top) bin coordinate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BinId(pub u32);

impl BinId {
    /// Packs a horizontal and a vertical bin into one id.
    #[inline]
    pub fn pack(geometry: &Geometry, bottom: u32, top: u32) -> Self {
        BinId((bottom & geometry.bottom_mask()) | (top << geometry.histo_log()))
    }

    #[inline]
    pub fn bottom(self, geometry: &Geometry) -> u32 {
        self.0 & geometry.bottom_mask()
    }

    #[inline]
    pub fn top(self, geometry: &Geometry) -> u32 {
        self.0 >> geometry.histo_log()
    }

    /// Index of this bin in a flat bin table.
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Immutable `INPUT_HEIGHT x INPUT_WIDTH` grid of bin ids.
///
/// Every value is guaranteed to be below `geometry.bins()`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PixelGrid {
    geometry: Geometry,
    pixels: Box<[u32]>,
}

impl PixelGrid {
    /// Builds a grid from a flat, row-major vector of bin ids.
    ///
    /// # Errors
    ///
    /// - [`HistogramError::ShapeMismatch`] if `pixels.len()` is not `geometry.pixels()`.
    /// - [`HistogramError::InvalidBinId`] for the first pixel outside the histogram.
    pub fn from_flat(geometry: Geometry, pixels: Vec<u32>) -> Result<Self> {
        if pixels.len() != geometry.pixels() {
            return Err(HistogramError::ShapeMismatch {
                expected: geometry.pixels(),
                actual: pixels.len(),
            });
        }

        let bins = geometry.bins();
        if let Some((index, &value)) = pixels
            .iter()
            .enumerate()
            .find(|(_, &value)| value as usize >= bins)
        {
            return Err(HistogramError::InvalidBinId { index, value, bins });
        }

        Ok(PixelGrid {
            geometry,
            pixels: pixels.into_boxed_slice(),
        })
    }

    /// Builds a grid from rows, as produced by a 2D allocation on the host.
    pub fn from_rows<R: AsRef<[u32]>>(geometry: Geometry, rows: &[R]) -> Result<Self> {
        if rows.len() != geometry.input_height() {
            return Err(HistogramError::ShapeMismatch {
                expected: geometry.pixels(),
                actual: rows.iter().map(|row| row.as_ref().len()).sum(),
            });
        }

        let mut pixels = Vec::with_capacity(geometry.pixels());
        for row in rows {
            let row = row.as_ref();
            if row.len() != geometry.input_width() {
                return Err(HistogramError::ShapeMismatch {
                    expected: geometry.pixels(),
                    actual: rows.iter().map(|row| row.as_ref().len()).sum(),
                });
            }
            pixels.extend_from_slice(row);
        }

        Self::from_flat(geometry, pixels)
    }

    /// Builds a grid where every pixel maps to the same bin.
    pub fn filled(geometry: Geometry, bin: BinId) -> Result<Self> {
        Self::from_flat(geometry, vec![bin.0; geometry.pixels()])
    }

    #[inline]
    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    /// The flattened, row-major bin ids.
    #[inline]
    pub fn as_flat(&self) -> &[u32] {
        &self.pixels
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.pixels.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.pixels.is_empty()
    }

    /// Iterates over the grid one row at a time.
    pub fn rows(&self) -> impl Iterator<Item = &[u32]> {
        self.pixels.chunks_exact(self.geometry.input_width())
    }

    #[inline]
    pub fn get(&self, row: usize, column: usize) -> Option<BinId> {
        if column >= self.geometry.input_width() {
            return None;
        }
        self.pixels
            .get(row * self.geometry.input_width() + column)
            .map(|&value| BinId(value))
    }
}
