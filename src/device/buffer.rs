//! Device-resident storage.
//!
//! Buffers are plain 32-bit words owned by a [`RawAlloc`]. They are freed when the handle is
//! dropped, so storage is released on every exit path, including errors and panics.

use crate::config::Geometry;
use crate::error::{HistogramError, Result};
use core::alloc::Layout;
use core::cell::Cell;
use core::mem::size_of;
use core::slice;
use safe_allocator_api::RawAlloc;

/// A zero-initialized array of `u32` words.
pub(crate) struct DeviceWords {
    alloc: RawAlloc,
    len: usize,
}

impl DeviceWords {
    /// Reserves `len` zeroed words.
    pub(crate) fn zeroed(len: usize) -> Result<Self> {
        let failure = || HistogramError::AllocationFailure {
            elements: len,
            bytes: len.saturating_mul(size_of::<u32>()),
        };

        if len == 0 {
            return Err(failure());
        }

        let layout = Layout::array::<u32>(len).map_err(|_| failure())?;
        let alloc = RawAlloc::new_zeroed(layout).map_err(|_| failure())?;
        Ok(DeviceWords { alloc, len })
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub(crate) fn as_slice(&self) -> &[u32] {
        // SAFETY: The allocation holds `len` zero-initialized `u32`s with `u32` alignment, and
        // any bit pattern is a valid `u32`.
        unsafe { slice::from_raw_parts(self.alloc.as_ptr() as *const u32, self.len) }
    }

    #[inline]
    pub(crate) fn as_mut_slice(&mut self) -> &mut [u32] {
        // SAFETY: As above; `&mut self` guarantees exclusive access.
        unsafe { slice::from_raw_parts_mut(self.alloc.as_mut_ptr() as *mut u32, self.len) }
    }
}

/// Device storage for one flattened [`crate::grid::PixelGrid`].
pub struct InputBuffer {
    pub(crate) words: DeviceWords,
    /// Geometry of the grid currently copied in. Every staged bin id is below its `bins()`.
    pub(crate) staged: Option<Geometry>,
}

impl InputBuffer {
    /// Number of pixels the buffer holds.
    #[inline]
    pub fn len(&self) -> usize {
        self.words.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.words.len() == 0
    }

    /// Whether a grid has been copied in.
    #[inline]
    pub fn is_staged(&self) -> bool {
        self.staged.is_some()
    }

    /// Geometry of the staged grid, if any.
    #[inline]
    pub fn staged_geometry(&self) -> Option<&Geometry> {
        self.staged.as_ref()
    }
}

/// Where a [`BinBuffer`] is in its pass.
///
/// `Uninitialized -> Staged -> Counting -> Barrier -> Merging -> Saturated -> Extracted`.
/// A failed pass drops back to `Uninitialized`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PassState {
    Uninitialized,
    Staged,
    Counting,
    Barrier,
    Merging,
    Saturated,
    Extracted,
}

impl PassState {
    /// Whether the buffer holds a complete, saturated histogram.
    #[inline]
    pub fn has_result(self) -> bool {
        matches!(self, PassState::Saturated | PassState::Extracted)
    }
}

/// Device storage for one working bin table.
///
/// After a pass completes every word holds a count already clamped to `255`.
pub struct BinBuffer {
    pub(crate) words: DeviceWords,
    pub(crate) state: Cell<PassState>,
}

impl BinBuffer {
    /// Number of bins the buffer holds.
    #[inline]
    pub fn len(&self) -> usize {
        self.words.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.words.len() == 0
    }

    #[inline]
    pub fn state(&self) -> PassState {
        self.state.get()
    }

    #[inline]
    pub(crate) fn set_state(&self, state: PassState) {
        log::trace!("bin buffer: {:?} -> {:?}", self.state.get(), state);
        self.state.set(state);
    }
}
