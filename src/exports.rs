//! C entry points.
//!
//! These mirror the host steps of a pass one to one: allocate, copy input and clear bins, run,
//! transfer bins back, free. Every object crosses the boundary as an opaque pointer created
//! here and must be handed back to the matching `free` function.

use crate::config::{Geometry, LaunchConfig};
use crate::device::{BinBuffer, Device, InputBuffer};
use crate::grid::PixelGrid;
use core::ptr;
use std::slice;

/// Starts a device with the given geometry and the default launch configuration.
///
/// # Returns
///
/// A device handle, or null if the geometry is invalid or the device failed to start.
/// Free it with [histo2d_device_free].
#[no_mangle]
pub extern "C" fn histo2d_device_new(
    histo_log: u32,
    histo_height: usize,
    input_width: usize,
    input_height: usize,
) -> *mut Device {
    Geometry::new(histo_log, histo_height, input_width, input_height)
        .and_then(|geometry| Device::new(geometry, LaunchConfig::DEFAULT))
        .map(|device| Box::into_raw(Box::new(device)))
        .unwrap_or(ptr::null_mut())
}

/// Stops a device created by [histo2d_device_new].
///
/// # Safety
///
/// `device` must come from [histo2d_device_new] and not have been freed. Null is ignored.
#[no_mangle]
pub unsafe extern "C" fn histo2d_device_free(device: *mut Device) {
    if !device.is_null() {
        drop(Box::from_raw(device));
    }
}

/// Reserves device storage for one input grid.
///
/// # Safety
///
/// `device` must be a live device handle.
#[no_mangle]
pub unsafe extern "C" fn histo2d_allocate_input_on_device(device: *const Device) -> *mut InputBuffer {
    match (*device).allocate_input_buffer() {
        Ok(input) => Box::into_raw(Box::new(input)),
        Err(_) => ptr::null_mut(),
    }
}

/// Reserves device storage for one zeroed bin table.
///
/// # Safety
///
/// `device` must be a live device handle.
#[no_mangle]
pub unsafe extern "C" fn histo2d_allocate_bins_on_device(device: *const Device) -> *mut BinBuffer {
    match (*device).allocate_bin_buffer() {
        Ok(bins) => Box::into_raw(Box::new(bins)),
        Err(_) => ptr::null_mut(),
    }
}

/// Copies a grid given as `input_height` row pointers of `input_width` bin ids each, and
/// clears the bins.
///
/// # Returns
///
/// `false` if the grid holds an invalid bin id or a buffer does not belong to `device`.
///
/// # Safety
///
/// All handles must be live and belong to `device`. `rows` must point to `input_height`
/// valid row pointers, each pointing to `input_width` readable `u32`s.
#[no_mangle]
pub unsafe extern "C" fn histo2d_copy_input_and_initialize_bins(
    device: *const Device,
    rows: *const *const u32,
    input: *mut InputBuffer,
    bins: *mut BinBuffer,
) -> bool {
    let device = &*device;
    let geometry = *device.geometry();
    let rows: Vec<&[u32]> = slice::from_raw_parts(rows, geometry.input_height())
        .iter()
        .map(|&row| slice::from_raw_parts(row, geometry.input_width()))
        .collect();

    PixelGrid::from_rows(geometry, &rows)
        .and_then(|grid| device.stage_input_and_clear_bins(&grid, &mut *input, &mut *bins))
        .is_ok()
}

/// Runs one histogram pass and waits for it to finish.
///
/// # Safety
///
/// All handles must be live and belong to `device`.
#[no_mangle]
pub unsafe extern "C" fn histo2d_run(
    device: *const Device,
    input: *const InputBuffer,
    bins: *mut BinBuffer,
) -> bool {
    (*device).run_histogram_pass(&*input, &mut *bins).is_ok()
}

/// Copies the saturated histogram into `output`, one byte per bin.
///
/// # Returns
///
/// `false` if no pass has completed on `bins`.
///
/// # Safety
///
/// All handles must be live and belong to `device`. `output` must point to
/// `HISTO_WIDTH * HISTO_HEIGHT` writable bytes.
#[no_mangle]
pub unsafe extern "C" fn histo2d_transfer_bins(
    device: *const Device,
    output: *mut u8,
    bins: *const BinBuffer,
) -> bool {
    match (*device).extract_result(&*bins) {
        Ok(histogram) => {
            let output = slice::from_raw_parts_mut(output, histogram.bins());
            output.copy_from_slice(histogram.as_bytes());
            true
        }
        Err(_) => false,
    }
}

/// Frees both buffers.
///
/// # Safety
///
/// Both handles must come from the allocation functions above and not have been freed.
#[no_mangle]
pub unsafe extern "C" fn histo2d_free_device_memory(
    device: *const Device,
    input: *mut InputBuffer,
    bins: *mut BinBuffer,
) {
    (*device).release(*Box::from_raw(input), *Box::from_raw(bins));
}
