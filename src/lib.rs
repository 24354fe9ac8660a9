#![doc = include_str!("../README.MD")]

#[cfg(feature = "c-exports")]
pub mod exports;

pub mod config;
pub mod device;
pub mod error;
pub mod grid;
pub mod histogram;

pub use config::{Geometry, LaunchConfig, LaunchOrder};
pub use device::{BinBuffer, Device, InputBuffer, PassState};
pub use error::{HistogramError, Result};
pub use grid::{BinId, PixelGrid};
pub use histogram::{histogram_reference, IncrementStrategy, SaturatedHistogram};
