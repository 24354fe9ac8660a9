//! Synthetic input for tests and benchmarks.
//!
//! Generates bin ids with a biased random walk, so neighbouring pixels land in neighbouring
//! bins. This is closer to real images than uniform noise, and much harder on a parallel
//! histogram: long runs of the same bin mean heavy contention on a few counters.

use super::{BinId, PixelGrid};
use crate::config::Geometry;
use crate::error::Result;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Maximum step of the `bottom` field.
const SPREAD_BOTTOM: f64 = 2.0;
/// Maximum step of the `top` field.
const SPREAD_TOP: f64 = 6.0;

/// Generates a walk over `geometry`, deterministic for a given `seed`.
///
/// The first pixel sits in the middle of the histogram. Each following pixel in a row steps
/// from its left neighbour, and the first pixel of each row steps from the one above it.
pub fn generate(geometry: Geometry, seed: u64) -> Result<PixelGrid> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let width = geometry.input_width();
    let mut pixels = Vec::with_capacity(geometry.pixels());

    let start = BinId::pack(
        &geometry,
        (geometry.histo_width() / 2) as u32,
        (geometry.histo_height() / 2) as u32,
    );

    for row in 0..geometry.input_height() {
        let first = if row == 0 {
            start
        } else {
            next_bin(&geometry, &mut rng, BinId(pixels[(row - 1) * width]))
        };
        pixels.push(first.0);

        let mut previous = first;
        for _ in 1..width {
            previous = next_bin(&geometry, &mut rng, previous);
            pixels.push(previous.0);
        }
    }

    PixelGrid::from_flat(geometry, pixels)
}

/// Steps both fields of `pixel` by a small, centre-weighted random amount.
fn next_bin<R: Rng>(geometry: &Geometry, rng: &mut R, pixel: BinId) -> BinId {
    let bottom = step(rng, pixel.bottom(geometry), SPREAD_BOTTOM, geometry.histo_width());
    let top = step(rng, pixel.top(geometry), SPREAD_TOP, geometry.histo_height());
    BinId::pack(geometry, bottom, top)
}

fn step<R: Rng>(rng: &mut R, current: u32, spread: f64, limit: usize) -> u32 {
    // Product of two centred uniforms, scaled to +-2*spread. Truncates toward zero.
    let a = rng.gen::<f64>() - 0.5;
    let b = rng.gen::<f64>() - 0.5;
    let delta = (a * b * 8.0 * spread) as i64;
    (current as i64 + delta).clamp(0, limit as i64 - 1) as u32
}
