#![allow(dead_code)]

use histo2d::{Geometry, PixelGrid};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

pub fn seeded_rng(seed: u64) -> ChaCha8Rng {
    ChaCha8Rng::seed_from_u64(seed)
}

/// Uniformly distributed bin ids.
pub fn uniform_grid(geometry: Geometry, seed: u64) -> PixelGrid {
    let mut rng = seeded_rng(seed);
    let bins = geometry.bins() as u32;
    let pixels = (0..geometry.pixels())
        .map(|_| rng.gen_range(0..bins))
        .collect();
    PixelGrid::from_flat(geometry, pixels).unwrap()
}

/// Long runs of a few hot bins, so many lanes contend on the same counters.
pub fn clustered_grid(geometry: Geometry, seed: u64) -> PixelGrid {
    let mut rng = seeded_rng(seed);
    let hot: Vec<u32> = (0..4)
        .map(|_| rng.gen_range(0..geometry.bins() as u32))
        .collect();

    let mut pixels = Vec::with_capacity(geometry.pixels());
    while pixels.len() < geometry.pixels() {
        let bin = hot[rng.gen_range(0..hot.len())];
        let run = rng.gen_range(1..=600).min(geometry.pixels() - pixels.len());
        pixels.extend(std::iter::repeat(bin).take(run));
    }
    PixelGrid::from_flat(geometry, pixels).unwrap()
}
