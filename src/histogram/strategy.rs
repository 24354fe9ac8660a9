//! Concurrency-safe increments into a partition's bin table.
//!
//! All lanes of one partition share a single table, so every increment has to be
//! linearizable: `N` concurrent increments of one bin must leave it exactly `N` higher.
//! A plain read-modify-write loses updates here. The strategies below are interchangeable
//! and produce identical tables for identical input.

use super::BinTable;
use crate::config::LaunchOrder;
use core::sync::atomic::{AtomicU32, Ordering};
use crossbeam_channel::TryRecvError;
use rayon::slice::ParallelSliceMut;

/// Bin ids a lane buffers before handing them to the partition owner.
pub const SERIALIZED_BATCH: usize = 1024;

/// How lanes of a partition increment their shared table.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum IncrementStrategy {
    /// Hardware fetch-and-add on every increment.
    #[default]
    Atomic,
    /// Lanes send bin ids to a designated owner, the only writer of the table.
    Serialized,
    /// The partition's bin ids are sorted first, then each run is added in one go.
    SortRunLength,
}

impl IncrementStrategy {
    pub const ALL: [IncrementStrategy; 3] = [
        IncrementStrategy::Atomic,
        IncrementStrategy::Serialized,
        IncrementStrategy::SortRunLength,
    ];
}

/// A bin table that can be incremented through a shared reference.
pub struct AtomicBinTable {
    counter: Box<[AtomicU32]>,
}

impl AtomicBinTable {
    pub fn zeroed(bins: usize) -> Self {
        AtomicBinTable {
            counter: (0..bins).map(|_| AtomicU32::new(0)).collect(),
        }
    }

    /// Adds one to `bin`. Linearizable with every other increment of this table.
    #[inline(always)]
    pub fn increment(&self, bin: usize) {
        // Only the sum matters; the barrier that ends counting provides the ordering.
        self.counter[bin].fetch_add(1, Ordering::Relaxed);
    }

    /// Consumes the table once no lane can write to it anymore.
    pub fn into_table(self) -> BinTable {
        BinTable::from_counts(
            Vec::from(self.counter)
                .into_iter()
                .map(AtomicU32::into_inner)
                .collect(),
        )
    }
}

/// Counts `slice` into a fresh table of `bins` entries using `lanes` concurrent lanes.
///
/// Lane `w` handles indices `w, w + lanes, w + 2 * lanes, ...` of the slice. Returns after every
/// lane finished, so the returned table is complete.
///
/// Must be called from inside the device thread pool.
pub fn count_partition(
    strategy: IncrementStrategy,
    slice: &[u32],
    bins: usize,
    lanes: usize,
    order: LaunchOrder,
) -> BinTable {
    let lanes = lanes.clamp(1, slice.len().max(1));
    match strategy {
        IncrementStrategy::Atomic => count_atomic(slice, bins, lanes, order),
        IncrementStrategy::Serialized => count_serialized(slice, bins, lanes, order),
        IncrementStrategy::SortRunLength => count_sorted_runs(slice, bins),
    }
}

#[inline(always)]
fn lane_bins(slice: &[u32], lane: usize, lanes: usize) -> impl Iterator<Item = &u32> {
    slice.iter().skip(lane).step_by(lanes)
}

fn count_atomic(slice: &[u32], bins: usize, lanes: usize, order: LaunchOrder) -> BinTable {
    let table = AtomicBinTable::zeroed(bins);

    rayon::scope(|scope| {
        for lane in order.sequence(lanes) {
            let table = &table;
            scope.spawn(move |_| {
                for &bin in lane_bins(slice, lane, lanes) {
                    table.increment(bin as usize);
                }
            });
        }
    });

    table.into_table()
}

fn count_serialized(slice: &[u32], bins: usize, lanes: usize, order: LaunchOrder) -> BinTable {
    let mut table = BinTable::zeroed(bins);
    let (sender, receiver) = crossbeam_channel::unbounded::<Vec<u32>>();

    {
        let counter = &mut table.counter;
        rayon::scope(move |scope| {
            for lane in order.sequence(lanes) {
                let sender = sender.clone();
                scope.spawn(move |_| {
                    let mut batch = Vec::with_capacity(SERIALIZED_BATCH);
                    for &bin in lane_bins(slice, lane, lanes) {
                        batch.push(bin);
                        if batch.len() == SERIALIZED_BATCH {
                            let full = core::mem::replace(
                                &mut batch,
                                Vec::with_capacity(SERIALIZED_BATCH),
                            );
                            if sender.send(full).is_err() {
                                return;
                            }
                        }
                    }
                    if !batch.is_empty() {
                        let _ = sender.send(batch);
                    }
                });
            }

            // The owner holds no sender, so the channel disconnects once every lane is done.
            drop(sender);

            loop {
                match receiver.try_recv() {
                    Ok(batch) => {
                        for bin in batch {
                            counter[bin as usize] += 1;
                        }
                    }
                    Err(TryRecvError::Empty) => {
                        // Lanes were pushed onto this thread's local queue, so running local
                        // work first keeps a single-threaded device moving. Only the local
                        // queue is consulted: stealing could start another partition's owner
                        // loop on this stack. Nesting stays bounded by the depth of the
                        // partition split.
                        if !matches!(rayon::yield_local(), Some(rayon::Yield::Executed)) {
                            std::thread::yield_now();
                        }
                    }
                    Err(TryRecvError::Disconnected) => break,
                }
            }
        });
    }

    table
}

fn count_sorted_runs(slice: &[u32], bins: usize) -> BinTable {
    let mut table = BinTable::zeroed(bins);
    let mut sorted = slice.to_vec();
    sorted.par_sort_unstable();

    let mut rest = sorted.as_slice();
    while let Some(&bin) = rest.first() {
        let run = rest.iter().take_while(|&&other| other == bin).count();
        table.counter[bin as usize] += run as u32;
        rest = &rest[run..];
    }

    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::sync::Arc;

    fn pool(threads: usize) -> rayon::ThreadPool {
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build()
            .unwrap()
    }

    fn reference(slice: &[u32], bins: usize) -> BinTable {
        let mut table = BinTable::zeroed(bins);
        for &bin in slice {
            table.counter[bin as usize] += 1;
        }
        table
    }

    #[test]
    fn no_lost_updates_under_contention() {
        // Every thread hammers the same bin.
        let table = Arc::new(AtomicBinTable::zeroed(4));
        let threads: Vec<_> = (0..8)
            .map(|_| {
                let table = Arc::clone(&table);
                std::thread::spawn(move || {
                    for _ in 0..10_000 {
                        table.increment(2);
                    }
                })
            })
            .collect();
        for thread in threads {
            thread.join().unwrap();
        }

        let table = Arc::into_inner(table).unwrap().into_table();
        assert_eq!(&*table.counter, &[0, 0, 80_000, 0]);
    }

    #[rstest]
    #[case(IncrementStrategy::Atomic, 1)]
    #[case(IncrementStrategy::Atomic, 4)]
    #[case(IncrementStrategy::Serialized, 1)]
    #[case(IncrementStrategy::Serialized, 4)]
    #[case(IncrementStrategy::SortRunLength, 1)]
    #[case(IncrementStrategy::SortRunLength, 4)]
    fn strategies_match_reference(#[case] strategy: IncrementStrategy, #[case] threads: usize) {
        // Long runs, plus a tail that isn't a multiple of the lane count.
        let slice: Vec<u32> = (0..5_003_u32).map(|i| (i / 97) % 16).collect();
        let expected = reference(&slice, 16);

        for order in [
            LaunchOrder::Forward,
            LaunchOrder::Reverse,
            LaunchOrder::Interleaved,
        ] {
            let table = pool(threads).install(|| count_partition(strategy, &slice, 16, 7, order));
            assert_eq!(table, expected, "{strategy:?} {order:?}");
        }
    }

    #[rstest]
    #[case(IncrementStrategy::Atomic)]
    #[case(IncrementStrategy::Serialized)]
    #[case(IncrementStrategy::SortRunLength)]
    fn empty_slice_counts_nothing(#[case] strategy: IncrementStrategy) {
        let table = pool(2).install(|| count_partition(strategy, &[], 8, 4, LaunchOrder::Forward));
        assert_eq!(table, BinTable::zeroed(8));
    }

    #[test]
    fn more_lanes_than_pixels() {
        let slice = [3, 3, 1];
        let table = pool(2).install(|| {
            count_partition(IncrementStrategy::Atomic, &slice, 4, 64, LaunchOrder::Forward)
        });
        assert_eq!(&*table.counter, &[0, 1, 0, 2]);
    }

    #[test]
    fn serialized_owners_finish_on_a_single_thread() {
        // Many owners sharing one thread: each must drain its own lanes without waiting on
        // another partition.
        let slice: Vec<u32> = (0..20_000_u32).map(|i| (i / 13) % 32).collect();
        let expected = reference(&slice, 32);

        let tables: Vec<BinTable> = pool(1).install(|| {
            use rayon::prelude::*;
            slice
                .par_chunks(97)
                .map(|chunk| {
                    count_partition(
                        IncrementStrategy::Serialized,
                        chunk,
                        32,
                        5,
                        LaunchOrder::Interleaved,
                    )
                })
                .collect()
        });

        let mut merged = BinTable::zeroed(32);
        for table in &tables {
            for (sum, &count) in merged.counter.iter_mut().zip(table.counter.iter()) {
                *sum += count;
            }
        }
        assert_eq!(merged, expected);
    }

    #[test]
    fn serialized_handles_multiple_batches() {
        let slice = vec![5u32; SERIALIZED_BATCH * 3 + 1];
        let table = pool(1).install(|| {
            count_partition(IncrementStrategy::Serialized, &slice, 8, 2, LaunchOrder::Forward)
        });
        assert_eq!(table.counter[5] as usize, slice.len());
        assert_eq!(table.total() as usize, slice.len());
    }
}
