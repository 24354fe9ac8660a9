//! The privatized counter bank.
//!
//! The input is cut into contiguous partitions. Each partition counts into its own table, so
//! no two partitions ever write the same memory; contention is limited to the lanes of one
//! partition. The bank is only handed out once every partition has finished.

use super::{count_partition, BinTable};
use crate::config::{Geometry, LaunchConfig};
use core::mem::size_of;
use core::ops::Range;
use log::{trace, warn};
use rayon::prelude::*;

/// How finely the input is privatized.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Granularity {
    /// One table per work-group; the table fits the partition's local storage.
    WorkGroup,
    /// The table does not fit local storage, so fewer, larger partitions are used.
    Coarse,
}

/// How the input of a pass is split into partitions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PartitionPlan {
    partitions: usize,
    chunk: usize,
    len: usize,
    granularity: Granularity,
}

impl PartitionPlan {
    /// Plans a pass over `len` pixels.
    ///
    /// Partitions cover `chunk = ceil(len / requested)` pixels each, the last one possibly
    /// fewer. Partitions that would be empty are not planned at all.
    pub fn new(geometry: &Geometry, launch: &LaunchConfig, len: usize) -> Self {
        let table_bytes = geometry.bins() * size_of::<u32>();
        let (granularity, requested) = if table_bytes <= launch.local_storage_bytes {
            (Granularity::WorkGroup, launch.partitions)
        } else {
            warn!(
                "bin table of {table_bytes} bytes exceeds {} bytes of local storage, using coarse privatization",
                launch.local_storage_bytes
            );
            (
                Granularity::Coarse,
                launch.partitions.min(launch.coarse_partitions),
            )
        };

        let chunk = len.div_ceil(requested.max(1)).max(1);
        PartitionPlan {
            partitions: len.div_ceil(chunk),
            chunk,
            len,
            granularity,
        }
    }

    #[inline]
    pub fn partitions(&self) -> usize {
        self.partitions
    }

    #[inline]
    pub fn granularity(&self) -> Granularity {
        self.granularity
    }

    /// Pixels handled by `partition`.
    #[inline]
    pub fn range(&self, partition: usize) -> Range<usize> {
        let start = (partition * self.chunk).min(self.len);
        start..(start + self.chunk).min(self.len)
    }
}

/// One private [`BinTable`] per partition, each complete.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PrivateCounterBank {
    tables: Vec<BinTable>,
}

impl PrivateCounterBank {
    /// Runs the counting stage: every partition of `input` counts into its own table.
    ///
    /// Partitions are launched in `launch.order`; each uses `launch.workers_per_partition`
    /// lanes and `launch.strategy`. Returns only once every partition has joined, which is the
    /// barrier the merge stage relies on.
    ///
    /// Must be called from inside the device thread pool.
    pub fn count(plan: &PartitionPlan, input: &[u32], bins: usize, launch: &LaunchConfig) -> Self {
        debug_assert_eq!(plan.len, input.len());

        let mut counted: Vec<(usize, BinTable)> = launch
            .order
            .sequence(plan.partitions())
            .into_par_iter()
            .map(|partition| {
                let range = plan.range(partition);
                trace!("partition {partition}: counting pixels {range:?}");
                let table = count_partition(
                    launch.strategy,
                    &input[range],
                    bins,
                    launch.workers_per_partition,
                    launch.order,
                );
                (partition, table)
            })
            .collect();

        counted.sort_unstable_by_key(|(partition, _)| *partition);
        PrivateCounterBank {
            tables: counted.into_iter().map(|(_, table)| table).collect(),
        }
    }

    /// Wraps already counted tables.
    pub fn from_tables(tables: Vec<BinTable>) -> Self {
        PrivateCounterBank { tables }
    }

    /// Tables in partition order.
    #[inline]
    pub fn tables(&self) -> &[BinTable] {
        &self.tables
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.tables.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Pixels counted across all partitions.
    pub fn total(&self) -> u64 {
        self.tables.iter().map(BinTable::total).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LaunchOrder;
    use crate::histogram::IncrementStrategy;
    use rstest::rstest;

    fn geometry(histo_log: u32) -> Geometry {
        Geometry::new(histo_log, 1, 100, 10).unwrap()
    }

    #[rstest]
    #[case(1000, 64, 63, 16)] // 1000 / 64 rounds up to 16, leaving 63 partitions
    #[case(1000, 10, 10, 100)]
    #[case(1000, 1, 1, 1000)]
    #[case(5, 64, 5, 1)] // more partitions than pixels
    fn plans_contiguous_partitions(
        #[case] len: usize,
        #[case] requested: usize,
        #[case] partitions: usize,
        #[case] chunk: usize,
    ) {
        let launch = LaunchConfig::default().with_partitions(requested, 4);
        let plan = PartitionPlan::new(&geometry(4), &launch, len);

        assert_eq!(plan.partitions(), partitions);
        assert_eq!(plan.granularity(), Granularity::WorkGroup);
        assert_eq!(plan.range(0), 0..chunk);

        // Ranges tile the input exactly once.
        let covered: usize = (0..plan.partitions()).map(|p| plan.range(p).len()).sum();
        assert_eq!(covered, len);
        assert_eq!(plan.range(plan.partitions() - 1).end, len);
    }

    #[test]
    fn falls_back_to_coarse_partitions() {
        let launch = LaunchConfig {
            local_storage_bytes: 1024,
            coarse_partitions: 3,
            ..LaunchConfig::default()
        };

        // 512 bins * 4 bytes doesn't fit 1KiB.
        let plan = PartitionPlan::new(&geometry(9), &launch, 1000);
        assert_eq!(plan.granularity(), Granularity::Coarse);
        assert_eq!(plan.partitions(), 3);

        // 16 bins do.
        let plan = PartitionPlan::new(&geometry(4), &launch, 1000);
        assert_eq!(plan.granularity(), Granularity::WorkGroup);
    }

    #[rstest]
    #[case(IncrementStrategy::Atomic, LaunchOrder::Forward)]
    #[case(IncrementStrategy::Serialized, LaunchOrder::Reverse)]
    #[case(IncrementStrategy::SortRunLength, LaunchOrder::Interleaved)]
    fn each_partition_counts_its_own_slice(
        #[case] strategy: IncrementStrategy,
        #[case] order: LaunchOrder,
    ) {
        let input: Vec<u32> = (0..1000).map(|i| i / 100).collect();
        let launch = LaunchConfig::default()
            .with_partitions(10, 3)
            .with_strategy(strategy)
            .with_order(order);
        let plan = PartitionPlan::new(&geometry(4), &launch, input.len());

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(3)
            .build()
            .unwrap();
        let bank = pool.install(|| PrivateCounterBank::count(&plan, &input, 16, &launch));

        assert_eq!(bank.len(), 10);
        assert_eq!(bank.total(), 1000);
        for (partition, table) in bank.tables().iter().enumerate() {
            // Partition p holds exactly the 100 pixels of bin p.
            assert_eq!(table.counter[partition], 100);
            assert_eq!(table.total(), 100);
        }
    }
}
