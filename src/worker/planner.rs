//! Partition planning for both execution models.
//!
//! Everything here is a pure function of its inputs, so every distributed
//! rank computes the same plan without receiving it over the wire.

use std::ops::Range;

/// Smallest chunk used once a workload is large enough to batch
const MIN_BATCHED_CHUNK: usize = 2;

pub struct PartitionPlanner;

impl PartitionPlanner {
    /// Contiguous, non-overlapping ranges covering `0..item_count`, one per worker.
    ///
    /// Uses ceiling division so the remainder is never dropped; the last
    /// non-empty range is clipped to `item_count` and any worker starting at
    /// or beyond it gets an empty range.
    pub fn plan(item_count: usize, worker_count: usize) -> Vec<Range<usize>> {
        (0..worker_count)
            .map(|rank| Self::range_for(item_count, worker_count, rank))
            .collect()
    }

    /// The range owned by `rank` in [`plan`](Self::plan).
    pub fn range_for(item_count: usize, worker_count: usize, rank: usize) -> Range<usize> {
        if worker_count == 0 || rank >= worker_count {
            return item_count..item_count;
        }
        let chunk = item_count.div_ceil(worker_count);
        let start = rank.saturating_mul(chunk).min(item_count);
        let end = (rank + 1).saturating_mul(chunk).min(item_count);
        start..end
    }

    /// Chunk size for pull-based scheduling in the shared-memory model.
    ///
    /// Small workloads (fewer than two items per thread) use single-item
    /// chunks so no thread sits idle.
    pub fn optimal_chunk_size(item_count: usize, available_threads: usize) -> usize {
        let threads = available_threads.max(1);
        if item_count < threads.saturating_mul(2) {
            return 1;
        }
        (item_count / threads).max(MIN_BATCHED_CHUNK)
    }

    /// Widens a planned chunk size once the real pool size is known.
    pub fn widen_chunk_size(baseline: usize, item_count: usize, running_threads: usize) -> usize {
        baseline.max(item_count / running_threads.max(1)).max(1)
    }

    pub fn chunk_count(item_count: usize, chunk_size: usize) -> usize {
        item_count.div_ceil(chunk_size.max(1))
    }
}
