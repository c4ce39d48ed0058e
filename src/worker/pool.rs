use parking_lot::Mutex;
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::ops::Range;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, info, warn};

use crate::benchmarking::{Phase, PhaseTally, WorkerReport};
use crate::core::PipelineSpec;
use crate::processing::{
    ApplyOutcome, MediaCodec, PipelineApplier, TransformLibrary, load_with_retry,
};
use crate::utils::{PipelineError, PipelineResult};
use crate::worker::{
    ExecutionModel, ItemLockTable, LockGranularity, PartitionPlanner, WorkerCoordinator,
    WorkerError, WorkerResult,
};

/// Hands out consecutive chunks of an index range to whichever thread asks next.
pub struct ChunkCursor {
    next: AtomicUsize,
    end: usize,
    chunk: usize,
}

impl ChunkCursor {
    pub fn new(range: Range<usize>, chunk: usize) -> Self {
        Self {
            next: AtomicUsize::new(range.start),
            end: range.end,
            chunk: chunk.max(1),
        }
    }

    pub fn next_chunk(&self) -> Option<Range<usize>> {
        let start = self.next.fetch_add(self.chunk, Ordering::Relaxed);
        if start >= self.end {
            return None;
        }
        Some(start..(start + self.chunk).min(self.end))
    }
}

/// Shared-memory execution: one store behind the lock table, worked on by a
/// pool of threads pulling chunks.
pub struct PooledExecution<'a, C: MediaCodec, L> {
    pool: &'a ThreadPool,
    table: ItemLockTable<C::Item>,
    sources: &'a [PathBuf],
    codec: &'a C,
    library: &'a L,
    load_retries: u32,
    baseline_chunk: usize,
}

impl<'a, C, L> PooledExecution<'a, C, L>
where
    C: MediaCodec,
    L: TransformLibrary<Item = C::Item>,
{
    pub fn new(
        pool: &'a ThreadPool,
        sources: &'a [PathBuf],
        codec: &'a C,
        library: &'a L,
        granularity: LockGranularity,
        load_retries: u32,
    ) -> Self {
        let n = sources.len();
        Self {
            pool,
            table: ItemLockTable::new(n, granularity),
            sources,
            codec,
            library,
            load_retries,
            baseline_chunk: PartitionPlanner::optimal_chunk_size(n, pool.current_num_threads()),
        }
    }

    /// Runs `per_item` for every index on every pool thread, pulling chunks
    /// of `chunk` indices, and merges the per-thread tallies.
    fn for_each_index<F>(&self, chunk: usize, per_item: F) -> PhaseTally
    where
        F: Fn(usize, &mut PhaseTally) + Sync,
    {
        let cursor = ChunkCursor::new(0..self.sources.len(), chunk);
        let total = Mutex::new(PhaseTally::default());
        let threads = self.pool.current_num_threads();

        self.pool.scope(|s| {
            for _ in 0..threads {
                let (cursor, total, per_item) = (&cursor, &total, &per_item);
                s.spawn(move |_| {
                    let mut local = PhaseTally::default();
                    while let Some(chunk) = cursor.next_chunk() {
                        for index in chunk {
                            per_item(index, &mut local);
                        }
                    }
                    total.lock().merge(local);
                });
            }
        });

        total.into_inner()
    }

    /// Gives the items back as plain storage once every phase is over.
    pub fn into_store(self) -> crate::core::ItemStore<C::Item> {
        self.table.into_store()
    }
}

impl<C, L> ExecutionModel for PooledExecution<'_, C, L>
where
    C: MediaCodec,
    L: TransformLibrary<Item = C::Item>,
{
    fn load(&mut self) -> PipelineResult<PhaseTally> {
        let (table, sources) = (&self.table, self.sources);
        let (codec, retries) = (self.codec, self.load_retries);
        // counters live under one lock, shared by every loading thread
        let loaded = Mutex::new(PhaseTally::default());

        self.for_each_index(self.baseline_chunk, |index, _| {
            match load_with_retry(codec, &sources[index], retries) {
                Ok(item) => {
                    if let Some(mut slot) = table.acquire(index) {
                        *slot = Some(item);
                    }
                    loaded.lock().succeeded += 1;
                }
                Err(e) => {
                    let err = PipelineError::from_load(index, &sources[index], e);
                    warn!("Pool skipping item {}: {}", index, err);
                    loaded.lock().skip(index, Phase::Load, err.to_string());
                }
            }
        });

        Ok(loaded.into_inner())
    }

    fn synchronize(&mut self) -> PipelineResult<()> {
        // the load scope has already joined every thread
        debug!("Pool load phase joined");
        Ok(())
    }

    fn transform(&mut self, spec: &PipelineSpec) -> PipelineResult<PhaseTally> {
        let chunk = PartitionPlanner::widen_chunk_size(
            self.baseline_chunk,
            self.sources.len(),
            self.pool.current_num_threads(),
        );
        debug!("Transforming with chunk size {} (baseline {})", chunk, self.baseline_chunk);

        let applier = PipelineApplier::new(self.library, spec);
        let table = &self.table;
        let tally = self.for_each_index(chunk, |index, tally| {
            match applier.apply_locked(table, index) {
                Ok(ApplyOutcome::Applied) => tally.succeeded += 1,
                Ok(ApplyOutcome::Empty) => {}
                Err(e) => {
                    warn!("Pool skipping item {}: {}", index, e);
                    tally.skip(index, Phase::Transform, e.to_string());
                }
            }
        });
        Ok(tally)
    }

    fn persist(&mut self) -> PhaseTally {
        let (table, codec) = (&self.table, self.codec);
        self.for_each_index(self.baseline_chunk, |index, tally| {
            let Some(guard) = table.acquire(index) else {
                return;
            };
            let Some(item) = &*guard else {
                return;
            };
            match codec.persist(item, index) {
                Ok(path) => {
                    debug!("Pool wrote item {} to {}", index, path.display());
                    tally.succeeded += 1;
                }
                Err(e) => {
                    warn!("Pool could not persist item {}: {}", index, e);
                    tally.skip(index, Phase::Persist, e.to_string());
                }
            }
        })
    }
}

/// Shared-memory run over a dedicated rayon pool.
pub struct WorkerPool<C, L> {
    codec: Arc<C>,
    library: Arc<L>,
    threads: usize,
    granularity: LockGranularity,
    load_retries: u32,
}

impl<C, L> WorkerPool<C, L>
where
    C: MediaCodec + 'static,
    L: TransformLibrary<Item = C::Item> + 'static,
{
    pub fn new(
        codec: Arc<C>,
        library: Arc<L>,
        threads: usize,
        granularity: LockGranularity,
        load_retries: u32,
    ) -> Self {
        Self {
            codec,
            library,
            threads,
            granularity,
            load_retries,
        }
    }

    fn build_pool(threads: usize) -> WorkerResult<ThreadPool> {
        Ok(ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("pipeline-worker-{}", i))
            .build()?)
    }

    /// Runs every phase on the pool from a blocking task and returns the
    /// single report covering `0..N`.
    pub async fn execute(
        &self,
        spec: &PipelineSpec,
        sources: Arc<Vec<PathBuf>>,
    ) -> PipelineResult<WorkerReport> {
        let codec = Arc::clone(&self.codec);
        let library = Arc::clone(&self.library);
        let spec = spec.clone();
        let (threads, granularity) = (self.threads, self.granularity);
        let load_retries = self.load_retries;

        info!(
            "Running {} items on {} threads with {} locking",
            sources.len(),
            threads,
            granularity
        );

        tokio::task::spawn_blocking(move || -> PipelineResult<WorkerReport> {
            let pool = Self::build_pool(threads)?;
            let mut execution = PooledExecution::new(
                &pool,
                &sources,
                codec.as_ref(),
                library.as_ref(),
                granularity,
                load_retries,
            );
            let report =
                WorkerCoordinator::new(0, 0..sources.len()).run(&mut execution, &spec)?;
            let store = execution.into_store();
            debug!("Released lock table with {} surviving items", store.loaded_count());
            Ok(report)
        })
        .await
        .map_err(|e| WorkerError::join(0, e))?
    }
}
