//! Distributed execution: independent ranks over disjoint ranges.
//!
//! Each rank owns an [`ItemStore`] for its range only. The pipeline reaches
//! every rank through [`broadcast_pipeline`] and the ranks meet once, at the
//! barrier between loading and transforming. Any fatal error on one rank
//! aborts the cluster so no peer stays blocked.

use futures::FutureExt;
use futures::future::try_join_all;
use std::ops::Range;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::benchmarking::{Phase, PhaseTally, WorkerReport};
use crate::core::{ItemStore, PipelineSpec};
use crate::processing::{
    ApplyOutcome, MediaCodec, PipelineApplier, TransformLibrary, load_with_retry,
};
use crate::utils::{PipelineError, PipelineResult};
use crate::worker::comm::{Communicator, LocalCluster, ROOT, broadcast_pipeline};
use crate::worker::{ExecutionModel, PartitionPlanner, WorkerCoordinator, WorkerError};

/// One rank's view of the run.
pub struct RankExecution<'a, C: MediaCodec, L> {
    rank: usize,
    store: ItemStore<C::Item>,
    sources: &'a [PathBuf],
    codec: &'a C,
    library: &'a L,
    comm: &'a dyn Communicator,
    load_retries: u32,
}

impl<'a, C, L> RankExecution<'a, C, L>
where
    C: MediaCodec,
    L: TransformLibrary<Item = C::Item>,
{
    pub fn new(
        range: Range<usize>,
        sources: &'a [PathBuf],
        codec: &'a C,
        library: &'a L,
        comm: &'a dyn Communicator,
        load_retries: u32,
    ) -> Self {
        Self {
            rank: comm.rank(),
            store: ItemStore::for_range(range),
            sources,
            codec,
            library,
            comm,
            load_retries,
        }
    }
}

impl<C, L> ExecutionModel for RankExecution<'_, C, L>
where
    C: MediaCodec,
    L: TransformLibrary<Item = C::Item>,
{
    fn load(&mut self) -> PipelineResult<PhaseTally> {
        let mut tally = PhaseTally::default();
        for index in self.store.indices() {
            let Some(path) = self.sources.get(index) else {
                tally.skip(index, Phase::Load, "no source for index");
                continue;
            };
            match load_with_retry(self.codec, path, self.load_retries) {
                Ok(item) => {
                    if self.store.insert(index, item).is_ok() {
                        tally.succeeded += 1;
                    }
                }
                Err(e) => {
                    let err = PipelineError::from_load(index, path, e);
                    warn!("Rank {} skipping item {}: {}", self.rank, index, err);
                    tally.skip(index, Phase::Load, err.to_string());
                }
            }
        }
        Ok(tally)
    }

    fn synchronize(&mut self) -> PipelineResult<()> {
        debug!("Rank {} waiting at load barrier", self.rank);
        self.comm.barrier()?;
        Ok(())
    }

    fn transform(&mut self, spec: &PipelineSpec) -> PipelineResult<PhaseTally> {
        let applier = PipelineApplier::new(self.library, spec);
        let mut tally = PhaseTally::default();
        for index in self.store.indices() {
            match applier.apply(&mut self.store, index) {
                Ok(ApplyOutcome::Applied) => tally.succeeded += 1,
                Ok(ApplyOutcome::Empty) => {}
                Err(e) => {
                    warn!("Rank {} skipping item {}: {}", self.rank, index, e);
                    tally.skip(index, Phase::Transform, e.to_string());
                }
            }
        }
        Ok(tally)
    }

    fn persist(&mut self) -> PhaseTally {
        let mut tally = PhaseTally::default();
        for (index, item) in self.store.iter_loaded() {
            match self.codec.persist(item, index) {
                Ok(path) => {
                    debug!("Rank {} wrote item {} to {}", self.rank, index, path.display());
                    tally.succeeded += 1;
                }
                Err(e) => {
                    warn!("Rank {} could not persist item {}: {}", self.rank, index, e);
                    tally.skip(index, Phase::Persist, e.to_string());
                }
            }
        }
        tally
    }
}

/// Runs one rank end to end: receive the pipeline, compute the local range,
/// then drive the phases. Aborts the cluster on any failure.
pub fn run_rank<C, L>(
    comm: &dyn Communicator,
    root_spec: Option<&PipelineSpec>,
    sources: &[PathBuf],
    codec: &C,
    library: &L,
    load_retries: u32,
) -> PipelineResult<WorkerReport>
where
    C: MediaCodec,
    L: TransformLibrary<Item = C::Item>,
{
    let rank = comm.rank();
    let outcome = catch_unwind(AssertUnwindSafe(|| -> PipelineResult<WorkerReport> {
        let spec = broadcast_pipeline(comm, ROOT, root_spec)?;
        let range = PartitionPlanner::range_for(sources.len(), comm.size(), rank);
        let mut execution =
            RankExecution::new(range.clone(), sources, codec, library, comm, load_retries);
        WorkerCoordinator::new(rank, range).run(&mut execution, &spec)
    }));

    let result = outcome.unwrap_or_else(|panic| {
        let reason = panic
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| panic.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        Err(WorkerError::Panicked { worker: rank, reason }.into())
    });

    if let Err(e) = &result {
        if !matches!(e, PipelineError::Worker(WorkerError::Aborted(_))) {
            comm.abort(&format!("rank {}: {}", rank, e));
        }
    }
    result
}

/// Distributed run over `workers` in-process ranks.
pub struct DistributedRun<C, L> {
    codec: Arc<C>,
    library: Arc<L>,
    workers: usize,
    load_retries: u32,
}

impl<C, L> DistributedRun<C, L>
where
    C: MediaCodec + 'static,
    L: TransformLibrary<Item = C::Item> + 'static,
{
    pub fn new(codec: Arc<C>, library: Arc<L>, workers: usize, load_retries: u32) -> Self {
        Self {
            codec,
            library,
            workers,
            load_retries,
        }
    }

    /// Spawns one blocking task per rank and waits for all of them.
    ///
    /// Returns per-rank reports in rank order, or the first root-cause
    /// error if any rank failed.
    pub async fn execute(
        &self,
        spec: &PipelineSpec,
        sources: Arc<Vec<PathBuf>>,
    ) -> PipelineResult<Vec<WorkerReport>> {
        info!(
            "Distributing {} items over {} ranks: {:?}",
            sources.len(),
            self.workers,
            PartitionPlanner::plan(sources.len(), self.workers)
        );

        let handles = LocalCluster::new(self.workers).into_iter().map(|comm| {
            let codec = Arc::clone(&self.codec);
            let library = Arc::clone(&self.library);
            let sources = Arc::clone(&sources);
            let rank = comm.rank();
            let root_spec = (rank == ROOT).then(|| spec.clone());
            let load_retries = self.load_retries;
            tokio::task::spawn_blocking(move || {
                let (codec, library) = (codec.as_ref(), library.as_ref());
                run_rank(&comm, root_spec.as_ref(), &sources, codec, library, load_retries)
            })
            .map(move |joined| joined.map_err(|e| WorkerError::join(rank, e)))
        });

        let results = try_join_all(handles).await?;

        let mut reports = Vec::with_capacity(results.len());
        let mut first_abort = None;
        for result in results {
            match result {
                Ok(report) => reports.push(report),
                Err(PipelineError::Worker(WorkerError::Aborted(reason))) => {
                    first_abort.get_or_insert(reason);
                }
                Err(e) => return Err(e),
            }
        }
        if let Some(reason) = first_abort {
            return Err(WorkerError::Aborted(reason).into());
        }
        Ok(reports)
    }
}
