use std::ops::Range;
use std::time::Instant;
use tracing::{debug, error, info};

use crate::benchmarking::{Phase, PhaseTally, WorkerReport};
use crate::core::PipelineSpec;
use crate::utils::{PipelineError, PipelineResult};
use crate::worker::{WorkerError, WorkerState};

/// One execution model's implementation of the four phases.
///
/// Per-item failures are reported in the returned tally; an `Err` from any
/// phase is a coordination fault and fails the worker.
pub trait ExecutionModel {
    fn load(&mut self) -> PipelineResult<PhaseTally>;
    /// Returns once every worker of the run has finished loading.
    fn synchronize(&mut self) -> PipelineResult<()>;
    fn transform(&mut self, spec: &PipelineSpec) -> PipelineResult<PhaseTally>;
    /// Per-item persist failures are logged and tallied, never raised.
    fn persist(&mut self) -> PhaseTally;
}

/// Drives one worker through `Init → Loading → Barrier → Transforming →
/// Persisting → Done`, timing each phase.
pub struct WorkerCoordinator {
    state: WorkerState,
    report: WorkerReport,
}

impl WorkerCoordinator {
    pub fn new(worker: usize, range: Range<usize>) -> Self {
        Self {
            state: WorkerState::Init,
            report: WorkerReport::new(worker, range),
        }
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    pub fn worker(&self) -> usize {
        self.report.worker
    }

    pub fn advance(&mut self, next: WorkerState) -> PipelineResult<()> {
        if !self.state.can_transition_to(next) {
            return Err(WorkerError::StateError {
                worker: self.worker(),
                from: self.state,
                to: next,
            }
            .into());
        }
        debug!("Worker {}: {} -> {}", self.worker(), self.state, next);
        self.state = next;
        Ok(())
    }

    fn fail(&mut self, err: PipelineError) -> PipelineError {
        error!("Worker {} failed while {}: {}", self.worker(), self.state, err);
        if self.state.can_transition_to(WorkerState::Failed) {
            self.state = WorkerState::Failed;
        }
        err
    }

    fn absorb(&mut self, phase: Phase, tally: PhaseTally) -> usize {
        let succeeded = tally.succeeded;
        self.report.skipped.extend(tally.skipped);
        debug!("Worker {}: {} phase passed {} items", self.worker(), phase, succeeded);
        succeeded
    }

    /// Runs every phase of `model` in order and returns the worker's report.
    pub fn run<M>(mut self, model: &mut M, spec: &PipelineSpec) -> PipelineResult<WorkerReport>
    where
        M: ExecutionModel + ?Sized,
    {
        let range = self.report.range.clone();
        info!("Worker {} starting on [{}, {})", self.worker(), range.start, range.end);

        self.advance(WorkerState::Loading)?;
        let started = Instant::now();
        let tally = model.load().map_err(|e| self.fail(e))?;
        self.report.timings.record(Phase::Load, started.elapsed().into());
        self.report.loaded = self.absorb(Phase::Load, tally);

        self.advance(WorkerState::Barrier)?;
        let started = Instant::now();
        model.synchronize().map_err(|e| self.fail(e))?;
        self.report.timings.record(Phase::Barrier, started.elapsed().into());

        self.advance(WorkerState::Transforming)?;
        let started = Instant::now();
        let tally = model.transform(spec).map_err(|e| self.fail(e))?;
        self.report.timings.record(Phase::Transform, started.elapsed().into());
        self.report.transformed = self.absorb(Phase::Transform, tally);

        self.advance(WorkerState::Persisting)?;
        let started = Instant::now();
        let tally = model.persist();
        self.report.timings.record(Phase::Persist, started.elapsed().into());
        self.report.persisted = self.absorb(Phase::Persist, tally);

        self.advance(WorkerState::Done)?;
        self.report.state = self.state;
        info!(
            "Worker {} done: {} loaded, {} persisted, {} skipped in {}",
            self.worker(),
            self.report.loaded,
            self.report.persisted,
            self.report.skipped.len(),
            self.report.timings.total()
        );
        Ok(self.report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Scripted {
        calls: Vec<&'static str>,
        fail_barrier: bool,
    }

    impl ExecutionModel for Scripted {
        fn load(&mut self) -> PipelineResult<PhaseTally> {
            self.calls.push("load");
            let mut tally = PhaseTally { succeeded: 2, ..Default::default() };
            tally.skip(1, Phase::Load, "corrupt");
            Ok(tally)
        }

        fn synchronize(&mut self) -> PipelineResult<()> {
            self.calls.push("sync");
            if self.fail_barrier {
                return Err(WorkerError::Aborted("peer failed".into()).into());
            }
            Ok(())
        }

        fn transform(&mut self, _: &PipelineSpec) -> PipelineResult<PhaseTally> {
            self.calls.push("transform");
            Ok(PhaseTally { succeeded: 2, ..Default::default() })
        }

        fn persist(&mut self) -> PhaseTally {
            self.calls.push("persist");
            PhaseTally { succeeded: 2, ..Default::default() }
        }
    }

    #[test]
    fn phases_run_in_order() {
        let mut model = Scripted::default();
        let report = WorkerCoordinator::new(1, 3..6)
            .run(&mut model, &PipelineSpec::default())
            .unwrap();

        assert_eq!(model.calls, ["load", "sync", "transform", "persist"]);
        assert_eq!(report.state, WorkerState::Done);
        assert_eq!(report.range, 3..6);
        assert_eq!((report.loaded, report.transformed, report.persisted), (2, 2, 2));
        assert_eq!(report.skipped.len(), 1);
    }

    #[test]
    fn barrier_fault_stops_before_transform() {
        let mut model = Scripted { fail_barrier: true, ..Default::default() };
        let err = WorkerCoordinator::new(0, 0..3)
            .run(&mut model, &PipelineSpec::default())
            .unwrap_err();

        assert!(matches!(err, PipelineError::Worker(WorkerError::Aborted(_))));
        assert_eq!(model.calls, ["load", "sync"]);
    }

    #[test]
    fn illegal_transition_is_a_state_error() {
        let mut coordinator = WorkerCoordinator::new(2, 0..0);
        let err = coordinator.advance(WorkerState::Transforming).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Worker(WorkerError::StateError {
                worker: 2,
                from: WorkerState::Init,
                ..
            })
        ));

        coordinator.advance(WorkerState::Loading).unwrap();
        let err = coordinator.fail(PipelineError::config("x"));
        assert!(matches!(err, PipelineError::Config(_)));
        assert_eq!(coordinator.state(), WorkerState::Failed);
    }
}
