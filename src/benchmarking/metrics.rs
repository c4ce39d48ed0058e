use serde::Serialize;
use std::fmt;
use std::ops::Range;
use tracing::warn;

use crate::core::ExecutionMode;
use crate::worker::WorkerState;

const MAX_DURATION_SECS: f64 = 3600.0 * 24.0; // 24 hours per phase at most

/// A strongly-typed duration value that ensures non-negative time values
/// and provides safe arithmetic operations.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Default)]
pub struct Duration(f64);

impl Duration {
    /// Creates a new Duration without validation, but with safety guards.
    /// Invalid values will be clamped to valid range with warning logs.
    pub fn new_unchecked(seconds: f64) -> Self {
        if seconds < 0.0 {
            warn!("Negative duration provided: {:.2}s, using 0.0s instead", seconds);
            Self(0.0)
        } else if seconds > MAX_DURATION_SECS {
            warn!("Duration exceeds maximum allowed value: {:.2}s > {:.2}s, capping at maximum",
                seconds, MAX_DURATION_SECS);
            Self(MAX_DURATION_SECS)
        } else {
            Self(seconds)
        }
    }

    /// Returns the duration in seconds as an f64.
    pub fn as_secs_f64(&self) -> f64 {
        self.0
    }

    /// Returns a Duration representing zero seconds.
    pub fn zero() -> Self {
        Self(0.0)
    }
}

impl From<std::time::Duration> for Duration {
    fn from(d: std::time::Duration) -> Self {
        Self::new_unchecked(d.as_secs_f64())
    }
}

impl std::ops::Add for Duration {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        Self(self.0 + other.0)
    }
}

impl std::ops::AddAssign for Duration {
    fn add_assign(&mut self, other: Self) {
        self.0 += other.0;
    }
}

impl fmt::Display for Duration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 >= 60.0 {
            let minutes = (self.0 / 60.0).floor();
            let seconds = self.0 % 60.0;
            write!(f, "{:.0}m {:.2}s", minutes, seconds)
        } else {
            write!(f, "{:.3}s", self.0)
        }
    }
}

/// Phase in which an item was skipped or time was spent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Load,
    Barrier,
    Transform,
    Persist,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Load => "load",
            Self::Barrier => "barrier",
            Self::Transform => "transform",
            Self::Persist => "persist",
        };
        f.write_str(name)
    }
}

/// Wall time spent per phase by one worker.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct PhaseTimings {
    pub load: Duration,
    pub barrier: Duration,
    pub transform: Duration,
    pub persist: Duration,
}

impl PhaseTimings {
    pub fn record(&mut self, phase: Phase, elapsed: Duration) {
        match phase {
            Phase::Load => self.load += elapsed,
            Phase::Barrier => self.barrier += elapsed,
            Phase::Transform => self.transform += elapsed,
            Phase::Persist => self.persist += elapsed,
        }
    }

    pub fn total(&self) -> Duration {
        self.load + self.barrier + self.transform + self.persist
    }
}

/// An item that did not make it to the sink, and why.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedItem {
    pub index: usize,
    pub phase: Phase,
    pub reason: String,
}

/// Outcome of one phase: how many items passed through and which were dropped.
#[derive(Debug, Clone, Default)]
pub struct PhaseTally {
    pub succeeded: usize,
    pub skipped: Vec<SkippedItem>,
}

impl PhaseTally {
    pub fn skip(&mut self, index: usize, phase: Phase, reason: impl Into<String>) {
        self.skipped.push(SkippedItem {
            index,
            phase,
            reason: reason.into(),
        });
    }

    pub fn merge(&mut self, other: PhaseTally) {
        self.succeeded += other.succeeded;
        self.skipped.extend(other.skipped);
    }
}

/// Everything one worker reports when it reaches a terminal state.
#[derive(Debug, Clone, Serialize)]
pub struct WorkerReport {
    pub worker: usize,
    pub range: Range<usize>,
    pub state: WorkerState,
    pub loaded: usize,
    pub transformed: usize,
    pub persisted: usize,
    pub skipped: Vec<SkippedItem>,
    pub timings: PhaseTimings,
}

impl WorkerReport {
    pub fn new(worker: usize, range: Range<usize>) -> Self {
        Self {
            worker,
            range,
            state: WorkerState::Init,
            loaded: 0,
            transformed: 0,
            persisted: 0,
            skipped: Vec::new(),
            timings: PhaseTimings::default(),
        }
    }
}

/// Aggregate of all worker reports for one run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub mode: ExecutionMode,
    /// Ranks in distributed mode, pool threads in shared-memory mode
    pub parallelism: usize,
    pub item_count: usize,
    pub workers: Vec<WorkerReport>,
    pub total_duration: Duration,
}

impl RunReport {
    pub fn loaded(&self) -> usize {
        self.workers.iter().map(|w| w.loaded).sum()
    }

    pub fn transformed(&self) -> usize {
        self.workers.iter().map(|w| w.transformed).sum()
    }

    pub fn persisted(&self) -> usize {
        self.workers.iter().map(|w| w.persisted).sum()
    }

    pub fn skipped(&self) -> impl Iterator<Item = &SkippedItem> {
        self.workers.iter().flat_map(|w| w.skipped.iter())
    }

    /// Slowest worker per phase; the phases are separated by the barrier so
    /// the slowest worker bounds the run.
    pub fn critical_path(&self) -> PhaseTimings {
        let mut slowest = PhaseTimings::default();
        for w in &self.workers {
            let t = &w.timings;
            if t.load > slowest.load {
                slowest.load = t.load;
            }
            if t.barrier > slowest.barrier {
                slowest.barrier = t.barrier;
            }
            if t.transform > slowest.transform {
                slowest.transform = t.transform;
            }
            if t.persist > slowest.persist {
                slowest.persist = t.persist;
            }
        }
        slowest
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn durations_are_clamped() {
        assert_eq!(Duration::new_unchecked(-1.0), Duration::zero());
        assert_eq!(Duration::new_unchecked(1e9).as_secs_f64(), MAX_DURATION_SECS);
        assert_eq!(Duration::new_unchecked(75.5).to_string(), "1m 15.50s");
    }

    #[test]
    fn report_aggregates_workers() {
        let mut a = WorkerReport::new(0, 0..3);
        a.loaded = 3;
        a.persisted = 2;
        a.timings.record(Phase::Load, Duration::new_unchecked(2.0));
        a.skipped.push(SkippedItem { index: 1, phase: Phase::Load, reason: "bad".into() });
        let mut b = WorkerReport::new(1, 3..5);
        b.loaded = 2;
        b.persisted = 2;
        b.timings.record(Phase::Load, Duration::new_unchecked(1.0));
        b.timings.record(Phase::Transform, Duration::new_unchecked(4.0));

        let report = RunReport {
            mode: ExecutionMode::Distributed,
            parallelism: 2,
            item_count: 5,
            workers: vec![a, b],
            total_duration: Duration::new_unchecked(7.0),
        };
        assert_eq!(report.loaded(), 5);
        assert_eq!(report.persisted(), 4);
        assert_eq!(report.skipped().count(), 1);
        let slowest = report.critical_path();
        assert_eq!(slowest.load.as_secs_f64(), 2.0);
        assert_eq!(slowest.transform.as_secs_f64(), 4.0);
    }
}
