mod metrics;
mod reporter;

pub use metrics::{Duration, Phase, PhaseTally, PhaseTimings, RunReport, SkippedItem, WorkerReport};
pub use reporter::RunReporter;
