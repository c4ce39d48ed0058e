use super::metrics::{Duration, RunReport};
use std::fmt;

/// Renders a [`RunReport`] as a human-readable summary.
pub struct RunReporter<'a> {
    report: &'a RunReport,
}

impl<'a> RunReporter<'a> {
    pub fn new(report: &'a RunReport) -> Self {
        Self { report }
    }

    fn safe_div(numerator: f64, denominator: f64) -> f64 {
        if denominator == 0.0 {
            0.0
        } else {
            numerator / denominator
        }
    }

    fn throughput(&self) -> f64 {
        Self::safe_div(
            self.report.persisted() as f64,
            self.report.total_duration.as_secs_f64(),
        )
    }

    fn average_per_item(&self) -> Duration {
        let slowest = self.report.critical_path();
        Duration::new_unchecked(Self::safe_div(
            slowest.transform.as_secs_f64(),
            self.report.transformed() as f64,
        ))
    }
}

impl fmt::Display for RunReporter<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let report = self.report;
        writeln!(f, "=== Image Pipeline Run Report ===")?;
        writeln!(f)?;

        writeln!(f, "Run:")?;
        writeln!(f, "- Mode: {}", report.mode)?;
        writeln!(f, "- Parallelism: {}", report.parallelism)?;
        writeln!(f, "- Items: {}", report.item_count)?;
        writeln!(f, "- Total Duration: {}", report.total_duration)?;
        writeln!(f, "- Throughput: {:.2} items/s", self.throughput())?;
        writeln!(f)?;

        let slowest = report.critical_path();
        writeln!(f, "Phase Timings (slowest worker):")?;
        writeln!(f, "- Loading: {}", slowest.load)?;
        writeln!(f, "- Barrier Wait: {}", slowest.barrier)?;
        writeln!(f, "- Transforming: {} ({}/item)", slowest.transform, self.average_per_item())?;
        writeln!(f, "- Saving: {}", slowest.persist)?;
        writeln!(f)?;

        writeln!(f, "Items:")?;
        writeln!(f, "- Loaded: {}", report.loaded())?;
        writeln!(f, "- Transformed: {}", report.transformed())?;
        writeln!(f, "- Persisted: {}", report.persisted())?;
        writeln!(f)?;

        writeln!(f, "Worker Distribution:")?;
        for w in &report.workers {
            writeln!(
                f,
                "  └── Worker {}: [{}, {}) {} persisted, {} skipped, {} ({})",
                w.worker,
                w.range.start,
                w.range.end,
                w.persisted,
                w.skipped.len(),
                w.timings.total(),
                w.state
            )?;
        }

        let skipped: Vec<_> = report.skipped().collect();
        if !skipped.is_empty() {
            writeln!(f)?;
            writeln!(f, "Skipped Items:")?;
            for item in skipped {
                writeln!(f, "  └── #{} during {}: {}", item.index, item.phase, item.reason)?;
            }
        }

        Ok(())
    }
}
