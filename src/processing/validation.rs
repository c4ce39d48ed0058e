use std::path::Path;
use tracing::warn;

use crate::core::PipelineSpec;
use crate::processing::batch::RunConfig;
use crate::utils::{PipelineError, PipelineResult};
use crate::worker::LockGranularity;

pub struct RunValidator;

impl RunValidator {
    /// Rejects configurations that cannot start a run.
    pub fn validate_config(config: &RunConfig) -> PipelineResult<()> {
        if config.workers == Some(0) {
            return Err(PipelineError::config("Worker count must be at least 1"));
        }

        if config.lock_granularity == LockGranularity::PerChunk(0) {
            return Err(PipelineError::config("Lock chunk width must be at least 1"));
        }

        if config.capacity == Some(0) {
            return Err(PipelineError::config("Capacity must be at least 1 when set"));
        }

        if config.max_dimension == Some(0) {
            return Err(PipelineError::config("Maximum dimension must be at least 1 when set"));
        }

        Self::validate_input_dir(&config.input_dir)?;
        Ok(())
    }

    /// Whether `spec` does any work. An empty pipeline is allowed but warned about.
    pub fn validate_pipeline(spec: &PipelineSpec) -> bool {
        if spec.is_empty() {
            warn!("No operations selected; items will be copied through unchanged");
            return false;
        }
        true
    }

    fn validate_input_dir(path: &Path) -> PipelineResult<()> {
        if !path.exists() {
            return Err(PipelineError::config(format!(
                "Input directory does not exist: {}",
                path.display()
            )));
        }
        if !path.is_dir() {
            return Err(PipelineError::config(format!(
                "Input path is not a directory: {}",
                path.display()
            )));
        }
        Ok(())
    }

    /// Fails fast when `count` items would not fit under the ceiling.
    pub fn check_capacity(count: usize, capacity: Option<usize>) -> PipelineResult<()> {
        match capacity {
            Some(capacity) if count > capacity => Err(PipelineError::CapacityExceeded {
                requested: count,
                capacity,
            }),
            _ => Ok(()),
        }
    }
}
