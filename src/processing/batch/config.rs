use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::core::{ExecutionMode, FixedParameters, PipelineSpec};
use crate::utils::{ImageFormat, PipelineError, PipelineResult};
use crate::worker::LockGranularity;

/// Environment variable consulted when no worker count is configured
pub const WORKERS_ENV: &str = "IMAGE_PIPELINE_WORKERS";

/// Largest item collection accepted unless configured otherwise
pub const DEFAULT_CAPACITY: usize = 10_000;

/// Widest or tallest image loaded unless configured otherwise
pub const DEFAULT_MAX_DIMENSION: u32 = 50_000;

/// Everything a run needs, loaded from JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    pub mode: ExecutionMode,
    /// Ranks or pool threads; falls back to the environment, then the CPU count
    pub workers: Option<usize>,
    /// Ceiling on the item count; `null` disables it
    pub capacity: Option<usize>,
    pub max_item_bytes: Option<u64>,
    /// Bound on width and height in pixels; `null` disables it
    pub max_dimension: Option<u32>,
    pub load_retries: u32,
    pub lock_granularity: LockGranularity,
    pub output_format: ImageFormat,
    /// Operation tokens in selection order
    pub pipeline: Vec<String>,
    pub rotate_angle: i32,
    pub flip_code: i32,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::from("input"),
            output_dir: PathBuf::from("output"),
            mode: ExecutionMode::default(),
            workers: None,
            capacity: Some(DEFAULT_CAPACITY),
            max_item_bytes: None,
            max_dimension: Some(DEFAULT_MAX_DIMENSION),
            load_retries: 0,
            lock_granularity: LockGranularity::default(),
            output_format: ImageFormat::default(),
            pipeline: Vec::new(),
            rotate_angle: 90,
            flip_code: 1,
        }
    }
}

impl RunConfig {
    pub fn from_json(json: &str) -> PipelineResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> PipelineResult<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            PipelineError::config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let config = Self::from_json(&json)?;
        debug!("Loaded run config from {}", path.display());
        Ok(config)
    }

    /// Worker count from config, then [`WORKERS_ENV`], then detected CPUs.
    pub fn worker_count(&self) -> usize {
        resolve_workers(self.workers, std::env::var(WORKERS_ENV).ok().as_deref())
    }

    /// Resolves the configured tokens into a pipeline.
    ///
    /// Rejected tokens are logged and dropped; there is no one to re-prompt.
    pub fn build_pipeline(&self) -> PipelineSpec {
        let mut params = FixedParameters {
            rotate_angle: self.rotate_angle,
            flip_code: self.flip_code,
        };
        PipelineSpec::build(self.pipeline.iter().map(String::as_str), &mut params)
    }
}

fn resolve_workers(configured: Option<usize>, env: Option<&str>) -> usize {
    configured
        .or_else(|| env.and_then(|v| v.trim().parse().ok()))
        .filter(|n| *n > 0)
        .unwrap_or_else(num_cpus::get)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Operation;

    #[test]
    fn missing_fields_take_defaults() {
        let config = RunConfig::from_json(r#"{ "mode": "distributed", "workers": 3 }"#).unwrap();
        assert_eq!(config.mode, ExecutionMode::Distributed);
        assert_eq!(config.capacity, Some(DEFAULT_CAPACITY));
        assert_eq!(config.max_dimension, Some(DEFAULT_MAX_DIMENSION));
        assert_eq!(config.load_retries, 0);
        assert_eq!(config.lock_granularity, LockGranularity::PerItem);
        assert_eq!(config.worker_count(), 3);
    }

    #[test]
    fn full_config_parses() {
        let config = RunConfig::from_json(
            r#"{
                "input_dir": "in",
                "output_dir": "out",
                "mode": "shared-memory",
                "capacity": null,
                "max_dimension": 4096,
                "lock_granularity": { "per-chunk": 8 },
                "output_format": "png",
                "pipeline": ["r", "flip", "g"],
                "rotate_angle": -90,
                "flip_code": 0
            }"#,
        )
        .unwrap();

        assert_eq!(config.capacity, None);
        assert_eq!(config.max_dimension, Some(4096));
        assert_eq!(config.lock_granularity, LockGranularity::PerChunk(8));
        assert_eq!(config.output_format, ImageFormat::PNG);
        assert_eq!(
            config.build_pipeline().operations(),
            &[Operation::rotate(270), Operation::flip(0), Operation::Grayscale]
        );
    }

    #[test]
    fn bad_tokens_are_dropped_from_the_pipeline() {
        let config = RunConfig {
            pipeline: vec!["g".into(), "sharpen".into(), "g".into(), "ed".into()],
            ..Default::default()
        };
        assert_eq!(
            config.build_pipeline().operations(),
            &[Operation::Grayscale, Operation::EdgeDetect]
        );
    }

    #[test]
    fn unknown_mode_is_a_config_error() {
        let err = RunConfig::from_json(r#"{ "mode": "cluster" }"#).unwrap_err();
        assert!(matches!(err, PipelineError::Config(_)));
    }

    #[test]
    fn worker_resolution_order() {
        assert_eq!(resolve_workers(Some(2), Some("8")), 2);
        assert_eq!(resolve_workers(None, Some(" 8 ")), 8);
        assert_eq!(resolve_workers(None, Some("many")), num_cpus::get());
        assert_eq!(resolve_workers(Some(0), None), num_cpus::get());
    }
}
