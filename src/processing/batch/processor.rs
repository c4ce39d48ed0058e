use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::benchmarking::RunReport;
use crate::core::{ExecutionMode, PipelineSpec};
use crate::processing::{FsCodec, ImageTransforms, MediaCodec, RunValidator, TransformLibrary};
use crate::utils::{PipelineResult, enumerate_items, ensure_dir};
use crate::worker::{DistributedRun, WorkerPool};

use super::RunConfig;

/// Runs one pipeline over a whole item collection in the configured mode.
pub struct BatchProcessor<C, L> {
    codec: Arc<C>,
    library: Arc<L>,
    config: RunConfig,
}

impl BatchProcessor<FsCodec, ImageTransforms> {
    /// On-disk images in, on-disk images out.
    pub fn from_config(config: RunConfig) -> Self {
        let codec = FsCodec::new(&config.output_dir, config.output_format)
            .with_max_item_bytes(config.max_item_bytes)
            .with_max_dimension(config.max_dimension);
        Self::new(Arc::new(codec), Arc::new(ImageTransforms), config)
    }
}

impl<C, L> BatchProcessor<C, L>
where
    C: MediaCodec + 'static,
    L: TransformLibrary<Item = C::Item> + 'static,
{
    pub fn new(codec: Arc<C>, library: Arc<L>, config: RunConfig) -> Self {
        Self { codec, library, config }
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Validates the config, enumerates the input directory and processes it.
    pub async fn run(&self, spec: &PipelineSpec) -> PipelineResult<RunReport> {
        RunValidator::validate_config(&self.config)?;
        RunValidator::validate_pipeline(spec);
        let sources = enumerate_items(&self.config.input_dir).await?;
        info!("Found {} items in {}", sources.len(), self.config.input_dir.display());
        ensure_dir(&self.config.output_dir).await?;
        self.process(spec, sources).await
    }

    /// Processes `sources`, indexed in the given order.
    ///
    /// Fails before any item is touched if the collection is over capacity.
    pub async fn process(
        &self,
        spec: &PipelineSpec,
        sources: Vec<PathBuf>,
    ) -> PipelineResult<RunReport> {
        RunValidator::check_capacity(sources.len(), self.config.capacity)?;

        let item_count = sources.len();
        let parallelism = self.config.worker_count();
        let mode = self.config.mode;
        let sources = Arc::new(sources);
        info!(
            "Processing {} items in {} mode with {} workers: {}",
            item_count, mode, parallelism, spec
        );

        let started = Instant::now();
        let workers = match mode {
            ExecutionMode::Distributed => {
                DistributedRun::new(
                    Arc::clone(&self.codec),
                    Arc::clone(&self.library),
                    parallelism,
                    self.config.load_retries,
                )
                .execute(spec, sources)
                .await?
            }
            ExecutionMode::SharedMemory => {
                let report = WorkerPool::new(
                    Arc::clone(&self.codec),
                    Arc::clone(&self.library),
                    parallelism,
                    self.config.lock_granularity,
                    self.config.load_retries,
                )
                .execute(spec, sources)
                .await?;
                vec![report]
            }
        };

        let report = RunReport {
            mode,
            parallelism,
            item_count,
            workers,
            total_duration: started.elapsed().into(),
        };

        let skipped = report.skipped().count();
        if skipped > 0 {
            warn!("Run finished with {} of {} items skipped", skipped, item_count);
        } else {
            info!("Run finished: {} items persisted", report.persisted());
        }
        debug!("Run took {}", report.total_duration);
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::PipelineError;
    use image::{DynamicImage, Rgb, RgbImage};
    use tempfile::TempDir;

    fn write_images(dir: &std::path::Path, count: usize) {
        for i in 0..count {
            let img = RgbImage::from_pixel(4, 2, Rgb([i as u8 * 20, 50, 200]));
            let path = dir.join(format!("src_{:02}.png", i));
            DynamicImage::ImageRgb8(img).save(path).unwrap();
        }
        std::fs::write(dir.join("notes.txt"), "not an image").unwrap();
    }

    fn config(input: &TempDir, output: &TempDir, mode: ExecutionMode) -> RunConfig {
        RunConfig {
            input_dir: input.path().to_path_buf(),
            output_dir: output.path().join("out"),
            mode,
            workers: Some(3),
            output_format: crate::utils::ImageFormat::PNG,
            pipeline: vec!["g".into(), "r".into()],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn shared_memory_run_writes_every_image() {
        let (input, output) = (TempDir::new().unwrap(), TempDir::new().unwrap());
        write_images(input.path(), 5);
        let config = config(&input, &output, ExecutionMode::SharedMemory);
        let spec = config.build_pipeline();

        let report = BatchProcessor::from_config(config).run(&spec).await.unwrap();

        assert_eq!(report.item_count, 5);
        assert_eq!(report.persisted(), 5);
        let written = output.path().join("out").join("image_4.png");
        let img = image::open(written).unwrap();
        // rotated a quarter turn
        assert_eq!((img.width(), img.height()), (2, 4));
    }

    #[tokio::test]
    async fn distributed_run_reports_each_rank() {
        let (input, output) = (TempDir::new().unwrap(), TempDir::new().unwrap());
        write_images(input.path(), 7);
        let config = config(&input, &output, ExecutionMode::Distributed);
        let spec = config.build_pipeline();

        let report = BatchProcessor::from_config(config).run(&spec).await.unwrap();

        let ranges: Vec<_> = report.workers.iter().map(|w| w.range.clone()).collect();
        assert_eq!(ranges, vec![0..3, 3..6, 6..7]);
        assert_eq!(report.persisted(), 7);
    }

    #[tokio::test]
    async fn oversized_images_are_skipped_by_dimension() {
        let (input, output) = (TempDir::new().unwrap(), TempDir::new().unwrap());
        write_images(input.path(), 2);
        let wide = RgbImage::new(9, 1);
        DynamicImage::ImageRgb8(wide).save(input.path().join("src_02.png")).unwrap();
        let config = RunConfig {
            max_dimension: Some(8),
            ..config(&input, &output, ExecutionMode::Distributed)
        };
        let spec = config.build_pipeline();

        let report = BatchProcessor::from_config(config).run(&spec).await.unwrap();

        assert_eq!(report.persisted(), 2);
        let skipped: Vec<_> = report.skipped().collect();
        assert_eq!(skipped.len(), 1);
        assert_eq!(skipped[0].index, 2);
        assert!(skipped[0].reason.contains("9 pixels"));
    }

    #[tokio::test]
    async fn over_capacity_fails_before_any_work() {
        let (input, output) = (TempDir::new().unwrap(), TempDir::new().unwrap());
        write_images(input.path(), 3);
        let config = RunConfig {
            capacity: Some(2),
            ..config(&input, &output, ExecutionMode::Distributed)
        };

        let err = BatchProcessor::from_config(config)
            .run(&PipelineSpec::default())
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::CapacityExceeded { requested: 3, capacity: 2 }));
        assert_eq!(std::fs::read_dir(output.path().join("out")).unwrap().count(), 0);
    }
}
