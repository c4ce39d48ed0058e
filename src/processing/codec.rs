use image::DynamicImage;
use image::codecs::jpeg::JpegEncoder;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::utils::{ImageFormat, LoadError, PipelineError, PipelineResult, file_size};

/// Source and sink for items.
///
/// `load` is called once per index by the worker that owns it, `persist`
/// once per surviving item after the transform phase.
pub trait MediaCodec: Send + Sync {
    type Item: Send;

    fn load(&self, path: &Path) -> Result<Self::Item, LoadError>;

    /// Writes `item` under its global index and returns where it went.
    fn persist(&self, item: &Self::Item, index: usize) -> PipelineResult<PathBuf>;
}

/// Loads `path`, retrying transient read failures up to `retries` more times.
///
/// Missing and oversized sources are never retried.
pub fn load_with_retry<C>(codec: &C, path: &Path, retries: u32) -> Result<C::Item, LoadError>
where
    C: MediaCodec + ?Sized,
{
    let mut attempt = 0;
    loop {
        match codec.load(path) {
            Err(LoadError::Unreadable(reason)) if attempt < retries => {
                attempt += 1;
                debug!("Retrying {} ({}/{}): {}", path.display(), attempt, retries, reason);
            }
            other => return other,
        }
    }
}

/// Reads images from disk and writes them as `image_{index}.{ext}`.
#[derive(Debug, Clone)]
pub struct FsCodec {
    output_dir: PathBuf,
    format: ImageFormat,
    max_item_bytes: Option<u64>,
    max_dimension: Option<u32>,
}

impl FsCodec {
    pub fn new(output_dir: impl Into<PathBuf>, format: ImageFormat) -> Self {
        Self {
            output_dir: output_dir.into(),
            format,
            max_item_bytes: None,
            max_dimension: None,
        }
    }

    pub fn with_max_item_bytes(mut self, limit: Option<u64>) -> Self {
        self.max_item_bytes = limit;
        self
    }

    /// Bounds the larger of width and height, read from the header before decoding.
    pub fn with_max_dimension(mut self, limit: Option<u32>) -> Self {
        self.max_dimension = limit;
        self
    }

    pub fn output_path(&self, index: usize) -> PathBuf {
        self.output_dir
            .join(format!("image_{}.{}", index, self.format.primary_extension()))
    }

    fn encode(&self, item: &DynamicImage, path: &Path) -> Result<(), String> {
        match self.format {
            ImageFormat::JPEG => {
                // JPEG carries no alpha
                let flat = match item {
                    DynamicImage::ImageLuma8(_) | DynamicImage::ImageRgb8(_) => item.clone(),
                    other if other.color().has_color() => DynamicImage::ImageRgb8(other.to_rgb8()),
                    other => DynamicImage::ImageLuma8(other.to_luma8()),
                };
                let file = File::create(path).map_err(|e| e.to_string())?;
                let quality = self.format.default_quality();
                let encoder = JpegEncoder::new_with_quality(BufWriter::new(file), quality);
                flat.write_with_encoder(encoder).map_err(|e| e.to_string())
            }
            ImageFormat::PNG => item
                .save_with_format(path, self.format.codec_format())
                .map_err(|e| e.to_string()),
            ImageFormat::WebP => DynamicImage::ImageRgba8(item.to_rgba8())
                .save_with_format(path, self.format.codec_format())
                .map_err(|e| e.to_string()),
        }
    }
}

impl MediaCodec for FsCodec {
    type Item = DynamicImage;

    fn load(&self, path: &Path) -> Result<DynamicImage, LoadError> {
        let size = file_size(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => LoadError::NotFound(path.to_path_buf()),
            _ => LoadError::Unreadable(e.to_string()),
        })?;

        if let Some(limit) = self.max_item_bytes {
            if size > limit {
                return Err(LoadError::TooLarge { size, limit, unit: "bytes" });
            }
        }

        if let Some(limit) = self.max_dimension {
            let (width, height) =
                image::image_dimensions(path).map_err(|e| LoadError::Unreadable(e.to_string()))?;
            let longest = width.max(height);
            if longest > limit {
                return Err(LoadError::TooLarge {
                    size: longest.into(),
                    limit: limit.into(),
                    unit: "pixels",
                });
            }
        }

        image::open(path).map_err(|e| LoadError::Unreadable(e.to_string()))
    }

    fn persist(&self, item: &DynamicImage, index: usize) -> PipelineResult<PathBuf> {
        let path = self.output_path(index);
        self.encode(item, &path).map_err(|reason| PipelineError::PersistFailed {
            index,
            path: path.clone(),
            reason,
        })?;
        Ok(path)
    }
}
