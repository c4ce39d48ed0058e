pub mod error;
pub mod formats;
pub mod fs;

pub use error::{LoadError, PipelineError, PipelineResult, TransformError};
pub use formats::{ImageFormat, is_supported_source};
pub use fs::{enumerate_items, ensure_dir, file_size};
