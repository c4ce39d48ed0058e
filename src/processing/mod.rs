mod applier;
pub mod batch;
mod codec;
mod transforms;
mod validation;

pub use applier::{ApplyOutcome, PipelineApplier};
pub use batch::{BatchProcessor, RunConfig};
pub use codec::{FsCodec, MediaCodec, load_with_retry};
pub use transforms::{ImageTransforms, TransformLibrary};
pub use validation::RunValidator;
