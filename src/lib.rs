// Module declarations in dependency order
pub mod utils;
pub mod core;
pub mod worker;
pub mod processing;
pub mod benchmarking;
pub mod commands;

// Public exports for external consumers
pub use self::core::{ExecutionMode, ItemStore, Operation, OperationKind, PipelineSpec};
pub use utils::{PipelineError, PipelineResult};
pub use processing::{BatchProcessor, MediaCodec, RunConfig, TransformLibrary};
pub use benchmarking::{RunReport, RunReporter};

// The binary entry point is in main.rs.
