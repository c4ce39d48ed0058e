//! Error types for the image pipeline.
//!
//! Provides a hierarchy of error types using `thiserror`. Per-item failures
//! (`ItemTooLarge`, `DecodeFailed`, `TransformFailed`, `PersistFailed`) are
//! recorded and skipped; capacity and coordination failures abort the run.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

use crate::core::OperationKind;
use crate::worker::WorkerError;

/// Failures reported by a [`MediaCodec`](crate::processing::MediaCodec) load.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LoadError {
    /// Source does not exist
    #[error("File not found: {0}")]
    NotFound(PathBuf),
    /// Source exists but could not be read or decoded
    #[error("Unreadable: {0}")]
    Unreadable(String),
    /// Source exceeds a configured per-item bound, in bytes or pixels
    #[error("Item too large: {size} {unit} (limit {limit})")]
    TooLarge {
        size: u64,
        limit: u64,
        unit: &'static str,
    },
}

/// Failure reported by a [`TransformLibrary`](crate::processing::TransformLibrary).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct TransformError(pub String);

impl TransformError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

/// Main error type for the pipeline.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Item exceeds the configured size bound; skipped
    #[error("Item {index} ({path}) too large: {size} {unit} exceeds limit of {limit}")]
    ItemTooLarge {
        index: usize,
        path: PathBuf,
        size: u64,
        limit: u64,
        unit: &'static str,
    },

    /// Item could not be loaded or decoded; skipped
    #[error("Failed to decode item {index} ({path}): {reason}")]
    DecodeFailed {
        index: usize,
        path: PathBuf,
        reason: String,
    },

    /// Token is not part of the recognized operation set
    #[error("Unknown operation: {0}")]
    UnknownOperation(String),

    /// Token was already selected for this pipeline
    #[error("Operation already selected: {0}")]
    DuplicateOperation(OperationKind),

    /// Requested item count is above the configured ceiling
    #[error("Capacity exceeded: {requested} items requested, ceiling is {capacity}")]
    CapacityExceeded { requested: usize, capacity: usize },

    /// Broadcast produced a pipeline that differs from the root's
    #[error("Replication mismatch on worker {worker}: {reason}")]
    ReplicationMismatch { worker: usize, reason: String },

    /// A transform failed partway through an item's pipeline; skipped
    #[error("Operation {operation} failed on item {index}: {reason}")]
    TransformFailed {
        index: usize,
        operation: OperationKind,
        reason: String,
    },

    /// Item could not be written to the sink; logged
    #[error("Failed to persist item {index} to {path}: {reason}")]
    PersistFailed {
        index: usize,
        path: PathBuf,
        reason: String,
    },

    /// Coordination fault raised by the worker layer
    #[error(transparent)]
    Worker(#[from] WorkerError),

    /// Invalid run configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// File IO error outside of per-item handling
    #[error("IO error: {0}")]
    IO(String),
}

/// Convenience result type for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;

impl PipelineError {
    pub fn config<T: Into<String>>(msg: T) -> Self {
        Self::Config(msg.into())
    }

    pub fn io<T: Into<String>>(msg: T) -> Self {
        Self::IO(msg.into())
    }

    pub fn replication(worker: usize, reason: impl Into<String>) -> Self {
        Self::ReplicationMismatch {
            worker,
            reason: reason.into(),
        }
    }

    /// Attaches item context to a codec load failure.
    pub fn from_load(index: usize, path: impl Into<PathBuf>, err: LoadError) -> Self {
        let path = path.into();
        match err {
            LoadError::TooLarge { size, limit, unit } => Self::ItemTooLarge {
                index,
                path,
                size,
                limit,
                unit,
            },
            other => Self::DecodeFailed {
                index,
                path,
                reason: other.to_string(),
            },
        }
    }

    /// Whether this error must abort the whole run rather than skip one item.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::CapacityExceeded { .. }
            | Self::ReplicationMismatch { .. }
            | Self::Worker(_)
            | Self::Config(_)
            | Self::IO(_) => true,
            Self::ItemTooLarge { .. }
            | Self::DecodeFailed { .. }
            | Self::UnknownOperation(_)
            | Self::DuplicateOperation(_)
            | Self::TransformFailed { .. }
            | Self::PersistFailed { .. } => false,
        }
    }
}

impl From<io::Error> for PipelineError {
    fn from(err: io::Error) -> Self {
        Self::IO(err.to_string())
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(err: serde_json::Error) -> Self {
        Self::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_errors_keep_item_context() {
        let err = PipelineError::from_load(
            4,
            "images/a.png",
            LoadError::TooLarge { size: 60_000, limit: 50_000, unit: "pixels" },
        );
        assert!(matches!(err, PipelineError::ItemTooLarge { index: 4, .. }));
        assert!(err.to_string().contains("60000 pixels"));
        assert!(!err.is_fatal());

        let err = PipelineError::from_load(
            2,
            "images/b.png",
            LoadError::Unreadable("bad header".into()),
        );
        assert!(err.to_string().contains("item 2"));
        assert!(err.to_string().contains("bad header"));
    }

    #[test]
    fn only_capacity_and_coordination_failures_are_fatal() {
        assert!(PipelineError::CapacityExceeded { requested: 3, capacity: 2 }.is_fatal());
        assert!(PipelineError::replication(1, "count without payload").is_fatal());
        assert!(!PipelineError::UnknownOperation("zz".into()).is_fatal());
        assert!(
            !PipelineError::PersistFailed {
                index: 0,
                path: "out/image_0.png".into(),
                reason: "disk full".into(),
            }
            .is_fatal()
        );
    }
}
