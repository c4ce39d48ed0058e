use crate::worker::WorkerState;

/// Coordination faults between workers. Always fatal to the run.
#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("Thread pool initialization failed: {0}")]
    InitializationError(String),

    #[error("Run aborted: {0}")]
    Aborted(String),

    #[error("Channel to worker {0} disconnected")]
    Disconnected(usize),

    #[error("Invalid state transition for worker {worker}: {from} -> {to}")]
    StateError {
        worker: usize,
        from: WorkerState,
        to: WorkerState,
    },

    #[error("Worker {worker} panicked: {reason}")]
    Panicked { worker: usize, reason: String },
}

pub type WorkerResult<T> = Result<T, WorkerError>;

impl From<rayon::ThreadPoolBuildError> for WorkerError {
    fn from(err: rayon::ThreadPoolBuildError) -> Self {
        WorkerError::InitializationError(err.to_string())
    }
}

impl WorkerError {
    /// A blocking task for `worker` panicked or was cancelled before returning.
    pub fn join(worker: usize, err: tokio::task::JoinError) -> Self {
        WorkerError::Panicked {
            worker,
            reason: err.to_string(),
        }
    }
}
