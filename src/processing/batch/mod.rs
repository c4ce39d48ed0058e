mod config;
mod processor;

pub use config::{DEFAULT_CAPACITY, DEFAULT_MAX_DIMENSION, RunConfig, WORKERS_ENV};
pub use processor::BatchProcessor;
