//! Core pipeline types.
//!
//! This module contains the fundamental types used throughout the crate:
//! - [`Operation`] / [`OperationKind`]: Resolved pipeline steps and their identity
//! - [`PipelineSpec`]: The ordered, deduplicated operation list replicated to every worker
//! - [`ItemStore`]: Index-addressed item storage
//! - [`ExecutionMode`]: Distributed or shared-memory scheduling

mod pipeline;
mod store;
mod types;

pub use pipeline::{FixedParameters, ParameterPrompt, PipelineBuilder, PipelineSpec};
pub use store::ItemStore;
pub use types::{ExecutionMode, FlipAxis, Operation, OperationKind};
