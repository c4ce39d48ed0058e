use tracing::debug;

use crate::core::{ItemStore, PipelineSpec};
use crate::processing::TransformLibrary;
use crate::utils::{PipelineError, PipelineResult};
use crate::worker::ItemLockTable;

/// What happened to one slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// Every operation ran and the slot holds the final item
    Applied,
    /// Nothing was loaded at this index
    Empty,
}

/// Runs a pipeline over single items, in operation order.
pub struct PipelineApplier<'a, L> {
    library: &'a L,
    spec: &'a PipelineSpec,
}

impl<'a, L: TransformLibrary> PipelineApplier<'a, L> {
    pub fn new(library: &'a L, spec: &'a PipelineSpec) -> Self {
        Self { library, spec }
    }

    /// Applies the pipeline to the item in `slot`.
    ///
    /// Each step replaces the item, so later operations see earlier output.
    /// On failure the slot is left empty and the error names the step.
    pub fn apply_slot(
        &self,
        index: usize,
        slot: &mut Option<L::Item>,
    ) -> PipelineResult<ApplyOutcome> {
        let Some(mut item) = slot.take() else {
            return Ok(ApplyOutcome::Empty);
        };

        for op in self.spec {
            item = self
                .library
                .transform(op, &item)
                .map_err(|e| PipelineError::TransformFailed {
                    index,
                    operation: op.kind(),
                    reason: e.to_string(),
                })?;
        }

        *slot = Some(item);
        debug!("Applied {} to item {}", self.spec, index);
        Ok(ApplyOutcome::Applied)
    }

    /// Applies the pipeline to `index` in a store owned by the caller.
    pub fn apply(
        &self,
        store: &mut ItemStore<L::Item>,
        index: usize,
    ) -> PipelineResult<ApplyOutcome> {
        match store.slot_mut(index) {
            Some(slot) => self.apply_slot(index, slot),
            None => Ok(ApplyOutcome::Empty),
        }
    }

    /// Applies the pipeline to `index` while holding its guard for every step.
    pub fn apply_locked(
        &self,
        table: &ItemLockTable<L::Item>,
        index: usize,
    ) -> PipelineResult<ApplyOutcome> {
        match table.acquire(index) {
            Some(mut guard) => self.apply_slot(index, &mut guard),
            None => Ok(ApplyOutcome::Empty),
        }
    }
}
