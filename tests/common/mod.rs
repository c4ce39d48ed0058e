#![allow(dead_code)]

use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use image_pipeline_lib::core::{Operation, OperationKind};
use image_pipeline_lib::utils::{LoadError, TransformError};
use image_pipeline_lib::{MediaCodec, PipelineResult, TransformLibrary};

/// Item that remembers which operations touched it, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tracked {
    pub index: usize,
    pub steps: Vec<OperationKind>,
}

/// In-memory source and sink. Source paths are `item_{index}`; any path
/// starting with `bad` fails to decode.
#[derive(Default)]
pub struct MemoryCodec {
    pub persisted: Mutex<BTreeMap<usize, Tracked>>,
    pub loads: AtomicUsize,
}

impl MemoryCodec {
    pub fn sources(count: usize, bad: &[usize]) -> Vec<PathBuf> {
        (0..count)
            .map(|i| {
                if bad.contains(&i) {
                    PathBuf::from(format!("bad_{}", i))
                } else {
                    PathBuf::from(format!("item_{}", i))
                }
            })
            .collect()
    }
}

impl MediaCodec for MemoryCodec {
    type Item = Tracked;

    fn load(&self, path: &Path) -> Result<Tracked, LoadError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        let name = path.display().to_string();
        let index = name
            .strip_prefix("item_")
            .and_then(|n| n.parse().ok())
            .ok_or_else(|| LoadError::Unreadable(format!("cannot decode {}", name)))?;
        Ok(Tracked { index, steps: Vec::new() })
    }

    fn persist(&self, item: &Tracked, index: usize) -> PipelineResult<PathBuf> {
        assert_eq!(item.index, index, "item persisted under the wrong index");
        self.persisted.lock().insert(index, item.clone());
        Ok(PathBuf::from(format!("image_{}", index)))
    }
}

/// Transform library that fails the test if two threads ever work on the
/// same item at once.
pub struct ExclusiveTransforms {
    busy: Vec<AtomicBool>,
    pub violations: AtomicUsize,
    pub calls: AtomicUsize,
}

impl ExclusiveTransforms {
    pub fn new(items: usize) -> Self {
        Self {
            busy: (0..items).map(|_| AtomicBool::new(false)).collect(),
            violations: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
        }
    }
}

impl TransformLibrary for ExclusiveTransforms {
    type Item = Tracked;

    fn transform(&self, op: &Operation, item: &Tracked) -> Result<Tracked, TransformError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let busy = &self.busy[item.index];
        if busy.swap(true, Ordering::SeqCst) {
            self.violations.fetch_add(1, Ordering::SeqCst);
        }
        std::thread::yield_now();

        let mut next = item.clone();
        next.steps.push(op.kind());
        busy.store(false, Ordering::SeqCst);

        if matches!(op, Operation::EdgeDetect) && item.index % 5 == 3 {
            return Err(TransformError::new("no edges found"));
        }
        Ok(next)
    }
}
