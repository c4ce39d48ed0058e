mod common;

use common::{ExclusiveTransforms, MemoryCodec, Tracked};
use std::sync::Arc;
use std::sync::atomic::Ordering;

use image_pipeline_lib::benchmarking::Phase;
use image_pipeline_lib::core::{Operation, OperationKind, PipelineSpec};
use image_pipeline_lib::processing::{ApplyOutcome, PipelineApplier};
use image_pipeline_lib::worker::{ItemLockTable, LockGranularity, WorkerPool};

fn rotate_flip_gray() -> PipelineSpec {
    let ops = vec![Operation::rotate(90), Operation::flip(1), Operation::Grayscale];
    PipelineSpec::from_operations(ops).unwrap()
}

fn contended_pipelines(granularity: LockGranularity) {
    const ITEMS: usize = 16;
    const THREADS: usize = 8;
    let spec = rotate_flip_gray();
    let library = ExclusiveTransforms::new(ITEMS);
    let table = ItemLockTable::new(ITEMS, granularity);
    for index in 0..ITEMS {
        *table.acquire(index).unwrap() = Some(Tracked { index, steps: Vec::new() });
    }

    std::thread::scope(|s| {
        for _ in 0..THREADS {
            s.spawn(|| {
                let applier = PipelineApplier::new(&library, &spec);
                for index in 0..ITEMS {
                    assert_eq!(applier.apply_locked(&table, index).unwrap(), ApplyOutcome::Applied);
                }
            });
        }
    });

    assert_eq!(library.violations.load(Ordering::SeqCst), 0);
    let expected: Vec<OperationKind> =
        spec.iter().map(Operation::kind).cycle().take(3 * THREADS).collect();
    let store = table.into_store();
    for index in 0..ITEMS {
        // every run saw a fully applied predecessor, never a partial one
        assert_eq!(store.get(index).unwrap().steps, expected, "item {}", index);
    }
}

#[test]
fn no_thread_observes_a_partial_pipeline_per_item() {
    contended_pipelines(LockGranularity::PerItem);
}

#[test]
fn no_thread_observes_a_partial_pipeline_per_chunk() {
    contended_pipelines(LockGranularity::PerChunk(4));
}

#[tokio::test]
async fn pool_skips_bad_items_and_keeps_the_rest() {
    const ITEMS: usize = 50;
    let codec = Arc::new(MemoryCodec::default());
    let library = Arc::new(ExclusiveTransforms::new(ITEMS));
    let spec =
        PipelineSpec::from_operations(vec![Operation::Grayscale, Operation::EdgeDetect]).unwrap();
    let pool =
        WorkerPool::new(Arc::clone(&codec), Arc::clone(&library), 4, LockGranularity::PerItem, 0);

    let report = pool
        .execute(&spec, Arc::new(MemoryCodec::sources(ITEMS, &[7, 21])))
        .await
        .unwrap();

    // indices 3, 8, 13, ... fail edge detection; neither bad load is among them
    let transform_failures = (0..ITEMS).filter(|i| i % 5 == 3).count();
    assert_eq!(report.range, 0..ITEMS);
    assert_eq!(report.loaded, ITEMS - 2);
    assert_eq!(report.transformed, ITEMS - 2 - transform_failures);
    assert_eq!(report.persisted, report.transformed);

    let mut load_skips: Vec<_> = report
        .skipped
        .iter()
        .filter(|s| s.phase == Phase::Load)
        .map(|s| s.index)
        .collect();
    load_skips.sort_unstable();
    assert_eq!(load_skips, vec![7, 21]);

    let persisted = codec.persisted.lock();
    let full = [OperationKind::Grayscale, OperationKind::EdgeDetect];
    assert!(persisted.values().all(|t| t.steps == full));
    assert!(!persisted.contains_key(&3));
    assert_eq!(library.violations.load(Ordering::SeqCst), 0);
}
