use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;
use crate::utils::{PipelineError, PipelineResult, is_supported_source};

/// Lists decodable images directly under `dir`, sorted by path.
///
/// Sorting gives every worker the same dense `0..N` indexing without
/// exchanging the list.
pub async fn enumerate_items(dir: impl AsRef<Path>) -> PipelineResult<Vec<PathBuf>> {
    let dir = dir.as_ref();
    let mut entries = fs::read_dir(dir)
        .await
        .map_err(|e| PipelineError::io(format!("Failed to read {}: {}", dir.display(), e)))?;

    let mut items = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if entry.file_type().await?.is_file() && is_supported_source(&path) {
            items.push(path);
        }
    }
    items.sort();

    debug!("Enumerated {} items in {}", items.len(), dir.display());
    Ok(items)
}

/// Creates `dir` and its parents if missing
pub async fn ensure_dir(dir: impl AsRef<Path>) -> PipelineResult<()> {
    let dir = dir.as_ref();
    fs::create_dir_all(dir)
        .await
        .map_err(|e| PipelineError::io(format!("Failed to create {}: {}", dir.display(), e)))
}

/// Get file size in bytes
pub fn file_size(path: impl AsRef<Path>) -> std::io::Result<u64> {
    std::fs::metadata(path.as_ref()).map(|m| m.len())
}
