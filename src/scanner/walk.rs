//! Batched directory traversal.
//!
//! Yields (directory, filename) pairs in fixed-size batches rather than
//! collecting the whole tree up front, bounding memory on large trees and
//! giving the engine a natural commit granularity. Order is whatever the
//! filesystem reports; callers must not rely on it.

use std::path::{Path, PathBuf};
use tracing::warn;
use walkdir::WalkDir;

/// Iterator over batches of (directory, filename) pairs.
pub struct FileBatches {
    inner: Option<walkdir::IntoIter>,
    batch_size: usize,
}

/// Walk `root` recursively, yielding batches of at most `batch_size` files.
/// The final partial batch is still yielded. A missing or non-directory
/// `root` produces an empty sequence.
pub fn walk(root: &Path, batch_size: usize) -> FileBatches {
    let inner = if root.is_dir() {
        Some(WalkDir::new(root).follow_links(false).into_iter())
    } else {
        None
    };
    FileBatches {
        inner,
        batch_size: batch_size.max(1),
    }
}

impl Iterator for FileBatches {
    type Item = Vec<(PathBuf, String)>;

    fn next(&mut self) -> Option<Self::Item> {
        let iter = self.inner.as_mut()?;
        let mut batch = Vec::with_capacity(self.batch_size);

        for entry in iter.by_ref() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(error = %e, "skipping unreadable directory entry");
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let directory = entry
                .path()
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_default();
            let name = entry.file_name().to_string_lossy().to_string();
            batch.push((directory, name));
            if batch.len() >= self.batch_size {
                return Some(batch);
            }
        }

        // Traversal finished; emit the partial batch once, then stop.
        self.inner = None;
        if batch.is_empty() {
            None
        } else {
            Some(batch)
        }
    }
}
