//! Per-request scratch directory owning every intermediate file.

use crate::constants::SCRATCH_PREFIX;
use crate::{Error, Result};
use indexmap::IndexSet;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, warn};

/// Uniquely named directory holding the pre-staged inputs and partial tile
/// results of one request.
///
/// Tracked files are deleted exactly once, either explicitly through
/// [`ScratchSpace::cleanup`] or when the scratch space is dropped. The
/// directory itself goes with the drop, taking along anything a worker wrote
/// but never reported.
#[derive(Debug)]
pub struct ScratchSpace {
    dir: TempDir,
    files: Mutex<IndexSet<PathBuf>>,
}

impl ScratchSpace {
    /// Create the scratch directory under `root`, or the system temp dir
    pub fn new(root: Option<&Path>) -> Result<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(SCRATCH_PREFIX);
        let dir = match root {
            Some(root) => {
                std::fs::create_dir_all(root).map_err(|e| {
                    Error::io(
                        format!("Failed to create scratch root {}", root.display()),
                        e,
                    )
                })?;
                builder.tempdir_in(root)
            }
            None => builder.tempdir(),
        }
        .map_err(|e| Error::io("Failed to create scratch directory", e))?;

        debug!("Created scratch directory {}", dir.path().display());
        Ok(Self {
            dir,
            files: Mutex::new(IndexSet::new()),
        })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Take ownership of a file; it will be removed on cleanup
    pub fn track(&self, path: impl Into<PathBuf>) {
        self.files.lock().insert(path.into());
    }

    pub fn tracked(&self) -> usize {
        self.files.lock().len()
    }

    pub fn is_tracked(&self, path: &Path) -> bool {
        self.files.lock().contains(path)
    }

    /// Remove one tracked file now. Returns false when it was not tracked.
    pub fn remove(&self, path: &Path) -> bool {
        if !self.files.lock().shift_remove(path) {
            return false;
        }
        delete(path);
        true
    }

    /// Remove every tracked file, returning how many were tracked
    pub fn cleanup(&self) -> usize {
        let files: Vec<PathBuf> = self.files.lock().drain(..).collect();
        for path in &files {
            delete(path);
        }
        if !files.is_empty() {
            debug!(
                "Removed {} temporary files from {}",
                files.len(),
                self.dir.path().display()
            );
        }
        files.len()
    }
}

impl Drop for ScratchSpace {
    fn drop(&mut self) {
        self.cleanup();
    }
}

fn delete(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!("Failed to remove temporary file {}: {}", path.display(), e);
        }
    }
}
