//! Flat-file JSON persistence for deletion tasks.
//!
//! The store holds the complete task set as one JSON array and is rewritten
//! whole on every mutation. A missing file is an empty task set, not an error.

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

use sweepbot_types::DeletionTask;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Durable storage for the task set.
pub struct TaskStore {
    path: PathBuf,
}

impl TaskStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the full task set. A missing file yields an empty set.
    pub fn load(&self) -> Result<Vec<DeletionTask>, StoreError> {
        if !self.path.exists() {
            debug!(path = %self.path.display(), "task file not found, starting empty");
            return Ok(Vec::new());
        }
        let content = fs::read_to_string(&self.path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Overwrite the store with a full snapshot of the task set.
    ///
    /// Writes a sibling temp file and renames it into place so a crash
    /// mid-write never leaves a truncated task file.
    pub fn save(&self, tasks: &[DeletionTask]) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }

        let content = serde_json::to_string_pretty(tasks)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, content)?;
        fs::rename(&tmp, &self.path)?;

        debug!(path = %self.path.display(), count = tasks.len(), "task file written");
        Ok(())
    }
}
