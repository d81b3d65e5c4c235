//! Persisted set of already processed item identifiers
//!
//! The store is a single plain-text file holding one comma-joined line. It is
//! only ever touched from the orchestrating task and does no locking, so one
//! run at a time per checkpoint path.

use crate::config::DEFAULT_CHECKPOINT_FILE;
use crate::error::Result;
use mirror_common::ItemId;
use std::collections::HashSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info};

#[derive(Debug, Clone)]
pub struct CheckpointStore {
    path: PathBuf,
}

impl CheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `<temp_dir>/iqdb-mirror-export-state`
    pub fn default_path() -> PathBuf {
        std::env::temp_dir().join(DEFAULT_CHECKPOINT_FILE)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the persisted identifiers
    ///
    /// `None` when no checkpoint has been written yet (missing or empty file).
    pub async fn load(&self) -> Result<Option<HashSet<ItemId>>> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let line = contents.trim();
        if line.is_empty() {
            return Ok(None);
        }

        let ids = line
            .split(',')
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(ItemId::parse)
            .collect::<std::result::Result<HashSet<_>, _>>()?;

        debug!("Loaded {} processed ids from {}", ids.len(), self.path.display());
        Ok(Some(ids))
    }

    /// Persist the union of the stored identifiers and `additions`
    ///
    /// Fails only when the existing checkpoint cannot be read; write failures
    /// are handled like [`save`](Self::save).
    pub async fn append(&self, additions: &HashSet<ItemId>) -> Result<()> {
        let mut state = self.load().await?.unwrap_or_default();
        state.extend(additions.iter().cloned());
        self.save(&state).await;
        Ok(())
    }

    /// Overwrite the stored identifiers
    ///
    /// A write failure is logged and otherwise ignored.
    pub async fn save(&self, state: &HashSet<ItemId>) {
        let mut ids: Vec<&str> = state.iter().map(ItemId::as_str).collect();
        ids.sort_unstable();
        let line = ids.join(",");

        match tokio::fs::write(&self.path, line).await {
            Ok(()) => info!("Saved checkpoint with {} ids to {}", ids.len(), self.path.display()),
            Err(e) => error!("Failed to write checkpoint {}: {}", self.path.display(), e),
        }
    }
}
