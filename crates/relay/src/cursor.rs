//! Scan cursor: last source block fully scanned and resolved, persisted across restarts.

use crate::store::{persist, StoreError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Cursor file name within the state directory.
pub const CURSOR_FILE_NAME: &str = "cursor.json";

/// Cursor: last scanned block. `None` means nothing has been scanned yet.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanCursor {
    pub last_scanned_block: Option<u64>,
}

impl ScanCursor {
    pub fn new(last_scanned_block: Option<u64>) -> Self {
        Self { last_scanned_block }
    }

    /// Cursor positioned so the first scan starts at `start_block`.
    pub fn before(start_block: u64) -> Self {
        Self::new(start_block.checked_sub(1))
    }

    /// First block not yet scanned.
    pub fn next_block(&self) -> u64 {
        self.last_scanned_block.map_or(0, |b| b.saturating_add(1))
    }
}

/// File-backed persistence for [ScanCursor].
#[derive(Debug, Clone)]
pub struct CursorStore {
    path: PathBuf,
}

impl CursorStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Helper to get the cursor file path from a state directory.
    pub fn in_dir(state_dir: &Path) -> Self {
        Self::new(state_dir.join(CURSOR_FILE_NAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Persisted cursor, or `None` on first run.
    pub fn load(&self) -> Result<Option<ScanCursor>, StoreError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StoreError::io(&self.path, e)),
        };
        let cursor: ScanCursor =
            serde_json::from_str(&content).map_err(|e| StoreError::corrupt(&self.path, e))?;
        debug!(last_scanned_block = ?cursor.last_scanned_block, "cursor loaded");
        Ok(Some(cursor))
    }

    /// Persisted cursor if present, else one positioned before `start_block`.
    pub fn load_or(&self, start_block: u64) -> Result<ScanCursor, StoreError> {
        match self.load()? {
            Some(c) => {
                info!(last_scanned_block = ?c.last_scanned_block, "resuming from persisted cursor");
                Ok(c)
            }
            None => {
                info!(start_block, "no persisted cursor, starting from configured block");
                Ok(ScanCursor::before(start_block))
            }
        }
    }

    pub async fn save(&self, cursor: &ScanCursor) -> Result<(), StoreError> {
        let content = serde_json::to_vec_pretty(cursor)
            .map_err(|e| StoreError::io(&self.path, io::Error::other(e)))?;
        persist(&self.path, content).await
    }
}
