//! ProcessedStore: durable replay protection.
//!
//! The set of [EventKey]s already relayed, persisted as a human-readable JSON map
//! (`"0x<tx_hash>:<log_index>": true`). Every mark is written to a temp file, fsynced, and
//! renamed over the previous state before it is acknowledged, so a crash right after
//! `mark_processed` returns cannot lose the record and a reader never sees a half-written file.
//! The write runs on the blocking pool; readers are not held up while it syncs.

use crate::abi::EventKey;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// State file name within the state directory.
pub const STORE_FILE_NAME: &str = "processed.json";

const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("corrupt state file {}: {reason}", .path.display())]
    Corrupt { path: PathBuf, reason: String },
    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl StoreError {
    pub(crate) fn io(path: &Path, source: io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    pub(crate) fn corrupt(path: &Path, reason: impl ToString) -> Self {
        Self::Corrupt {
            path: path.to_path_buf(),
            reason: reason.to_string(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct ProcessedFile {
    version: u32,
    processed: BTreeMap<String, bool>,
}

/// Write `content` to `path` durably: temp file, fsync, rename, then fsync the directory.
fn write_durable(path: &Path, content: &[u8]) -> io::Result<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;

    let tmp = path.with_extension("json.tmp");
    {
        let mut file = File::create(&tmp)?;
        file.write_all(content)?;
        file.sync_all()?;
    }
    fs::rename(&tmp, path)?;

    // Persist the rename itself.
    #[cfg(unix)]
    File::open(dir)?.sync_all()?;
    Ok(())
}

/// [write_durable] on the blocking pool.
pub(crate) async fn persist(path: &Path, content: Vec<u8>) -> Result<(), StoreError> {
    let target = path.to_path_buf();
    tokio::task::spawn_blocking(move || write_durable(&target, &content))
        .await
        .map_err(|e| StoreError::io(path, io::Error::other(e)))?
        .map_err(|e| StoreError::io(path, e))
}

/// Helper to get the processed-set file path from a state directory.
pub fn store_file_path(state_dir: &Path) -> PathBuf {
    state_dir.join(STORE_FILE_NAME)
}

/// Durable set of event keys already relayed. Single writer, any number of readers.
#[derive(Debug)]
pub struct ProcessedStore {
    path: PathBuf,
    keys: RwLock<HashSet<EventKey>>,
    /// Serializes marks so file writes land in order.
    write: Mutex<()>,
}

impl ProcessedStore {
    /// Load the persisted set at `path` (empty on first run) and open the store over it.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let keys = Self::load(&path)?;
        info!(
            count = keys.len(),
            path = %path.display(),
            "processed store loaded"
        );
        Ok(Self {
            path,
            keys: RwLock::new(keys),
            write: Mutex::new(()),
        })
    }

    /// Read the persisted set. A missing file is an empty set; an unreadable one is
    /// [StoreError::Corrupt], never silently truncated.
    pub fn load(path: &Path) -> Result<HashSet<EventKey>, StoreError> {
        let content = match fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                info!(path = %path.display(), "no processed store yet, starting empty");
                return Ok(HashSet::new());
            }
            Err(e) if e.kind() == io::ErrorKind::InvalidData => {
                return Err(StoreError::corrupt(path, e));
            }
            Err(e) => return Err(StoreError::io(path, e)),
        };
        let file: ProcessedFile =
            serde_json::from_str(&content).map_err(|e| StoreError::corrupt(path, e))?;
        if file.version != SCHEMA_VERSION {
            warn!(
                "processed store version {} differs from current version {}",
                file.version, SCHEMA_VERSION
            );
        }

        let mut keys = HashSet::with_capacity(file.processed.len());
        for (raw, marker) in file.processed {
            let key: EventKey = raw
                .parse()
                .map_err(|e| StoreError::corrupt(path, format!("key {:?}: {}", raw, e)))?;
            if marker {
                keys.insert(key);
            } else {
                warn!(key = %key, "processed store entry marked false, ignoring");
            }
        }
        Ok(keys)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_processed(&self, key: &EventKey) -> bool {
        self.keys
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(key)
    }

    /// Record `key` as relayed. Returns only after the record is durable on disk; the
    /// in-memory set changes only once the write succeeded.
    pub async fn mark_processed(&self, key: EventKey) -> Result<(), StoreError> {
        let _write = self.write.lock().await;
        let content = {
            let keys = self.keys.read().unwrap_or_else(PoisonError::into_inner);
            if keys.contains(&key) {
                warn!(key = %key, "attempted to mark already processed event");
                return Ok(());
            }
            let file = ProcessedFile {
                version: SCHEMA_VERSION,
                processed: keys
                    .iter()
                    .chain(std::iter::once(&key))
                    .map(|k| (k.to_string(), true))
                    .collect(),
            };
            serde_json::to_vec_pretty(&file)
                .map_err(|e| StoreError::io(&self.path, io::Error::other(e)))?
        };
        persist(&self.path, content).await?;

        let mut keys = self.keys.write().unwrap_or_else(PoisonError::into_inner);
        keys.insert(key);
        debug!(key = %key, total = keys.len(), "marked processed");
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.keys.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Consistent copy of the current set.
    pub fn snapshot(&self) -> HashSet<EventKey> {
        self.keys.read().unwrap_or_else(PoisonError::into_inner).clone()
    }
}
