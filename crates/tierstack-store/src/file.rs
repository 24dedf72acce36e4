//! Parameter store backed by a JSON file.
//!
//! Entries outlive the process that wrote them, so a unit deployed in one
//! run can be consumed by a unit deployed in a later, separate run.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use tierstack_common::error::{Result, TierstackError};
use tierstack_common::types::StoreKey;

use crate::backend::{self, ParameterStore, PutOutcome, StoreEntry};

/// Parameter store persisted as a JSON array of entries.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileStore {
    /// Opens the store at `path`, creating its parent directory if needed.
    ///
    /// The file itself is created on the first write.
    ///
    /// # Errors
    ///
    /// Returns an error if the parent directory cannot be created.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| TierstackError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }
        tracing::info!(path = %path.display(), "opening parameter store");
        Ok(Self {
            path,
            lock: Mutex::new(()),
        })
    }

    /// Returns the backing file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_entries(&self) -> Result<BTreeMap<StoreKey, StoreEntry>> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }
        let content = std::fs::read_to_string(&self.path).map_err(|e| TierstackError::Io {
            path: self.path.clone(),
            source: e,
        })?;
        let entries: Vec<StoreEntry> = serde_json::from_str(&content)?;
        Ok(entries.into_iter().map(|e| (e.key.clone(), e)).collect())
    }

    fn write_entries(&self, entries: &BTreeMap<StoreKey, StoreEntry>) -> Result<()> {
        let list: Vec<&StoreEntry> = entries.values().collect();
        let json = serde_json::to_string_pretty(&list)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json).map_err(|e| TierstackError::Io {
            path: tmp.clone(),
            source: e,
        })?;
        std::fs::rename(&tmp, &self.path).map_err(|e| TierstackError::Io {
            path: self.path.clone(),
            source: e,
        })
    }
}

impl ParameterStore for FileStore {
    fn put(&self, key: &StoreKey, value: &str) -> Result<PutOutcome> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut entries = self.read_entries()?;
        let outcome = backend::upsert(&mut entries, key, value);
        if outcome != PutOutcome::Unchanged {
            self.write_entries(&entries)?;
        }
        Ok(outcome)
    }

    fn get(&self, key: &StoreKey) -> Result<StoreEntry> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.read_entries()?
            .remove(key)
            .ok_or_else(|| TierstackError::KeyNotFound {
                key: key.to_string(),
            })
    }

    fn list(&self, prefix: &str) -> Result<Vec<StoreEntry>> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(backend::entries_under(&self.read_entries()?, prefix))
    }
}
