//! Process-local parameter store.

use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock};

use tierstack_common::error::{Result, TierstackError};
use tierstack_common::types::StoreKey;

use crate::backend::{self, ParameterStore, PutOutcome, StoreEntry};

/// A parameter store held in memory for the lifetime of the process.
///
/// Shares the semantics of the durable backends, so one run can wire
/// units through it exactly as separate runs would through a file store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<BTreeMap<StoreKey, StoreEntry>>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Returns whether the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ParameterStore for MemoryStore {
    fn put(&self, key: &StoreKey, value: &str) -> Result<PutOutcome> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        Ok(backend::upsert(&mut entries, key, value))
    }

    fn get(&self, key: &StoreKey) -> Result<StoreEntry> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
            .ok_or_else(|| TierstackError::KeyNotFound {
                key: key.to_string(),
            })
    }

    fn list(&self, prefix: &str) -> Result<Vec<StoreEntry>> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        Ok(backend::entries_under(&entries, prefix))
    }
}
