//! Parameter store backend abstraction.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tierstack_common::error::Result;
use tierstack_common::types::StoreKey;

/// A single stored parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreEntry {
    /// Hierarchical key.
    pub key: StoreKey,
    /// String value.
    pub value: String,
    /// Starts at 1 and increases each time the value changes.
    pub version: u64,
    /// Time of the last value change.
    pub last_modified: DateTime<Utc>,
}

/// Effect of a `put` on the stored state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PutOutcome {
    /// The key did not exist and was written.
    Created,
    /// The key existed with a different value, which was overwritten.
    Updated,
    /// The key already held this exact value; nothing changed.
    Unchanged,
}

/// A durable, namespaced, hierarchical string key-value store.
///
/// Implementations must be safe for concurrent reads, and `put` must be an
/// idempotent upsert: the last write wins and rewriting an identical value
/// changes nothing.
pub trait ParameterStore: Send + Sync {
    /// Upserts `value` at `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot persist the write.
    fn put(&self, key: &StoreKey, value: &str) -> Result<PutOutcome>;

    /// Reads the entry at `key`.
    ///
    /// # Errors
    ///
    /// Returns `KeyNotFound` if the key has never been written, or a
    /// backend error if the store cannot be read.
    fn get(&self, key: &StoreKey) -> Result<StoreEntry>;

    /// Lists every entry whose key lies under `prefix`, in key order.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    fn list(&self, prefix: &str) -> Result<Vec<StoreEntry>>;
}

/// Applies an upsert to an in-memory entry map.
pub(crate) fn upsert(
    entries: &mut BTreeMap<StoreKey, StoreEntry>,
    key: &StoreKey,
    value: &str,
) -> PutOutcome {
    match entries.get_mut(key) {
        Some(entry) if entry.value == value => PutOutcome::Unchanged,
        Some(entry) => {
            value.clone_into(&mut entry.value);
            entry.version += 1;
            entry.last_modified = Utc::now();
            PutOutcome::Updated
        }
        None => {
            let _ = entries.insert(
                key.clone(),
                StoreEntry {
                    key: key.clone(),
                    value: value.to_owned(),
                    version: 1,
                    last_modified: Utc::now(),
                },
            );
            PutOutcome::Created
        }
    }
}

/// Collects the entries under `prefix` from an in-memory entry map.
pub(crate) fn entries_under(
    entries: &BTreeMap<StoreKey, StoreEntry>,
    prefix: &str,
) -> Vec<StoreEntry> {
    entries
        .values()
        .filter(|entry| entry.key.starts_with(prefix))
        .cloned()
        .collect()
}
