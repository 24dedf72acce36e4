//! Typed parameter store client with deferred reads.
//!
//! An immediate [`ParameterClient::get`] fails with `KeyNotFound` when the
//! key is absent. A [`DeferredValue`] obtained from
//! [`ParameterClient::get_deferred`] never fails when created; it is a
//! placeholder that only reads the store when [`ParameterClient::resolve`]
//! is called at deploy time, and fails then with `UnresolvedReference` if
//! the key is still absent.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tierstack_common::error::{Result, TierstackError};
use tierstack_common::types::StoreKey;

use crate::backend::{ParameterStore, PutOutcome, StoreEntry};

/// Placeholder for a store value that is read at deploy time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeferredValue {
    key: StoreKey,
    consumer: Option<(String, String)>,
}

impl DeferredValue {
    /// Records which unit input this placeholder will fill, for error reporting.
    #[must_use]
    pub fn for_input(mut self, unit: impl Into<String>, input: impl Into<String>) -> Self {
        self.consumer = Some((unit.into(), input.into()));
        self
    }

    /// Returns the key this placeholder reads.
    #[must_use]
    pub const fn key(&self) -> &StoreKey {
        &self.key
    }
}

impl fmt::Display for DeferredValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${{lookup:{}}}", self.key)
    }
}

/// Client over a shared [`ParameterStore`] backend.
#[derive(Clone)]
pub struct ParameterClient {
    store: Arc<dyn ParameterStore>,
}

impl fmt::Debug for ParameterClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParameterClient").finish_non_exhaustive()
    }
}

impl ParameterClient {
    /// Creates a client over `store`.
    #[must_use]
    pub fn new(store: Arc<dyn ParameterStore>) -> Self {
        Self { store }
    }

    /// Upserts `value` at `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot persist the write.
    pub fn put(&self, key: &StoreKey, value: &str) -> Result<PutOutcome> {
        let outcome = self.store.put(key, value)?;
        match outcome {
            PutOutcome::Unchanged => tracing::debug!(%key, "parameter unchanged"),
            PutOutcome::Created | PutOutcome::Updated => {
                tracing::info!(%key, ?outcome, "parameter written");
            }
        }
        Ok(outcome)
    }

    /// Reads the value at `key` immediately.
    ///
    /// # Errors
    ///
    /// Returns `KeyNotFound` if the key has never been written.
    pub fn get(&self, key: &StoreKey) -> Result<String> {
        tracing::debug!(%key, "reading parameter");
        self.store.get(key).map(|entry| entry.value)
    }

    /// Returns a placeholder for `key` without touching the store.
    #[must_use]
    pub fn get_deferred(&self, key: StoreKey) -> DeferredValue {
        tracing::debug!(%key, "deferring parameter lookup");
        DeferredValue {
            key,
            consumer: None,
        }
    }

    /// Reads the concrete value behind a placeholder.
    ///
    /// # Errors
    ///
    /// Returns `UnresolvedReference` if the key is still absent, or the
    /// backend error if the store cannot be read.
    pub fn resolve(&self, deferred: &DeferredValue) -> Result<String> {
        match self.get(&deferred.key) {
            Ok(value) => Ok(value),
            Err(TierstackError::KeyNotFound { key }) => {
                let (unit, input) = deferred
                    .consumer
                    .clone()
                    .unwrap_or_else(|| ("<unbound>".into(), "<unbound>".into()));
                Err(TierstackError::UnresolvedReference { unit, input, key })
            }
            Err(e) => Err(e),
        }
    }

    /// Lists entries under `prefix`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub fn list(&self, prefix: &str) -> Result<Vec<StoreEntry>> {
        self.store.list(prefix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;

    fn client() -> ParameterClient {
        ParameterClient::new(Arc::new(MemoryStore::new()))
    }

    fn key(raw: &str) -> StoreKey {
        StoreKey::parse(raw).expect("valid key")
    }

    #[test]
    fn immediate_get_of_missing_key_fails() {
        let client = client();
        assert!(matches!(
            client.get(&key("/app/network/id")),
            Err(TierstackError::KeyNotFound { .. })
        ));
    }

    #[test]
    fn deferred_read_succeeds_before_key_exists() {
        let client = client();
        let deferred = client.get_deferred(key("/app/network/id"));
        assert_eq!(deferred.key().as_str(), "/app/network/id");
        assert_eq!(deferred.to_string(), "${lookup:/app/network/id}");
    }

    #[test]
    fn deferred_read_resolves_after_put() {
        let client = client();
        let deferred = client.get_deferred(key("/app/network/id"));
        let _ = client.put(&key("/app/network/id"), "vpc-0abc").expect("put");
        assert_eq!(client.resolve(&deferred).expect("resolve"), "vpc-0abc");
    }

    #[test]
    fn deferred_read_of_absent_key_is_unresolved() {
        let client = client();
        let deferred = client
            .get_deferred(key("/app/compute/serviceArn"))
            .for_input("gateway", "serviceArn");
        match client.resolve(&deferred) {
            Err(TierstackError::UnresolvedReference { unit, input, key }) => {
                assert_eq!(unit, "gateway");
                assert_eq!(input, "serviceArn");
                assert_eq!(key, "/app/compute/serviceArn");
            }
            other => panic!("expected UnresolvedReference, got {other:?}"),
        }
    }

    #[test]
    fn resolve_sees_latest_write() {
        let client = client();
        let k = key("/app/compute/serviceArn");
        let deferred = client.get_deferred(k.clone());
        let _ = client.put(&k, "arn:old").expect("put");
        let _ = client.put(&k, "arn:new").expect("put");
        assert_eq!(client.resolve(&deferred).expect("resolve"), "arn:new");
    }

    #[test]
    fn clients_share_the_backend() {
        let store: Arc<dyn ParameterStore> = Arc::new(MemoryStore::new());
        let writer = ParameterClient::new(Arc::clone(&store));
        let reader = ParameterClient::new(store);
        let _ = writer.put(&key("/app/network/id"), "vpc-1").expect("put");
        assert_eq!(reader.get(&key("/app/network/id")).expect("get"), "vpc-1");
    }
}
