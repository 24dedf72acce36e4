//! # tierstack-store
//!
//! Client for the parameter store: the durable, namespaced, hierarchical
//! key-value store through which independently deployed units exchange
//! outputs.
//!
//! - **Backend**: the [`ParameterStore`](backend::ParameterStore) trait and
//!   its entry model.
//! - **Memory**: a process-local backend for single runs and tests.
//! - **File**: a JSON-file backend that persists across separate runs.
//! - **Client**: typed reads and writes, including deferred reads that are
//!   only resolved when a deployment actually needs the value.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used, clippy::panic))]

pub mod backend;
pub mod client;
pub mod file;
pub mod memory;

pub use backend::{ParameterStore, PutOutcome, StoreEntry};
pub use client::{DeferredValue, ParameterClient};
pub use file::FileStore;
pub use memory::MemoryStore;
