//! # tierstack-common
//!
//! Shared types, error definitions, configuration models, and constants
//! used across the entire Tierstack workspace.
//!
//! This crate is the leaf of the dependency graph: it depends on no other
//! internal crate and provides the primitives (store keys, namespaces,
//! unit lifecycle states) that every other crate builds upon.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used, clippy::panic))]

pub mod config;
pub mod constants;
pub mod error;
pub mod types;
