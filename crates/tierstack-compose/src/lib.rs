//! # tierstack-compose
//!
//! Planning core for multi-unit infrastructure deployments.
//!
//! Handles:
//! - **Unit**: Resource units with declared inputs, outputs, and a renderer.
//! - **Declaration**: Resource declarations handed to the provisioning API.
//! - **Resolver**: Direct (in-process) and indirect (store-mediated) references.
//! - **Graph**: Dependency graph construction and deterministic topological order.
//! - **Composition**: The unit set of one plan and the references between units.
//! - **Topology**: The network, compute, and gateway reference topology.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used, clippy::panic))]

pub mod composition;
pub mod declaration;
pub mod graph;
pub mod resolver;
pub mod topology;
pub mod unit;
