//! # tierstack-sdk
//!
//! Public SDK for using Tierstack as a Rust library.
//!
//! [`PlanBuilder`](builder::PlanBuilder) turns a
//! [`PlanConfig`](tierstack_common::config::PlanConfig) into a deployable
//! [`Plan`](builder::Plan): it picks the reference resolution strategy from
//! the configured topology, builds the three-tier composition, and wires a
//! provisioner and parameter store.
//!
//! # Example
//!
//! ```rust
//! use tierstack_common::config::PlanConfig;
//! use tierstack_sdk::builder::PlanBuilder;
//!
//! let mut plan = PlanBuilder::new(PlanConfig::default()).build().unwrap();
//! assert_eq!(plan.order().unwrap(), vec!["network", "compute", "gateway"]);
//! let report = plan.deploy().unwrap();
//! assert!(report.succeeded());
//! ```

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used, clippy::panic))]

pub mod builder;

pub use tierstack_compose::topology::Tier;
pub use tierstack_runtime::event::{DeployEvent, EventListener, EventLog};
pub use tierstack_runtime::report::DeploymentReport;
