//! Deployment runs for tierstack compositions.
//!
//! A [`deployer::Deployer`] walks a composition in dependency order and
//! drives each unit through its lifecycle: resolve inputs, render, hand the
//! declarations to a [`provisioner::Provisioner`], publish outputs. The
//! outcome of a run is a [`report::DeploymentReport`].

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used, clippy::panic))]

pub mod deployer;
pub mod event;
pub mod provisioner;
pub mod report;
pub mod state;
