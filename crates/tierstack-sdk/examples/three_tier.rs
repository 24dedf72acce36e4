//! Three-tier deployment via the Tierstack SDK.
//!
//! Deploys the network and compute tiers in one run, then the gateway in a
//! second, independent run that only shares the parameter store file with
//! the first.
//!
//! Run with:
//! ```bash
//! cargo run -p tierstack-sdk --example three_tier
//! ```

use std::path::Path;
use std::sync::Arc;

use tierstack_common::error::TierstackError;
use tierstack_sdk::Tier;
use tierstack_sdk::builder::PlanBuilder;
use tierstack_store::FileStore;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter("info")
        .init();

    tracing::info!("=== Tierstack SDK: Three-Tier Deployment ===");

    let config_path = Path::new(env!("CARGO_MANIFEST_DIR")).join("examples/plan.yaml");
    let dir = tempfile::tempdir()?;
    let store_path = dir.path().join("parameters.json");

    // Gateway first: its inputs are not published yet.
    let mut early = PlanBuilder::from_file(&config_path)?
        .store(Arc::new(FileStore::open(&store_path)?))
        .tiers(&[Tier::Gateway])
        .build()?;
    let report = early.deploy()?;
    if let Some(failed) = report.failure() {
        tracing::info!(
            unit = %failed.name,
            state = %failed.state,
            error = failed.error.as_deref().unwrap_or_default(),
            "gateway cannot deploy before compute"
        );
    }

    let mut backend = PlanBuilder::from_file(&config_path)?
        .store(Arc::new(FileStore::open(&store_path)?))
        .tiers(&[Tier::Network, Tier::Compute])
        .build()?;
    tracing::info!(layers = ?backend.layers()?, "backend plan");
    let report = backend.deploy()?;
    tracing::info!(summary = %report, "backend deployed");

    let mut gateway = PlanBuilder::from_file(&config_path)?
        .store(Arc::new(FileStore::open(&store_path)?))
        .tiers(&[Tier::Gateway])
        .build()?;
    let report = gateway.deploy()?;
    tracing::info!(summary = %report, "gateway deployed");

    for entry in gateway.parameters("/app")? {
        tracing::info!(key = %entry.key, value = %entry.value, version = entry.version, "parameter");
    }

    match PlanBuilder::from_file(Path::new("nonexistent.yaml")) {
        Ok(_) => tracing::warn!("Expected error for missing file"),
        Err(TierstackError::Io { path, .. }) => {
            tracing::info!(?path, "Correctly caught missing file error");
        }
        Err(e) => tracing::error!(%e, "Unexpected error type"),
    }

    Ok(())
}
