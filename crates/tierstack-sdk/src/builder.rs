//! Fluent API for assembling and running deployment plans.

use std::path::Path;
use std::sync::Arc;

use tierstack_common::config::PlanConfig;
use tierstack_common::error::Result;
use tierstack_common::types::Topology;
use tierstack_compose::composition::Composition;
use tierstack_compose::resolver::{DirectResolver, IndirectResolver, ReferenceResolver};
use tierstack_compose::topology::{ThreeTier, Tier};
use tierstack_runtime::deployer::Deployer;
use tierstack_runtime::event::EventListener;
use tierstack_runtime::provisioner::{Provisioner, SimulatedProvisioner};
use tierstack_runtime::report::DeploymentReport;
use tierstack_store::{MemoryStore, ParameterClient, ParameterStore, StoreEntry};

/// Builder for a deployment plan.
pub struct PlanBuilder {
    config: PlanConfig,
    store: Option<Arc<dyn ParameterStore>>,
    provisioner: Option<Arc<dyn Provisioner>>,
    tiers: Option<Vec<Tier>>,
    listener: Option<EventListener>,
}

impl std::fmt::Debug for PlanBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlanBuilder")
            .field("config", &self.config)
            .field("store", &self.store.is_some())
            .field("provisioner", &self.provisioner.as_ref().map(|p| p.name().to_owned()))
            .field("tiers", &self.tiers)
            .field("listener", &self.listener.is_some())
            .finish()
    }
}

impl PlanBuilder {
    /// Creates a builder from a configuration.
    #[must_use]
    pub const fn new(config: PlanConfig) -> Self {
        Self {
            config,
            store: None,
            provisioner: None,
            tiers: None,
            listener: None,
        }
    }

    /// Creates a builder from a YAML or JSON configuration file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be loaded or is invalid.
    pub fn from_file(path: &Path) -> Result<Self> {
        Ok(Self::new(PlanConfig::load(path)?))
    }

    /// Sets the parameter store. Out-of-process plans without one use a
    /// fresh in-memory store; in-process plans use it only for bindings to
    /// externally owned keys.
    #[must_use]
    pub fn store(mut self, store: Arc<dyn ParameterStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Sets the provisioning backend. Defaults to a simulated provisioner
    /// for the configured environment.
    #[must_use]
    pub fn provisioner(mut self, provisioner: Arc<dyn Provisioner>) -> Self {
        self.provisioner = Some(provisioner);
        self
    }

    /// Restricts the plan to some tiers, e.g. for a separate deployment run.
    #[must_use]
    pub fn tiers(mut self, tiers: &[Tier]) -> Self {
        self.tiers = Some(tiers.to_vec());
        self
    }

    /// Sends lifecycle events to `listener`.
    #[must_use]
    pub fn listener(mut self, listener: EventListener) -> Self {
        self.listener = Some(listener);
        self
    }

    /// Validates the configuration and builds the plan.
    ///
    /// # Errors
    ///
    /// Returns a structural error if the configuration is invalid or the
    /// units cannot be wired with the selected strategy.
    pub fn build(self) -> Result<Plan> {
        self.config.validate()?;
        let naming = self.config.naming()?;
        let policy = self.config.empty_values;

        let client = match (self.config.topology, self.store) {
            (_, Some(store)) => Some(ParameterClient::new(store)),
            (Topology::OutOfProcess, None) => {
                tracing::debug!("no parameter store configured, using an in-memory store");
                Some(ParameterClient::new(Arc::new(MemoryStore::new())))
            }
            (Topology::InProcess, None) => None,
        };
        let resolver: Arc<dyn ReferenceResolver> = match (self.config.topology, client.clone()) {
            (Topology::OutOfProcess, Some(client)) => {
                Arc::new(IndirectResolver::new(client, naming).with_empty_values(policy))
            }
            (_, client) => {
                let direct = DirectResolver::new().with_empty_values(policy);
                Arc::new(match client {
                    Some(client) => direct.with_store(client),
                    None => direct,
                })
            }
        };

        let mut topology = ThreeTier::new(self.config.clone());
        if let Some(tiers) = &self.tiers {
            topology = topology.with_tiers(tiers);
        }
        let composition = topology.compose(resolver)?;

        let provisioner = self.provisioner.unwrap_or_else(|| {
            Arc::new(SimulatedProvisioner::for_environment(
                &self.config.environment,
            ))
        });
        let mut deployer = Deployer::new(provisioner);
        if let Some(listener) = self.listener {
            deployer = deployer.with_listener(listener);
        }

        tracing::info!(
            topology = %self.config.topology,
            tiers = ?topology.tiers(),
            "plan built"
        );
        Ok(Plan {
            composition,
            deployer,
            client,
        })
    }
}

/// A composed plan, ready to deploy.
#[derive(Debug)]
pub struct Plan {
    composition: Composition,
    deployer: Deployer,
    client: Option<ParameterClient>,
}

impl Plan {
    /// Returns the deployment order.
    ///
    /// # Errors
    ///
    /// Returns `CyclicDependency` if the units form a cycle.
    pub fn order(&self) -> Result<Vec<String>> {
        self.composition.compute_order()
    }

    /// Returns waves of mutually independent units.
    ///
    /// # Errors
    ///
    /// Returns `CyclicDependency` if the units form a cycle.
    pub fn layers(&self) -> Result<Vec<Vec<String>>> {
        self.composition.compute_layers()
    }

    /// Returns the composition.
    #[must_use]
    pub const fn composition(&self) -> &Composition {
        &self.composition
    }

    /// Runs the plan. Can be called again to redeploy.
    ///
    /// # Errors
    ///
    /// Returns a structural error found before any provisioning; runtime
    /// failures are recorded in the report.
    pub fn deploy(&mut self) -> Result<DeploymentReport> {
        self.deployer.deploy(&mut self.composition)
    }

    /// Lists store entries under `prefix`, or nothing without a store.
    ///
    /// # Errors
    ///
    /// Returns the store's error.
    pub fn parameters(&self, prefix: &str) -> Result<Vec<StoreEntry>> {
        self.client
            .as_ref()
            .map_or_else(|| Ok(Vec::new()), |client| client.list(prefix))
    }
}

#[cfg(test)]
mod tests {
    use tierstack_common::config::NetworkSource;
    use tierstack_common::error::TierstackError;
    use tierstack_common::types::UnitState;
    use tierstack_runtime::event::EventLog;

    use super::*;

    #[test]
    fn out_of_process_plan_publishes_to_store() {
        let store = Arc::new(MemoryStore::new());
        let mut plan = PlanBuilder::new(PlanConfig::default())
            .store(store.clone())
            .build()
            .expect("build");
        let report = plan.deploy().expect("deploy");
        assert!(report.succeeded());
        assert_eq!(plan.parameters("/app/network").expect("list").len(), 1);
        assert!(!store.is_empty());
    }

    #[test]
    fn in_process_plan_has_no_store() {
        let mut config = PlanConfig::default();
        config.topology = Topology::InProcess;
        let mut plan = PlanBuilder::new(config).build().expect("build");
        assert_eq!(
            plan.composition().resolver().topology(),
            Topology::InProcess
        );
        assert!(plan.deploy().expect("deploy").succeeded());
        assert!(plan.parameters("/app").expect("list").is_empty());
    }

    #[test]
    fn layers_follow_dependencies() {
        let plan = PlanBuilder::new(PlanConfig::default())
            .build()
            .expect("build");
        assert_eq!(
            plan.layers().expect("layers"),
            vec![vec!["network"], vec!["compute"], vec!["gateway"]]
        );
    }

    #[test]
    fn invalid_config_is_rejected() {
        let mut config = PlanConfig::default();
        config.compute.task_cpu = 300;
        assert!(matches!(
            PlanBuilder::new(config).build(),
            Err(TierstackError::Config { .. })
        ));
    }

    #[test]
    fn in_process_lookup_uses_supplied_store() {
        let mut config = PlanConfig::default();
        config.topology = Topology::InProcess;
        config.network.source = NetworkSource::Lookup {
            key: "/shared/network/id".into(),
        };
        let store = Arc::new(MemoryStore::new());
        let key = tierstack_common::types::StoreKey::parse("/shared/network/id").expect("key");
        let _ = store.put(&key, "vpc-0shared").expect("seed");

        let log = EventLog::new();
        let mut plan = PlanBuilder::new(config)
            .store(store)
            .listener(log.listener())
            .build()
            .expect("build");
        let report = plan.deploy().expect("deploy");
        assert!(report.succeeded());
        assert_eq!(
            log.states_of("compute").last(),
            Some(&UnitState::OutputsPublished)
        );
    }

    #[test]
    fn plan_loads_from_yaml_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("plan.yaml");
        std::fs::write(&path, "namespace: shop\nprefix: shop\n").expect("write");
        let mut plan = PlanBuilder::from_file(&path)
            .expect("load")
            .tiers(&[Tier::Network])
            .build()
            .expect("build");
        let report = plan.deploy().expect("deploy");
        assert!(report.succeeded());
        assert_eq!(plan.parameters("/shop").expect("list").len(), 1);
    }
}
