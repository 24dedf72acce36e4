//! Deployment runs.
//!
//! A run computes the composition's order, then takes each unit in turn
//! through its lifecycle. The first unit that fails halts the run; units
//! after it are reported as never attempted. Nothing is rolled back.

use std::sync::Arc;

use chrono::Utc;
use tierstack_common::error::{Result, TierstackError};
use tierstack_common::types::UnitState;
use tierstack_compose::composition::Composition;
use tierstack_compose::unit::ResolvedInputs;
use uuid::Uuid;

use crate::event::{DeployEvent, EventListener};
use crate::provisioner::Provisioner;
use crate::report::{DeploymentReport, UnitRecord};
use crate::state::Lifecycle;

/// Drives compositions through the provisioning API.
pub struct Deployer {
    provisioner: Arc<dyn Provisioner>,
    listener: Option<EventListener>,
}

impl std::fmt::Debug for Deployer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Deployer")
            .field("provisioner", &self.provisioner.name())
            .field("listener", &self.listener.is_some())
            .finish()
    }
}

impl Deployer {
    /// Creates a deployer over a provisioning backend.
    #[must_use]
    pub fn new(provisioner: Arc<dyn Provisioner>) -> Self {
        Self {
            provisioner,
            listener: None,
        }
    }

    /// Sends every lifecycle event to `listener`.
    #[must_use]
    pub fn with_listener(mut self, listener: EventListener) -> Self {
        self.listener = Some(listener);
        self
    }

    /// Deploys every unit of `composition` in dependency order.
    ///
    /// Runtime failures (unresolved references, render errors, provider
    /// errors, publish errors) halt the run and are recorded in the
    /// returned report.
    ///
    /// # Errors
    ///
    /// Returns `CyclicDependency` or `Config` for structural problems found
    /// before any unit is handed to the provisioner.
    pub fn deploy(&self, composition: &mut Composition) -> Result<DeploymentReport> {
        let started_at = Utc::now();
        let run_id = Uuid::new_v4();
        let order = composition.compute_order()?;
        let unbound = composition.unbound_inputs();
        if !unbound.is_empty() {
            let names: Vec<String> = unbound.iter().map(|(u, i)| format!("{u}.{i}")).collect();
            return Err(TierstackError::Config {
                message: format!("unbound inputs: {}", names.join(", ")),
            });
        }

        tracing::info!(
            %run_id,
            topology = %composition.resolver().topology(),
            order = %order.join(" -> "),
            "deployment started"
        );

        let mut units = Vec::with_capacity(order.len());
        let mut never_attempted = Vec::new();
        let mut halted = false;
        for name in &order {
            if halted {
                never_attempted.push(name.clone());
                continue;
            }
            let record = self.deploy_unit(composition, name)?;
            if record.state.is_failure() {
                tracing::warn!(
                    unit = %name,
                    state = %record.state,
                    error = record.error.as_deref().unwrap_or_default(),
                    "deployment halted"
                );
                halted = true;
            }
            units.push(record);
        }

        let report = DeploymentReport {
            run_id,
            started_at,
            finished_at: Utc::now(),
            topology: composition.resolver().topology(),
            provisioner: self.provisioner.name().to_owned(),
            order,
            units,
            never_attempted,
        };
        tracing::info!(%run_id, succeeded = report.succeeded(), "deployment finished");
        Ok(report)
    }

    fn deploy_unit(&self, composition: &mut Composition, name: &str) -> Result<UnitRecord> {
        let mut lifecycle = Lifecycle::new(name);
        let mut record = UnitRecord::new(name);

        self.advance(&mut lifecycle, UnitState::InputsResolving)?;
        let inputs = match resolve_inputs(composition, name) {
            Ok(inputs) => inputs,
            Err(e) => return self.fail(lifecycle, record, UnitState::InputResolutionFailed, &e),
        };
        record.inputs = inputs
            .iter()
            .map(|(k, v)| (k.to_owned(), v.to_owned()))
            .collect();
        self.advance(&mut lifecycle, UnitState::InputsResolved)?;

        self.advance(&mut lifecycle, UnitState::Rendering)?;
        let rendered = match composition.unit(name).map(|unit| unit.render(&inputs)) {
            Some(Ok(rendered)) => rendered,
            Some(Err(e)) => {
                return self.fail(lifecycle, record, UnitState::InputResolutionFailed, &e);
            }
            None => {
                return Err(TierstackError::NotFound {
                    kind: "unit",
                    id: name.to_owned(),
                });
            }
        };
        record.declarations = rendered.declarations.len();
        let resources = match self.provisioner.provision(&rendered) {
            Ok(resources) => resources,
            Err(e) => return self.fail(lifecycle, record, UnitState::ProvisioningFailed, &e),
        };
        if let Some(unit) = composition.unit_mut(name) {
            unit.mark_provisioned(resources);
        }
        self.advance(&mut lifecycle, UnitState::Provisioned)?;

        let published = composition
            .unit(name)
            .map(|unit| composition.resolver().publish(unit));
        match published {
            Some(Ok(outputs)) => {
                for output in &outputs {
                    self.emit(&DeployEvent::OutputPublished {
                        unit: name.to_owned(),
                        output: output.name.clone(),
                        key: output.key.clone(),
                    });
                }
                record.outputs = outputs;
            }
            Some(Err(e)) => {
                return self.fail(lifecycle, record, UnitState::ProvisioningFailed, &e);
            }
            None => {
                return Err(TierstackError::NotFound {
                    kind: "unit",
                    id: name.to_owned(),
                });
            }
        }
        self.advance(&mut lifecycle, UnitState::OutputsPublished)?;
        record.state = lifecycle.state();
        Ok(record)
    }

    fn advance(&self, lifecycle: &mut Lifecycle, to: UnitState) -> Result<()> {
        let from = lifecycle.advance(to)?;
        tracing::info!(unit = lifecycle.unit(), %from, %to, "unit state changed");
        self.emit(&DeployEvent::StateChange {
            unit: lifecycle.unit().to_owned(),
            from,
            to,
        });
        Ok(())
    }

    fn fail(
        &self,
        mut lifecycle: Lifecycle,
        mut record: UnitRecord,
        to: UnitState,
        error: &TierstackError,
    ) -> Result<UnitRecord> {
        self.advance(&mut lifecycle, to)?;
        record.state = lifecycle.state();
        record.failed_during = lifecycle.failed_during();
        record.error = Some(error.to_string());
        Ok(record)
    }

    fn emit(&self, event: &DeployEvent) {
        if let Some(listener) = &self.listener {
            listener(event);
        }
    }
}

fn resolve_inputs(composition: &Composition, name: &str) -> Result<ResolvedInputs> {
    let unit = composition
        .unit(name)
        .ok_or_else(|| TierstackError::NotFound {
            kind: "unit",
            id: name.to_owned(),
        })?;
    let mut inputs = ResolvedInputs::new();
    for decl in unit.inputs() {
        let reference = composition
            .references_for(name)
            .find(|r| r.input == decl.name)
            .ok_or_else(|| TierstackError::MissingInput {
                unit: name.to_owned(),
                input: decl.name.clone(),
            })?;
        let value = composition
            .resolver()
            .realize(reference, composition.units())?;
        tracing::debug!(unit = name, input = %decl.name, binding = %reference.binding, "input resolved");
        inputs.insert(decl.name.clone(), value);
    }
    Ok(inputs)
}

#[cfg(test)]
mod tests {
    use tierstack_common::types::{Namespace, Naming, ValueShape};
    use tierstack_compose::declaration::{ResourceDeclaration, ResourceKind, attr};
    use tierstack_compose::resolver::{DirectResolver, IndirectResolver};
    use tierstack_compose::unit::Unit;
    use tierstack_store::{MemoryStore, ParameterClient};

    use super::*;
    use crate::event::EventLog;
    use crate::provisioner::SimulatedProvisioner;

    fn naming() -> Naming {
        Naming::new(Namespace::new("app").expect("ns"), "shop")
    }

    fn group_unit(name: &str) -> Unit {
        let group = format!("{name}-sg");
        let mut unit = Unit::new(name, move |_| {
            Ok(vec![ResourceDeclaration::new(
                "sg",
                ResourceKind::SecurityGroup {
                    name: group.clone(),
                    network: "vpc-0abc".into(),
                },
            )])
        });
        unit.declare_output("groupId", |res| {
            res.attribute("sg", attr::ID).map(str::to_owned)
        })
        .expect("declare");
        unit
    }

    fn consumer_unit(name: &str) -> Unit {
        let mut unit = group_unit(name);
        unit.declare_input("peer", ValueShape::Identifier("sg-".into()))
            .expect("declare");
        unit
    }

    fn deployer(log: &EventLog) -> Deployer {
        Deployer::new(Arc::new(SimulatedProvisioner::new("000000000000", "eu-west-1")))
            .with_listener(log.listener())
    }

    #[test]
    fn direct_run_publishes_every_unit() {
        let mut comp = Composition::new(naming(), Arc::new(DirectResolver::new()));
        comp.add_unit(consumer_unit("b")).expect("add");
        comp.add_unit(group_unit("a")).expect("add");
        comp.connect("b", "peer", "a", "groupId").expect("connect");

        let log = EventLog::new();
        let report = deployer(&log).deploy(&mut comp).expect("deploy");
        assert!(report.succeeded());
        assert_eq!(report.order, vec!["a", "b"]);
        let peer = report.unit("b").expect("b").inputs.get("peer").cloned();
        assert_eq!(
            peer.as_deref(),
            report.unit("a").and_then(|u| u.output("groupId"))
        );
        assert_eq!(
            log.states_of("b"),
            vec![
                UnitState::Declared,
                UnitState::InputsResolving,
                UnitState::InputsResolved,
                UnitState::Rendering,
                UnitState::Provisioned,
                UnitState::OutputsPublished,
            ]
        );
    }

    #[test]
    fn indirect_run_with_producer_added_last() {
        let client = ParameterClient::new(Arc::new(MemoryStore::new()));
        let mut comp = Composition::new(
            naming(),
            Arc::new(IndirectResolver::new(client, naming())),
        );
        comp.add_unit(consumer_unit("b")).expect("add");
        comp.connect("b", "peer", "a", "groupId").expect("connect");
        comp.add_unit(group_unit("a")).expect("add");

        let log = EventLog::new();
        let report = deployer(&log).deploy(&mut comp).expect("deploy");
        assert!(report.succeeded(), "{report}");
        assert_eq!(report.order, vec!["a", "b"]);
    }

    #[test]
    fn invalid_input_fails_during_rendering() {
        let mut comp = Composition::new(naming(), Arc::new(DirectResolver::new()));
        comp.add_unit(consumer_unit("b")).expect("add");
        comp.connect_literal("b", "peer", "not-a-group").expect("bind");

        let log = EventLog::new();
        let report = deployer(&log).deploy(&mut comp).expect("deploy");
        let failed = report.failure().expect("failure");
        assert_eq!(failed.state, UnitState::InputResolutionFailed);
        assert_eq!(failed.failed_during, Some(UnitState::Rendering));
    }

    #[test]
    fn empty_output_fails_publish() {
        let client = ParameterClient::new(Arc::new(MemoryStore::new()));
        let mut comp = Composition::new(
            naming(),
            Arc::new(IndirectResolver::new(client, naming())),
        );
        let mut unit = Unit::new("a", |_| Ok(Vec::new()));
        unit.declare_output("blank", |_| Ok(String::new()))
            .expect("declare");
        comp.add_unit(unit).expect("add");

        let log = EventLog::new();
        let report = deployer(&log).deploy(&mut comp).expect("deploy");
        let failed = report.failure().expect("failure");
        assert_eq!(failed.state, UnitState::ProvisioningFailed);
        assert_eq!(failed.failed_during, Some(UnitState::Provisioned));
        assert!(failed.error.as_deref().unwrap_or_default().contains("blank"));
    }

    #[test]
    fn unbound_input_is_structural() {
        let mut comp = Composition::new(naming(), Arc::new(DirectResolver::new()));
        comp.add_unit(consumer_unit("b")).expect("add");
        let log = EventLog::new();
        let err = deployer(&log).deploy(&mut comp).expect_err("unbound");
        assert!(err.is_structural());
        assert!(log.events().is_empty());
    }
}
