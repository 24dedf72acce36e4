//! The three-tier reference topology: a network unit, a compute unit
//! running a containerized service inside that network, and a gateway
//! unit exposing the service through a private HTTP API.
//!
//! [`ThreeTier`] builds the units from a [`PlanConfig`] and wires their
//! inputs through whatever [`ReferenceResolver`] the caller picks, so the
//! same plan runs in-process or across independent deployments.

use std::sync::Arc;

use tierstack_common::config::{DiscoveryConfig, NetworkSource, PlanConfig};
use tierstack_common::constants::{
    COMPUTE_UNIT, DISCOVERY_DNS_TTL_SECS, DISCOVERY_SERVICE_NAME, GATEWAY_UNIT, NETWORK_UNIT,
};
use tierstack_common::error::{Result, TierstackError};
use tierstack_common::types::{Naming, StoreKey, ValueShape};

use crate::composition::Composition;
use crate::declaration::{
    ContainerSpec, DiscoveryRegistration, DnsRecordType, HttpIntegration, PortRange,
    ProvisionedResources, ResourceDeclaration, ResourceKind, SubnetKind, SubnetSpec, attr,
};
use crate::resolver::ReferenceResolver;
use crate::unit::Unit;

const VPC: &str = "vpc";
const CLUSTER: &str = "ecs-cluster";
const LOG_GROUP: &str = "log-group";
const EXECUTION_ROLE: &str = "execution-role";
const TASK_ROLE: &str = "task-role";
const TASK: &str = "ecs-task";
const ECS_SG: &str = "sg-ecs";
const SERVICE: &str = "ecs-service";
const NAMESPACE: &str = "ecs-namespace";
const VPCLINK_SG: &str = "sg-vpclink";
const VPCLINK: &str = "vpclink";
const INGRESS: &str = "sg-ecs-ingress";
const API: &str = "private-api";

const TASK_PRINCIPAL: &str = "ecs-tasks.amazonaws.com";
const CONTAINER_NAME: &str = "fastapi";

const EXECUTION_POLICIES: [&str; 2] = [
    "arn:aws:iam::aws:policy/AWSOpsWorksCloudWatchLogs",
    "arn:aws:iam::aws:policy/AmazonEC2ContainerRegistryReadOnly",
];
const TASK_POLICIES: [&str; 2] = [
    "arn:aws:iam::aws:policy/CloudWatchFullAccess",
    "arn:aws:iam::aws:policy/service-role/AmazonEC2RoleforSSM",
];

/// Outputs the compute unit hands to the gateway, by input name.
const GATEWAY_FROM_COMPUTE: [(&str, ValueShape); 7] = [
    ("securityGroupId", ValueShape::NonEmpty),
    ("namespaceId", ValueShape::NonEmpty),
    ("namespaceName", ValueShape::NonEmpty),
    ("namespaceArn", ValueShape::Arn),
    ("serviceId", ValueShape::NonEmpty),
    ("serviceName", ValueShape::NonEmpty),
    ("serviceArn", ValueShape::Arn),
];

/// One tier of the reference topology.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Tier {
    /// The private network.
    Network,
    /// The container service.
    Compute,
    /// The private HTTP API.
    Gateway,
}

impl Tier {
    /// Every tier, in declaration order.
    pub const ALL: [Self; 3] = [Self::Network, Self::Compute, Self::Gateway];

    /// Returns the unit name of the tier.
    #[must_use]
    pub const fn unit_name(self) -> &'static str {
        match self {
            Self::Network => NETWORK_UNIT,
            Self::Compute => COMPUTE_UNIT,
            Self::Gateway => GATEWAY_UNIT,
        }
    }
}

/// Builder for the three-tier composition.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use tierstack_common::config::PlanConfig;
/// use tierstack_compose::resolver::DirectResolver;
/// use tierstack_compose::topology::ThreeTier;
///
/// let composition = ThreeTier::new(PlanConfig::default())
///     .compose(Arc::new(DirectResolver::new()))
///     .unwrap();
/// assert_eq!(
///     composition.compute_order().unwrap(),
///     vec!["network", "compute", "gateway"]
/// );
/// ```
#[derive(Debug, Clone)]
pub struct ThreeTier {
    config: PlanConfig,
    tiers: Vec<Tier>,
}

impl ThreeTier {
    /// Creates a builder for every tier the configuration owns: all three
    /// with a managed network, compute and gateway otherwise.
    #[must_use]
    pub fn new(config: PlanConfig) -> Self {
        let tiers = if matches!(config.network.source, NetworkSource::Managed) {
            Tier::ALL.to_vec()
        } else {
            vec![Tier::Compute, Tier::Gateway]
        };
        Self { config, tiers }
    }

    /// Restricts the composition to `tiers`. Inputs whose producer is left
    /// out are still bound; the indirect strategy reads them from the store
    /// at deploy time.
    #[must_use]
    pub fn with_tiers(mut self, tiers: &[Tier]) -> Self {
        self.tiers = Tier::ALL
            .into_iter()
            .filter(|tier| tiers.contains(tier))
            .collect();
        self
    }

    /// Returns the selected tiers in declaration order.
    #[must_use]
    pub fn tiers(&self) -> &[Tier] {
        &self.tiers
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &PlanConfig {
        &self.config
    }

    /// Builds the units and binds every input.
    ///
    /// # Errors
    ///
    /// Returns `Config` if the configuration is invalid or the network tier
    /// is requested for a network owned elsewhere, and `NotFound` if the
    /// resolver requires a producer that was left out.
    pub fn compose(&self, resolver: Arc<dyn ReferenceResolver>) -> Result<Composition> {
        self.config.validate()?;
        let naming = self.config.naming()?;
        let managed = matches!(self.config.network.source, NetworkSource::Managed);
        if self.has(Tier::Network) && !managed {
            return Err(TierstackError::Config {
                message: "the network tier requires network.source kind \"managed\"".into(),
            });
        }

        let mut composition = Composition::new(naming.clone(), resolver);
        for tier in &self.tiers {
            let unit = match tier {
                Tier::Network => network_unit(&self.config),
                Tier::Compute => compute_unit(&self.config, &naming)?,
                Tier::Gateway => gateway_unit(&naming)?,
            };
            composition.add_unit(unit)?;
        }

        for tier in [Tier::Compute, Tier::Gateway] {
            if self.has(tier) {
                self.bind_network(&mut composition, tier.unit_name())?;
            }
        }
        if self.has(Tier::Gateway) {
            for (input, _) in &GATEWAY_FROM_COMPUTE {
                composition.connect(GATEWAY_UNIT, input, COMPUTE_UNIT, input)?;
            }
        }

        tracing::info!(
            units = composition.units().len(),
            references = composition.references().len(),
            topology = %composition.resolver().topology(),
            "three-tier composition built"
        );
        Ok(composition)
    }

    fn has(&self, tier: Tier) -> bool {
        self.tiers.contains(&tier)
    }

    fn bind_network(&self, composition: &mut Composition, consumer: &str) -> Result<()> {
        match &self.config.network.source {
            NetworkSource::Managed => composition.connect(consumer, "vpcId", NETWORK_UNIT, "id"),
            NetworkSource::Handle { vpc_id } => {
                composition.connect_literal(consumer, "vpcId", vpc_id.clone())
            }
            NetworkSource::Lookup { key } => {
                composition.connect_key(consumer, "vpcId", StoreKey::parse(key.clone())?)
            }
        }
    }
}

fn attribute(
    logical_id: &'static str,
    key: &'static str,
) -> impl Fn(&ProvisionedResources) -> Result<String> + Send + Sync + 'static {
    move |resources| resources.attribute(logical_id, key).map(str::to_owned)
}

/// Builds the network unit: one private network with public,
/// egress-only and isolated subnets. Publishes `id`.
#[must_use]
pub fn network_unit(config: &PlanConfig) -> Unit {
    let cidr = config.network.cidr.clone();
    let max_azs = config.network.max_azs;
    let mut unit = Unit::new(NETWORK_UNIT, move |_| {
        Ok(vec![ResourceDeclaration::new(
            VPC,
            ResourceKind::Network {
                cidr: cidr.clone(),
                max_azs,
                subnets: vec![
                    subnet("public", SubnetKind::Public, 24),
                    subnet("private", SubnetKind::PrivateWithEgress, 24),
                    subnet("isolated", SubnetKind::Isolated, 28),
                ],
            },
        )])
    });
    // A fresh unit has no outputs, so this cannot collide.
    let _ = unit.declare_output("id", attribute(VPC, attr::ID));
    unit
}

fn subnet(name: &str, kind: SubnetKind, cidr_mask: u8) -> SubnetSpec {
    SubnetSpec {
        name: name.into(),
        kind,
        cidr_mask,
    }
}

/// Builds the compute unit: cluster, roles, task definition, security
/// group, and a service registered in service discovery.
///
/// Consumes `vpcId`. Publishes the discovery service and namespace
/// identifiers, the security group id, and the cluster name.
///
/// # Errors
///
/// Returns an error only if an output name is declared twice.
pub fn compute_unit(config: &PlanConfig, naming: &Naming) -> Result<Unit> {
    let compute = config.compute.clone();
    let prefix = naming.prefix().to_owned();
    let image = format!(
        "{}.dkr.ecr.{}.amazonaws.com/{}:{}",
        config.environment.account,
        config.environment.region,
        config.image.repository,
        config.image.tag
    );
    let names = ComputeNames::new(naming);
    let rendered = names.clone();

    let mut unit = Unit::new(COMPUTE_UNIT, move |inputs| {
        let vpc_id = inputs.require(COMPUTE_UNIT, "vpcId")?.to_owned();
        let mut declarations = vec![
            ResourceDeclaration::new(VPC, ResourceKind::NetworkImport { vpc_id }),
            ResourceDeclaration::new(
                CLUSTER,
                ResourceKind::Cluster {
                    name: rendered.cluster.clone(),
                    network: VPC.into(),
                    capacity_providers: vec!["FARGATE".into(), "FARGATE_SPOT".into()],
                    discovery_namespace: match &compute.discovery {
                        DiscoveryConfig::Create { name } => Some(name.clone()),
                        DiscoveryConfig::Existing { .. } => None,
                    },
                },
            ),
        ];
        if let DiscoveryConfig::Existing { name, id, arn } = &compute.discovery {
            declarations.push(ResourceDeclaration::new(
                NAMESPACE,
                ResourceKind::DiscoveryNamespaceImport {
                    name: name.clone(),
                    id: id.clone(),
                    arn: arn.clone(),
                },
            ));
        }
        declarations.extend([
            ResourceDeclaration::new(
                LOG_GROUP,
                ResourceKind::LogGroupImport {
                    name: format!("/aws/ecs/{prefix}"),
                },
            ),
            role(EXECUTION_ROLE, &rendered.execution_role, &EXECUTION_POLICIES),
            role(TASK_ROLE, &rendered.task_role, &TASK_POLICIES),
            ResourceDeclaration::new(
                TASK,
                ResourceKind::TaskDefinition {
                    family: rendered.task_family.clone(),
                    memory_mib: compute.task_memory_mib,
                    cpu: compute.task_cpu,
                    execution_role: EXECUTION_ROLE.into(),
                    task_role: TASK_ROLE.into(),
                    containers: vec![ContainerSpec {
                        name: CONTAINER_NAME.into(),
                        image: image.clone(),
                        port: compute.container_port,
                        log_group: LOG_GROUP.into(),
                        log_stream_prefix: prefix.clone(),
                    }],
                },
            ),
            ResourceDeclaration::new(
                ECS_SG,
                ResourceKind::SecurityGroup {
                    name: rendered.security_group.clone(),
                    network: VPC.into(),
                },
            ),
            ResourceDeclaration::new(
                SERVICE,
                ResourceKind::Service {
                    name: rendered.service.clone(),
                    cluster: CLUSTER.into(),
                    task_definition: TASK.into(),
                    security_groups: vec![ECS_SG.into()],
                    capacity_provider: compute.capacity_provider.clone(),
                    desired_count: compute.desired_count,
                    enable_execute_command: true,
                    discovery: DiscoveryRegistration {
                        name: DISCOVERY_SERVICE_NAME.into(),
                        record_type: DnsRecordType::Srv,
                        container: CONTAINER_NAME.into(),
                        port: compute.container_port,
                        ttl_secs: DISCOVERY_DNS_TTL_SECS,
                    },
                },
            ),
        ]);
        Ok(declarations)
    });

    unit.declare_input("vpcId", ValueShape::Identifier("vpc-".into()))?;
    unit.declare_output("serviceId", attribute(SERVICE, attr::DISCOVERY_ID))?;
    unit.declare_output("serviceName", attribute(SERVICE, attr::DISCOVERY_NAME))?;
    unit.declare_output("serviceArn", attribute(SERVICE, attr::DISCOVERY_ARN))?;
    match &config.compute.discovery {
        DiscoveryConfig::Create { .. } => {
            unit.declare_output("namespaceId", attribute(CLUSTER, attr::NAMESPACE_ID))?;
            unit.declare_output("namespaceName", attribute(CLUSTER, attr::NAMESPACE_NAME))?;
            unit.declare_output("namespaceArn", attribute(CLUSTER, attr::NAMESPACE_ARN))?;
        }
        DiscoveryConfig::Existing { name, id, arn } => {
            unit.declare_static_output("namespaceId", id.clone())?;
            unit.declare_static_output("namespaceName", name.clone())?;
            unit.declare_static_output("namespaceArn", arn.clone())?;
        }
    }
    unit.declare_output("securityGroupId", attribute(ECS_SG, attr::ID))?;
    unit.declare_static_output("clusterName", names.cluster)?;
    Ok(unit)
}

#[derive(Debug, Clone)]
struct ComputeNames {
    cluster: String,
    execution_role: String,
    task_role: String,
    task_family: String,
    security_group: String,
    service: String,
}

impl ComputeNames {
    fn new(naming: &Naming) -> Self {
        Self {
            cluster: naming.resource("cluster"),
            execution_role: naming.resource("ecs-execution-role"),
            task_role: naming.resource("ecs-task-role"),
            task_family: naming.resource("task"),
            security_group: naming.resource("ecs-sg"),
            service: naming.resource("service"),
        }
    }
}

fn role(logical_id: &str, name: &str, policies: &[&str]) -> ResourceDeclaration {
    ResourceDeclaration::new(
        logical_id,
        ResourceKind::Role {
            name: name.into(),
            assumed_by: TASK_PRINCIPAL.into(),
            managed_policies: policies.iter().map(|p| (*p).to_owned()).collect(),
        },
    )
}

/// Builds the gateway unit: a VPC link into the network, an ingress rule
/// on the compute security group, and a private HTTP API proxying to the
/// compute service through service discovery.
///
/// Consumes `vpcId` plus the compute unit's discovery identifiers and
/// security group id. Publishes `apiId` and `apiEndpoint`.
///
/// # Errors
///
/// Returns an error only if an input or output name is declared twice.
pub fn gateway_unit(naming: &Naming) -> Result<Unit> {
    let link_sg = naming.resource("vpclink-sg");
    let link = naming.resource("vpclink");
    let api = naming.resource("private-api");

    let mut unit = Unit::new(GATEWAY_UNIT, move |inputs| {
        let get = |name: &str| inputs.require(GATEWAY_UNIT, name).map(str::to_owned);
        let vpc_id = get("vpcId")?;
        Ok(vec![
            ResourceDeclaration::new(
                VPCLINK_SG,
                ResourceKind::SecurityGroup {
                    name: link_sg.clone(),
                    network: vpc_id.clone(),
                },
            ),
            ResourceDeclaration::new(
                VPCLINK,
                ResourceKind::VpcLink {
                    name: link.clone(),
                    vpc_id,
                    security_groups: vec![VPCLINK_SG.into()],
                },
            ),
            ResourceDeclaration::new(
                INGRESS,
                ResourceKind::IngressRule {
                    security_group: get("securityGroupId")?,
                    source: VPCLINK_SG.into(),
                    ports: PortRange::ALL,
                    description: "allow ingress from ECS Service".into(),
                },
            ),
            ResourceDeclaration::new(
                NAMESPACE,
                ResourceKind::DiscoveryNamespaceImport {
                    name: get("namespaceName")?,
                    id: get("namespaceId")?,
                    arn: get("namespaceArn")?,
                },
            ),
            ResourceDeclaration::new(
                SERVICE,
                ResourceKind::DiscoveryServiceImport {
                    namespace: NAMESPACE.into(),
                    name: get("serviceName")?,
                    id: get("serviceId")?,
                    arn: get("serviceArn")?,
                    record_type: DnsRecordType::A,
                },
            ),
            ResourceDeclaration::new(
                API,
                ResourceKind::HttpApi {
                    name: api.clone(),
                    description: "connect ECS via CloudMap".into(),
                    integration: HttpIntegration {
                        service: SERVICE.into(),
                        vpc_link: VPCLINK.into(),
                    },
                },
            ),
        ])
    });

    unit.declare_input("vpcId", ValueShape::Identifier("vpc-".into()))?;
    for (input, shape) in GATEWAY_FROM_COMPUTE {
        unit.declare_input(input, shape)?;
    }
    unit.declare_output("apiId", attribute(API, attr::ID))?;
    unit.declare_output("apiEndpoint", attribute(API, attr::ENDPOINT))?;
    Ok(unit)
}

#[cfg(test)]
mod tests {
    use tierstack_store::{MemoryStore, ParameterClient};

    use super::*;
    use crate::resolver::{Binding, DirectResolver, IndirectResolver};
    use crate::unit::ResolvedInputs;

    fn indirect(config: &PlanConfig) -> Arc<dyn ReferenceResolver> {
        let client = ParameterClient::new(Arc::new(MemoryStore::new()));
        Arc::new(IndirectResolver::new(
            client,
            config.naming().expect("naming"),
        ))
    }

    fn gateway_inputs() -> ResolvedInputs {
        [
            ("vpcId", "vpc-0abc"),
            ("securityGroupId", "sg-0123"),
            ("namespaceId", "ns-1"),
            ("namespaceName", "example.com."),
            (
                "namespaceArn",
                "arn:aws:servicediscovery:ap-northeast-1:000000000000:namespace/ns-1",
            ),
            ("serviceId", "srv-1"),
            ("serviceName", "fargate-service-discovery"),
            (
                "serviceArn",
                "arn:aws:servicediscovery:ap-northeast-1:000000000000:service/srv-1",
            ),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn full_plan_orders_network_compute_gateway() {
        let config = PlanConfig::default();
        let comp = ThreeTier::new(config.clone())
            .compose(indirect(&config))
            .expect("compose");
        assert_eq!(
            comp.compute_order().expect("order"),
            vec!["network", "compute", "gateway"]
        );
        assert!(comp.unbound_inputs().is_empty());
        assert_eq!(
            comp.graph().dependencies_of("gateway").expect("deps"),
            vec!["network", "compute"]
        );
    }

    #[test]
    fn gateway_only_plan_defers_every_input() {
        let config = PlanConfig::default();
        let comp = ThreeTier::new(config.clone())
            .with_tiers(&[Tier::Gateway])
            .compose(indirect(&config))
            .expect("compose");
        assert_eq!(comp.compute_order().expect("order"), vec!["gateway"]);
        assert_eq!(comp.references().len(), 8);
        assert!(
            comp.references()
                .iter()
                .all(|r| matches!(r.binding, Binding::Deferred { .. }))
        );
    }

    #[test]
    fn direct_strategy_requires_every_producer() {
        let result = ThreeTier::new(PlanConfig::default())
            .with_tiers(&[Tier::Compute, Tier::Gateway])
            .compose(Arc::new(DirectResolver::new()));
        assert!(matches!(result, Err(TierstackError::NotFound { .. })));
    }

    #[test]
    fn handle_network_source_binds_literal() {
        let mut config = PlanConfig::default();
        config.network.source = NetworkSource::Handle {
            vpc_id: "vpc-0shared".into(),
        };
        let builder = ThreeTier::new(config);
        assert_eq!(builder.tiers(), &[Tier::Compute, Tier::Gateway]);
        let comp = builder
            .compose(Arc::new(DirectResolver::new()))
            .expect("compose");
        let vpc = comp
            .references_for("compute")
            .find(|r| r.input == "vpcId")
            .expect("vpcId bound");
        assert_eq!(
            vpc.binding,
            Binding::Literal {
                value: "vpc-0shared".into()
            }
        );
    }

    #[test]
    fn network_tier_rejected_for_external_network() {
        let mut config = PlanConfig::default();
        config.network.source = NetworkSource::Handle {
            vpc_id: "vpc-0shared".into(),
        };
        let result = ThreeTier::new(config)
            .with_tiers(&Tier::ALL)
            .compose(Arc::new(DirectResolver::new()));
        assert!(matches!(result, Err(TierstackError::Config { .. })));
    }

    #[test]
    fn compute_renders_prefixed_resources() {
        let config = PlanConfig::default();
        let naming = config.naming().expect("naming");
        let unit = compute_unit(&config, &naming).expect("unit");
        let inputs: ResolvedInputs = [("vpcId", "vpc-0abc")].into_iter().collect();
        let rendered = unit.render(&inputs).expect("render");
        let service = rendered
            .declarations
            .iter()
            .find(|d| d.logical_id == SERVICE)
            .expect("service declared");
        match &service.kind {
            ResourceKind::Service {
                name, discovery, ..
            } => {
                assert_eq!(name, "tierstack-service");
                assert_eq!(discovery.name, DISCOVERY_SERVICE_NAME);
                assert_eq!(discovery.record_type, DnsRecordType::Srv);
                assert_eq!(discovery.ttl_secs, 30);
            }
            other => panic!("unexpected kind {other:?}"),
        }
        assert_eq!(
            unit.output("clusterName").expect("static"),
            "tierstack-cluster"
        );
        assert!(matches!(
            unit.output("serviceArn"),
            Err(TierstackError::OutputNotReady { .. })
        ));
    }

    #[test]
    fn compute_rejects_malformed_network_id() {
        let config = PlanConfig::default();
        let unit = compute_unit(&config, &config.naming().expect("naming")).expect("unit");
        let inputs: ResolvedInputs = [("vpcId", "subnet-1")].into_iter().collect();
        assert!(matches!(
            unit.render(&inputs),
            Err(TierstackError::InvalidInput { .. })
        ));
    }

    #[test]
    fn existing_namespace_outputs_are_static() {
        let mut config = PlanConfig::default();
        config.compute.discovery = DiscoveryConfig::Existing {
            name: "shared.local.".into(),
            id: "ns-shared".into(),
            arn: "arn:aws:servicediscovery:ap-northeast-1:000000000000:namespace/ns-shared"
                .into(),
        };
        let unit = compute_unit(&config, &config.naming().expect("naming")).expect("unit");
        assert_eq!(unit.output("namespaceId").expect("static"), "ns-shared");
        let inputs: ResolvedInputs = [("vpcId", "vpc-0abc")].into_iter().collect();
        let rendered = unit.render(&inputs).expect("render");
        assert!(rendered.declarations.iter().any(|d| d.logical_id == NAMESPACE));
    }

    #[test]
    fn gateway_renders_api_through_vpc_link() {
        let naming = PlanConfig::default().naming().expect("naming");
        let unit = gateway_unit(&naming).expect("unit");
        let rendered = unit.render(&gateway_inputs()).expect("render");
        let ids: Vec<_> = rendered
            .declarations
            .iter()
            .map(|d| d.logical_id.as_str())
            .collect();
        assert_eq!(
            ids,
            vec![VPCLINK_SG, VPCLINK, INGRESS, NAMESPACE, SERVICE, API]
        );
    }

    #[test]
    fn gateway_without_inputs_does_not_render() {
        let naming = PlanConfig::default().naming().expect("naming");
        let unit = gateway_unit(&naming).expect("unit");
        assert!(matches!(
            unit.render(&ResolvedInputs::new()),
            Err(TierstackError::MissingInput { .. })
        ));
    }
}
