//! Resource declarations handed to the provisioning API.
//!
//! Declarations are opaque to the planning core: a unit renders them and
//! the provisioner interprets them. References between resources of the
//! same unit use logical ids; values that come from other units arrive
//! already resolved through the unit's inputs.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tierstack_common::error::{Result, TierstackError};

/// A single resource declaration within a unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceDeclaration {
    /// Identifier unique within the declaring unit.
    pub logical_id: String,
    /// What to provision.
    #[serde(flatten)]
    pub kind: ResourceKind,
}

impl ResourceDeclaration {
    /// Creates a declaration.
    #[must_use]
    pub fn new(logical_id: impl Into<String>, kind: ResourceKind) -> Self {
        Self {
            logical_id: logical_id.into(),
            kind,
        }
    }
}

/// Kinds of resources a unit can declare.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ResourceKind {
    /// A private network with its subnets.
    Network {
        /// CIDR block.
        cidr: String,
        /// Number of availability zones.
        max_azs: u8,
        /// Subnet groups created in every zone.
        subnets: Vec<SubnetSpec>,
    },
    /// A reference to a network that already exists.
    NetworkImport {
        /// Identifier of the existing network.
        vpc_id: String,
    },
    /// A container cluster.
    Cluster {
        /// Physical cluster name.
        name: String,
        /// Logical id of the network the cluster runs in.
        network: String,
        /// Capacity providers enabled on the cluster.
        capacity_providers: Vec<String>,
        /// Private DNS namespace created with the cluster, if any.
        discovery_namespace: Option<String>,
    },
    /// An IAM role assumed by a service principal.
    Role {
        /// Physical role name.
        name: String,
        /// Principal allowed to assume the role.
        assumed_by: String,
        /// Managed policy ARNs attached to the role.
        managed_policies: Vec<String>,
    },
    /// A reference to a log group that already exists.
    LogGroupImport {
        /// Log group name.
        name: String,
    },
    /// A task definition for the compute service.
    TaskDefinition {
        /// Task family.
        family: String,
        /// Memory in MiB.
        memory_mib: u32,
        /// CPU units.
        cpu: u32,
        /// Logical id of the execution role.
        execution_role: String,
        /// Logical id of the task role.
        task_role: String,
        /// Containers in the task.
        containers: Vec<ContainerSpec>,
    },
    /// A security group.
    SecurityGroup {
        /// Physical group name.
        name: String,
        /// Logical id of the network, or a network identifier.
        network: String,
    },
    /// An ingress rule added to a security group.
    IngressRule {
        /// Identifier of the group receiving the rule.
        security_group: String,
        /// Logical id of the group allowed in.
        source: String,
        /// Allowed TCP ports.
        ports: PortRange,
        /// Rule description.
        description: String,
    },
    /// A long-running container service.
    Service {
        /// Physical service name.
        name: String,
        /// Logical id of the cluster.
        cluster: String,
        /// Logical id of the task definition.
        task_definition: String,
        /// Logical ids of the attached security groups.
        security_groups: Vec<String>,
        /// Capacity provider strategy.
        capacity_provider: String,
        /// Number of tasks kept running.
        desired_count: u32,
        /// Whether interactive command execution is enabled.
        enable_execute_command: bool,
        /// Service discovery registration.
        discovery: DiscoveryRegistration,
    },
    /// A reference to an existing private DNS namespace.
    DiscoveryNamespaceImport {
        /// Namespace name.
        name: String,
        /// Namespace identifier.
        id: String,
        /// Namespace ARN.
        arn: String,
    },
    /// A reference to an existing service discovery service.
    DiscoveryServiceImport {
        /// Logical id of the imported namespace.
        namespace: String,
        /// Service name.
        name: String,
        /// Service identifier.
        id: String,
        /// Service ARN.
        arn: String,
        /// DNS record type.
        record_type: DnsRecordType,
    },
    /// A VPC link from the gateway into the private network.
    VpcLink {
        /// Physical link name.
        name: String,
        /// Network identifier.
        vpc_id: String,
        /// Logical ids of the attached security groups.
        security_groups: Vec<String>,
    },
    /// A private HTTP API.
    HttpApi {
        /// Physical API name.
        name: String,
        /// API description.
        description: String,
        /// Default integration.
        integration: HttpIntegration,
    },
}

impl ResourceKind {
    /// Returns a short label for the kind, used in logs and generated identifiers.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Network { .. } => "network",
            Self::NetworkImport { .. } => "network-import",
            Self::Cluster { .. } => "cluster",
            Self::Role { .. } => "role",
            Self::LogGroupImport { .. } => "log-group-import",
            Self::TaskDefinition { .. } => "task-definition",
            Self::SecurityGroup { .. } => "security-group",
            Self::IngressRule { .. } => "ingress-rule",
            Self::Service { .. } => "service",
            Self::DiscoveryNamespaceImport { .. } => "discovery-namespace-import",
            Self::DiscoveryServiceImport { .. } => "discovery-service-import",
            Self::VpcLink { .. } => "vpc-link",
            Self::HttpApi { .. } => "http-api",
        }
    }
}

/// Subnet tier within the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SubnetKind {
    /// Routed to the internet gateway.
    Public,
    /// Private with outbound access through a NAT gateway.
    PrivateWithEgress,
    /// No route outside the network.
    Isolated,
}

/// A subnet group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubnetSpec {
    /// Group name.
    pub name: String,
    /// Subnet tier.
    pub kind: SubnetKind,
    /// Prefix length of each subnet.
    pub cidr_mask: u8,
}

/// A container within a task definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerSpec {
    /// Container name.
    pub name: String,
    /// Image URI.
    pub image: String,
    /// Container port, mapped to the same host port.
    pub port: u16,
    /// Logical id of the log group.
    pub log_group: String,
    /// Log stream prefix.
    pub log_stream_prefix: String,
}

/// An inclusive TCP port range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortRange {
    /// First port.
    pub from: u16,
    /// Last port.
    pub to: u16,
}

impl PortRange {
    /// Every TCP port.
    pub const ALL: Self = Self { from: 0, to: 65535 };
}

/// DNS record type used for service discovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DnsRecordType {
    /// Address record.
    A,
    /// Service record carrying host and port.
    Srv,
}

/// How a service registers itself in service discovery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryRegistration {
    /// Name registered in the namespace.
    pub name: String,
    /// Record type.
    pub record_type: DnsRecordType,
    /// Container that receives traffic.
    pub container: String,
    /// Port that receives traffic.
    pub port: u16,
    /// Record TTL in seconds.
    pub ttl_secs: u32,
}

/// Default integration of a private HTTP API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpIntegration {
    /// Logical id of the discovery service requests are proxied to.
    pub service: String,
    /// Logical id of the VPC link carrying the traffic.
    pub vpc_link: String,
}

/// Attribute names reported by the provisioner.
pub mod attr {
    /// Physical identifier.
    pub const ID: &str = "id";
    /// Amazon Resource Name.
    pub const ARN: &str = "arn";
    /// Physical name.
    pub const NAME: &str = "name";
    /// Invoke URL of an API.
    pub const ENDPOINT: &str = "endpoint";
    /// Identifier of the discovery namespace created with a cluster.
    pub const NAMESPACE_ID: &str = "namespace-id";
    /// ARN of the discovery namespace created with a cluster.
    pub const NAMESPACE_ARN: &str = "namespace-arn";
    /// Name of the discovery namespace created with a cluster.
    pub const NAMESPACE_NAME: &str = "namespace-name";
    /// Identifier of the discovery service a service registered in.
    pub const DISCOVERY_ID: &str = "discovery-id";
    /// ARN of the discovery service a service registered in.
    pub const DISCOVERY_ARN: &str = "discovery-arn";
    /// Name of the discovery service a service registered in.
    pub const DISCOVERY_NAME: &str = "discovery-name";
}

/// Attributes the provisioner reports for one resource, keyed by the
/// names in [`attr`].
pub type ResourceAttributes = BTreeMap<String, String>;

/// Concrete identifiers returned by the provisioning API for one unit,
/// keyed by logical id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisionedResources {
    resources: BTreeMap<String, ResourceAttributes>,
}

impl ProvisionedResources {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the attributes of a resource.
    pub fn insert(&mut self, logical_id: impl Into<String>, attributes: ResourceAttributes) {
        let _ = self.resources.insert(logical_id.into(), attributes);
    }

    /// Returns one attribute of one resource.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the resource or the attribute is absent.
    pub fn attribute(&self, logical_id: &str, key: &str) -> Result<&str> {
        self.resources
            .get(logical_id)
            .and_then(|attrs| attrs.get(key))
            .map(String::as_str)
            .ok_or_else(|| TierstackError::NotFound {
                kind: "resource attribute",
                id: format!("{logical_id}.{key}"),
            })
    }

    /// Returns the number of resources.
    #[must_use]
    pub fn len(&self) -> usize {
        self.resources.len()
    }

    /// Returns whether no resources were recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Iterates resources in logical id order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ResourceAttributes)> {
        self.resources.iter().map(|(k, v)| (k.as_str(), v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn declaration_serializes_with_type_tag() {
        let decl = ResourceDeclaration::new(
            "sg-ecs",
            ResourceKind::SecurityGroup {
                name: "shop-ecs-sg".into(),
                network: "vpc".into(),
            },
        );
        let json = serde_json::to_value(&decl).expect("serialize");
        assert_eq!(json["type"], "security-group");
        assert_eq!(json["logical_id"], "sg-ecs");
        assert_eq!(json["name"], "shop-ecs-sg");
        let back: ResourceDeclaration = serde_json::from_value(json).expect("deserialize");
        assert_eq!(back, decl);
    }

    #[test]
    fn attribute_lookup() {
        let mut resources = ProvisionedResources::new();
        let mut attrs = ResourceAttributes::new();
        let _ = attrs.insert("id".into(), "vpc-0abc".into());
        resources.insert("vpc", attrs);
        assert_eq!(resources.attribute("vpc", "id").expect("id"), "vpc-0abc");
        assert!(resources.attribute("vpc", "arn").is_err());
        assert!(resources.attribute("subnet", "id").is_err());
    }

    #[test]
    fn kind_labels_are_stable() {
        let kind = ResourceKind::LogGroupImport {
            name: "/aws/ecs/shop".into(),
        };
        assert_eq!(kind.label(), "log-group-import");
    }
}
