//! In-memory provisioning backend.
//!
//! Produces identifiers the way the provider would shape them, derived
//! from a SHA-256 digest of (account, region, unit, logical id) so that a
//! redeploy of the same unit reports the same identifiers.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::{Mutex, PoisonError};

use sha2::{Digest, Sha256};
use tierstack_common::config::EnvironmentConfig;
use tierstack_common::error::{Result, TierstackError};
use tierstack_compose::declaration::{
    ProvisionedResources, ResourceAttributes, ResourceKind, attr,
};
use tierstack_compose::unit::RenderedUnit;

use super::Provisioner;

/// Provisioner that fabricates deterministic identifiers.
#[derive(Debug)]
pub struct SimulatedProvisioner {
    account: String,
    region: String,
    failures: HashMap<String, String>,
    submitted: Mutex<Vec<RenderedUnit>>,
}

impl SimulatedProvisioner {
    /// Creates a provisioner for the given account and region.
    #[must_use]
    pub fn new(account: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            account: account.into(),
            region: region.into(),
            failures: HashMap::new(),
            submitted: Mutex::new(Vec::new()),
        }
    }

    /// Creates a provisioner for a configured environment.
    #[must_use]
    pub fn for_environment(environment: &EnvironmentConfig) -> Self {
        Self::new(&environment.account, &environment.region)
    }

    /// Makes every submission of `unit` fail with `message`.
    #[must_use]
    pub fn fail_unit(mut self, unit: impl Into<String>, message: impl Into<String>) -> Self {
        let _ = self.failures.insert(unit.into(), message.into());
        self
    }

    /// Returns every rendered unit submitted so far, in submission order.
    #[must_use]
    pub fn submitted(&self) -> Vec<RenderedUnit> {
        self.submitted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn digest(&self, unit: &str, logical_id: &str, len: usize) -> String {
        let hash = Sha256::digest(
            format!("{}/{}/{unit}/{logical_id}", self.account, self.region).as_bytes(),
        );
        let mut hex = String::with_capacity(hash.len() * 2);
        for byte in hash {
            let _ = write!(hex, "{byte:02x}");
        }
        hex.truncate(len);
        hex
    }

    fn arn(&self, service: &str, resource: &str) -> String {
        format!(
            "arn:aws:{service}:{}:{}:{resource}",
            self.region, self.account
        )
    }

    fn attributes(
        &self,
        unit: &str,
        logical_id: &str,
        kind: &ResourceKind,
        done: &ProvisionedResources,
    ) -> ResourceAttributes {
        let hash = |len| self.digest(unit, logical_id, len);
        let mut attrs = ResourceAttributes::new();
        let mut set = |key: &str, value: String| {
            let _ = attrs.insert(key.to_owned(), value);
        };
        match kind {
            ResourceKind::Network { .. } => {
                let id = format!("vpc-{}", hash(17));
                set(attr::ARN, self.arn("ec2", &format!("vpc/{id}")));
                set(attr::ID, id);
            }
            ResourceKind::NetworkImport { vpc_id } => {
                set(attr::ARN, self.arn("ec2", &format!("vpc/{vpc_id}")));
                set(attr::ID, vpc_id.clone());
            }
            ResourceKind::Cluster {
                name,
                discovery_namespace,
                ..
            } => {
                set(attr::ID, name.clone());
                set(attr::NAME, name.clone());
                set(attr::ARN, self.arn("ecs", &format!("cluster/{name}")));
                if let Some(namespace) = discovery_namespace {
                    let id = format!("ns-{}", hash(16));
                    set(
                        attr::NAMESPACE_ARN,
                        self.arn("servicediscovery", &format!("namespace/{id}")),
                    );
                    set(attr::NAMESPACE_ID, id);
                    set(attr::NAMESPACE_NAME, namespace.clone());
                }
            }
            ResourceKind::Role { name, .. } => {
                set(attr::ID, format!("AROA{}", hash(17).to_uppercase()));
                set(attr::NAME, name.clone());
                set(
                    attr::ARN,
                    format!("arn:aws:iam::{}:role/{name}", self.account),
                );
            }
            ResourceKind::LogGroupImport { name } => {
                set(attr::ID, name.clone());
                set(attr::NAME, name.clone());
                set(attr::ARN, self.arn("logs", &format!("log-group:{name}")));
            }
            ResourceKind::TaskDefinition { family, .. } => {
                set(attr::ID, format!("{family}:1"));
                set(attr::NAME, family.clone());
                set(
                    attr::ARN,
                    self.arn("ecs", &format!("task-definition/{family}:1")),
                );
            }
            ResourceKind::SecurityGroup { name, .. } => {
                let id = format!("sg-{}", hash(17));
                set(attr::ARN, self.arn("ec2", &format!("security-group/{id}")));
                set(attr::ID, id);
                set(attr::NAME, name.clone());
            }
            ResourceKind::IngressRule { .. } => {
                set(attr::ID, format!("sgr-{}", hash(17)));
            }
            ResourceKind::Service {
                name,
                cluster,
                discovery,
                ..
            } => {
                let cluster_name = done
                    .attribute(cluster, attr::NAME)
                    .unwrap_or(cluster.as_str())
                    .to_owned();
                set(attr::ID, name.clone());
                set(attr::NAME, name.clone());
                set(
                    attr::ARN,
                    self.arn("ecs", &format!("service/{cluster_name}/{name}")),
                );
                let srv = format!("srv-{}", hash(16));
                set(
                    attr::DISCOVERY_ARN,
                    self.arn("servicediscovery", &format!("service/{srv}")),
                );
                set(attr::DISCOVERY_ID, srv);
                set(attr::DISCOVERY_NAME, discovery.name.clone());
            }
            ResourceKind::DiscoveryNamespaceImport { name, id, arn }
            | ResourceKind::DiscoveryServiceImport { name, id, arn, .. } => {
                set(attr::ID, id.clone());
                set(attr::NAME, name.clone());
                set(attr::ARN, arn.clone());
            }
            ResourceKind::VpcLink { name, .. } => {
                let id = hash(6);
                set(
                    attr::ARN,
                    format!("arn:aws:apigateway:{}::/vpclinks/{id}", self.region),
                );
                set(attr::ID, id);
                set(attr::NAME, name.clone());
            }
            ResourceKind::HttpApi { name, .. } => {
                let id = hash(10);
                set(
                    attr::ENDPOINT,
                    format!("https://{id}.execute-api.{}.amazonaws.com", self.region),
                );
                set(
                    attr::ARN,
                    format!("arn:aws:apigateway:{}::/apis/{id}", self.region),
                );
                set(attr::ID, id);
                set(attr::NAME, name.clone());
            }
        }
        attrs
    }
}

impl Provisioner for SimulatedProvisioner {
    fn name(&self) -> &str {
        "simulated"
    }

    fn provision(&self, rendered: &RenderedUnit) -> Result<ProvisionedResources> {
        self.submitted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(rendered.clone());

        if let Some(message) = self.failures.get(&rendered.unit) {
            return Err(TierstackError::Provisioning {
                unit: rendered.unit.clone(),
                message: message.clone(),
            });
        }

        let mut resources = ProvisionedResources::new();
        for decl in &rendered.declarations {
            let attrs = self.attributes(&rendered.unit, &decl.logical_id, &decl.kind, &resources);
            tracing::debug!(
                unit = %rendered.unit,
                logical_id = %decl.logical_id,
                kind = decl.kind.label(),
                "resource provisioned"
            );
            resources.insert(decl.logical_id.clone(), attrs);
        }
        Ok(resources)
    }
}
