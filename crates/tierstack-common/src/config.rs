//! Plan configuration model.
//!
//! A [`PlanConfig`] supplies the concrete parameters a deployment plan
//! needs: naming, the reference topology, compute sizing, the container
//! image, and where the network comes from. Every field has a default, so
//! a configuration file only needs to name what it overrides.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::constants;
use crate::error::{Result, TierstackError};
use crate::types::{Namespace, Naming, StoreKey, Topology};

/// Root configuration of a deployment plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PlanConfig {
    /// Store namespace under which outputs are published.
    pub namespace: String,
    /// Prefix applied to every physical resource name.
    pub prefix: String,
    /// Whether units exchange outputs in memory or through the store.
    pub topology: Topology,
    /// What to do with outputs that evaluate to an empty string.
    pub empty_values: EmptyValuePolicy,
    /// Account and region the plan targets.
    pub environment: EnvironmentConfig,
    /// Private network settings.
    pub network: NetworkConfig,
    /// Compute service settings.
    pub compute: ComputeConfig,
    /// Container image coordinates.
    pub image: ImageConfig,
}

impl Default for PlanConfig {
    fn default() -> Self {
        Self {
            namespace: constants::DEFAULT_NAMESPACE.into(),
            prefix: constants::DEFAULT_PREFIX.into(),
            topology: Topology::default(),
            empty_values: EmptyValuePolicy::default(),
            environment: EnvironmentConfig::default(),
            network: NetworkConfig::default(),
            compute: ComputeConfig::default(),
            image: ImageConfig::default(),
        }
    }
}

/// Policy for outputs that evaluate to an empty string.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EmptyValuePolicy {
    /// Fail the publish step with `EmptyOutput`.
    #[default]
    Reject,
    /// Publish the empty string as a regular value.
    Allow,
}

/// Target account and region.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EnvironmentConfig {
    /// Account identifier used in ARNs.
    pub account: String,
    /// Region used in ARNs.
    pub region: String,
}

impl Default for EnvironmentConfig {
    fn default() -> Self {
        Self {
            account: constants::DEFAULT_ACCOUNT.into(),
            region: constants::DEFAULT_REGION.into(),
        }
    }
}

/// Private network settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NetworkConfig {
    /// CIDR block of the network.
    pub cidr: String,
    /// Number of availability zones.
    pub max_azs: u8,
    /// Where consumers obtain the network identifier.
    pub source: NetworkSource,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            cidr: constants::DEFAULT_CIDR.into(),
            max_azs: constants::DEFAULT_MAX_AZS,
            source: NetworkSource::Managed,
        }
    }
}

/// Origin of the network identifier consumed by the compute and gateway units.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", tag = "kind")]
pub enum NetworkSource {
    /// The plan declares its own network unit.
    #[default]
    Managed,
    /// A network owned outside this system, passed by identifier.
    Handle {
        /// Identifier of the existing network.
        vpc_id: String,
    },
    /// A network owned outside this system, read from a store key at deploy time.
    Lookup {
        /// Absolute store key holding the network identifier.
        key: String,
    },
}

/// Compute service settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ComputeConfig {
    /// Task memory in MiB.
    pub task_memory_mib: u32,
    /// Task CPU units.
    pub task_cpu: u32,
    /// Port the container listens on.
    pub container_port: u16,
    /// Number of tasks the service keeps running.
    pub desired_count: u32,
    /// Capacity provider used by the service.
    pub capacity_provider: String,
    /// Service discovery namespace settings.
    pub discovery: DiscoveryConfig,
}

impl Default for ComputeConfig {
    fn default() -> Self {
        Self {
            task_memory_mib: constants::DEFAULT_TASK_MEMORY_MIB,
            task_cpu: constants::DEFAULT_TASK_CPU,
            container_port: constants::DEFAULT_CONTAINER_PORT,
            desired_count: 1,
            capacity_provider: constants::DEFAULT_CAPACITY_PROVIDER.into(),
            discovery: DiscoveryConfig::default(),
        }
    }
}

/// Service discovery namespace: created with the cluster or passed in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", tag = "mode")]
pub enum DiscoveryConfig {
    /// The compute unit creates a private DNS namespace.
    Create {
        /// DNS name of the namespace.
        name: String,
    },
    /// An existing namespace is reused.
    Existing {
        /// DNS name of the namespace.
        name: String,
        /// Namespace identifier.
        id: String,
        /// Namespace ARN.
        arn: String,
    },
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self::Create {
            name: constants::DEFAULT_DISCOVERY_NAMESPACE.into(),
        }
    }
}

impl DiscoveryConfig {
    /// Returns the namespace DNS name.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Create { name } | Self::Existing { name, .. } => name,
        }
    }
}

/// Container image coordinates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ImageConfig {
    /// Repository name.
    pub repository: String,
    /// Image tag.
    pub tag: String,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            repository: constants::DEFAULT_IMAGE_REPOSITORY.into(),
            tag: constants::DEFAULT_IMAGE_TAG.into(),
        }
    }
}

impl PlanConfig {
    /// Loads a configuration file, choosing the format by extension
    /// (`.yaml`/`.yml` or `.json`).
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, has an unknown
    /// extension, fails to parse, or fails validation.
    pub fn load(path: &Path) -> Result<Self> {
        tracing::info!(path = %path.display(), "loading plan configuration");
        let content = std::fs::read_to_string(path).map_err(|e| TierstackError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        let config = match path.extension().and_then(|e| e.to_str()) {
            Some("yaml" | "yml") => Self::from_yaml_str(&content)?,
            Some("json") => Self::from_json_str(&content)?,
            _ => {
                return Err(TierstackError::Config {
                    message: format!("unsupported configuration format: {}", path.display()),
                });
            }
        };
        config.validate()?;
        Ok(config)
    }

    /// Parses a YAML configuration without validating it.
    ///
    /// # Errors
    ///
    /// Returns an error if the document is not valid YAML for this model.
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// Parses a JSON configuration without validating it.
    ///
    /// # Errors
    ///
    /// Returns an error if the document is not valid JSON for this model.
    pub fn from_json_str(content: &str) -> Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    /// Checks the configuration for values the plan cannot honour.
    ///
    /// # Errors
    ///
    /// Returns `Config` (or `InvalidKey`) describing the first problem found.
    pub fn validate(&self) -> Result<()> {
        let _ = self.naming()?;
        if self.prefix.is_empty() || self.prefix.chars().any(char::is_whitespace) {
            return Err(config_error(format!("invalid resource prefix: \"{}\"", self.prefix)));
        }
        if self.network.max_azs == 0 {
            return Err(config_error("network.max_azs must be at least 1"));
        }
        match &self.network.source {
            NetworkSource::Managed => {}
            NetworkSource::Handle { vpc_id } if vpc_id.is_empty() => {
                return Err(config_error("network.source.vpc_id must not be empty"));
            }
            NetworkSource::Handle { .. } => {}
            NetworkSource::Lookup { key } => {
                let _ = StoreKey::parse(key.as_str())?;
            }
        }
        self.validate_compute()?;
        if self.image.repository.is_empty() || self.image.tag.is_empty() {
            return Err(config_error("image.repository and image.tag are required"));
        }
        Ok(())
    }

    fn validate_compute(&self) -> Result<()> {
        let compute = &self.compute;
        if !constants::TASK_CPU_VALUES.contains(&compute.task_cpu) {
            return Err(config_error(format!(
                "compute.task_cpu must be one of {:?}, got {}",
                constants::TASK_CPU_VALUES,
                compute.task_cpu
            )));
        }
        let (min, max) = memory_range_mib(compute.task_cpu);
        if compute.task_memory_mib < min || compute.task_memory_mib > max {
            return Err(config_error(format!(
                "compute.task_memory_mib must be within {min}..={max} for {} CPU units, got {}",
                compute.task_cpu, compute.task_memory_mib
            )));
        }
        if compute.container_port == 0 {
            return Err(config_error("compute.container_port must not be 0"));
        }
        if compute.capacity_provider.is_empty() {
            return Err(config_error("compute.capacity_provider must not be empty"));
        }
        match &compute.discovery {
            DiscoveryConfig::Create { name } if name.is_empty() => {
                Err(config_error("compute.discovery.name must not be empty"))
            }
            DiscoveryConfig::Existing { name, id, arn }
                if name.is_empty() || id.is_empty() || arn.is_empty() =>
            {
                Err(config_error(
                    "an existing discovery namespace needs name, id and arn",
                ))
            }
            _ => Ok(()),
        }
    }

    /// Returns the naming context derived from `namespace` and `prefix`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidKey` if the namespace is not a valid key prefix.
    pub fn naming(&self) -> Result<Naming> {
        Ok(Naming::new(
            Namespace::new(self.namespace.as_str())?,
            self.prefix.as_str(),
        ))
    }
}

/// Memory range in MiB permitted for a given CPU value.
const fn memory_range_mib(cpu: u32) -> (u32, u32) {
    match cpu {
        256 => (512, 2048),
        512 => (1024, 4096),
        1024 => (2048, 8192),
        2048 => (4096, 16384),
        _ => (8192, 30720),
    }
}

fn config_error(message: impl Into<String>) -> TierstackError {
    TierstackError::Config {
        message: message.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = PlanConfig::default();
        config.validate().expect("defaults should validate");
        assert_eq!(config.compute.task_memory_mib, 512);
        assert_eq!(config.compute.task_cpu, 256);
        assert_eq!(config.topology, Topology::OutOfProcess);
    }

    #[test]
    fn yaml_overrides_only_named_fields() {
        let yaml = r#"
namespace: shop
topology: in-process
compute:
  task_memory_mib: 1024
  task_cpu: 512
image:
  repository: shop-api
  tag: v2
"#;
        let config = PlanConfig::from_yaml_str(yaml).expect("parse");
        config.validate().expect("valid");
        assert_eq!(config.namespace, "shop");
        assert_eq!(config.topology, Topology::InProcess);
        assert_eq!(config.compute.task_memory_mib, 1024);
        assert_eq!(config.compute.container_port, 80);
        assert_eq!(config.image.tag, "v2");
        assert_eq!(config.prefix, constants::DEFAULT_PREFIX);
    }

    #[test]
    fn yaml_network_lookup_source() {
        let yaml = r#"
network:
  source:
    kind: lookup
    key: /shared/network/id
"#;
        let config = PlanConfig::from_yaml_str(yaml).expect("parse");
        assert_eq!(
            config.network.source,
            NetworkSource::Lookup {
                key: "/shared/network/id".into()
            }
        );
        config.validate().expect("valid");
    }

    #[test]
    fn json_existing_discovery_namespace() {
        let json = r#"{
            "compute": {
                "discovery": {
                    "mode": "existing",
                    "name": "internal.",
                    "id": "ns-123",
                    "arn": "arn:aws:servicediscovery:ap-northeast-1:000000000000:namespace/ns-123"
                }
            }
        }"#;
        let config = PlanConfig::from_json_str(json).expect("parse");
        config.validate().expect("valid");
        assert_eq!(config.compute.discovery.name(), "internal.");
    }

    #[test]
    fn unknown_fields_are_rejected() {
        assert!(PlanConfig::from_yaml_str("namespce: typo\n").is_err());
    }

    #[test]
    fn invalid_cpu_is_rejected() {
        let mut config = PlanConfig::default();
        config.compute.task_cpu = 300;
        let msg = config.validate().expect_err("should fail").to_string();
        assert!(msg.contains("task_cpu"), "got: {msg}");
    }

    #[test]
    fn memory_outside_cpu_range_is_rejected() {
        let mut config = PlanConfig::default();
        config.compute.task_memory_mib = 4096;
        assert!(config.validate().is_err());
    }

    #[test]
    fn bad_lookup_key_is_rejected() {
        let mut config = PlanConfig::default();
        config.network.source = NetworkSource::Lookup {
            key: "relative/key".into(),
        };
        assert!(matches!(
            config.validate(),
            Err(TierstackError::InvalidKey { .. })
        ));
    }

    #[test]
    fn existing_discovery_requires_identifiers() {
        let mut config = PlanConfig::default();
        config.compute.discovery = DiscoveryConfig::Existing {
            name: "internal.".into(),
            id: String::new(),
            arn: String::new(),
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn load_picks_format_by_extension() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("plan.yml");
        std::fs::write(&path, "prefix: shop\n").expect("write");
        let config = PlanConfig::load(&path).expect("load");
        assert_eq!(config.prefix, "shop");

        let unknown = dir.path().join("plan.toml");
        std::fs::write(&unknown, "prefix = 'shop'\n").expect("write");
        assert!(PlanConfig::load(&unknown).is_err());
    }

    #[test]
    fn load_missing_file_is_io_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let result = PlanConfig::load(&dir.path().join("absent.yaml"));
        assert!(matches!(result, Err(TierstackError::Io { .. })));
    }
}
