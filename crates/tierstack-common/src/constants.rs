//! System-wide constants and configuration defaults.

/// Default store namespace for published outputs.
pub const DEFAULT_NAMESPACE: &str = "app";

/// Default prefix applied to every physical resource name.
pub const DEFAULT_PREFIX: &str = "tierstack";

/// Default account used when building ARNs.
pub const DEFAULT_ACCOUNT: &str = "000000000000";

/// Default region used when building ARNs.
pub const DEFAULT_REGION: &str = "ap-northeast-1";

/// Default CIDR block of the private network.
pub const DEFAULT_CIDR: &str = "10.0.0.0/16";

/// Default number of availability zones spanned by the network.
pub const DEFAULT_MAX_AZS: u8 = 1;

/// Default task memory in MiB.
pub const DEFAULT_TASK_MEMORY_MIB: u32 = 512;

/// Default task CPU units.
pub const DEFAULT_TASK_CPU: u32 = 256;

/// Default port the application container listens on.
pub const DEFAULT_CONTAINER_PORT: u16 = 80;

/// Default capacity provider for the compute service.
pub const DEFAULT_CAPACITY_PROVIDER: &str = "FARGATE_SPOT";

/// Default private DNS namespace for service discovery.
pub const DEFAULT_DISCOVERY_NAMESPACE: &str = "example.com.";

/// Name the service registers under in service discovery.
pub const DISCOVERY_SERVICE_NAME: &str = "fargate-service-discovery";

/// TTL of service discovery DNS records, in seconds.
pub const DISCOVERY_DNS_TTL_SECS: u32 = 30;

/// Default container image repository.
pub const DEFAULT_IMAGE_REPOSITORY: &str = "tierstack-example";

/// Default container image tag.
pub const DEFAULT_IMAGE_TAG: &str = "fastapi";

/// CPU values accepted for a task, in CPU units.
pub const TASK_CPU_VALUES: [u32; 5] = [256, 512, 1024, 2048, 4096];

/// Name of the network unit in the three-tier topology.
pub const NETWORK_UNIT: &str = "network";

/// Name of the compute unit in the three-tier topology.
pub const COMPUTE_UNIT: &str = "compute";

/// Name of the gateway unit in the three-tier topology.
pub const GATEWAY_UNIT: &str = "gateway";

/// Application name used in logs and reports.
pub const APP_NAME: &str = "tierstack";
