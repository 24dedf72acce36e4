//! Domain primitive types used across the Tierstack workspace.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TierstackError};

/// A store namespace, the first path segment(s) of every key this system writes.
///
/// Stored without leading or trailing slashes; nested namespaces such as
/// `cdk/shop` are allowed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Namespace(String);

impl Namespace {
    /// Parses a namespace, trimming surrounding slashes.
    ///
    /// # Errors
    ///
    /// Returns `InvalidKey` if the namespace is empty, has empty segments,
    /// or contains whitespace.
    pub fn new(raw: impl Into<String>) -> Result<Self> {
        let raw = raw.into();
        let trimmed = raw.trim_matches('/');
        if trimmed.is_empty() {
            return Err(TierstackError::InvalidKey {
                key: raw,
                reason: "namespace must not be empty",
            });
        }
        validate_segments(trimmed, &raw)?;
        Ok(Self(trimmed.to_owned()))
    }

    /// Returns the namespace without surrounding slashes.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Namespace {
    type Error = TierstackError;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<Namespace> for String {
    fn from(value: Namespace) -> Self {
        value.0
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An absolute, hierarchical parameter store key such as `/app/network/id`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct StoreKey(String);

impl StoreKey {
    /// Parses an absolute key.
    ///
    /// # Errors
    ///
    /// Returns `InvalidKey` if the key does not start with `/`, ends with
    /// `/`, has empty segments, or contains whitespace.
    pub fn parse(raw: impl Into<String>) -> Result<Self> {
        let raw = raw.into();
        let Some(rest) = raw.strip_prefix('/') else {
            return Err(TierstackError::InvalidKey {
                key: raw,
                reason: "key must start with '/'",
            });
        };
        if rest.is_empty() {
            return Err(TierstackError::InvalidKey {
                key: raw,
                reason: "key must have at least one segment",
            });
        }
        validate_segments(rest, &raw)?;
        Ok(Self(raw))
    }

    /// Builds the key under which `unit` publishes `output`:
    /// `/{namespace}/{unit}/{output}`.
    ///
    /// The result depends only on its three arguments, so a consumer can
    /// compute it before the producer has ever been deployed.
    ///
    /// # Errors
    ///
    /// Returns `InvalidKey` if the unit or output name contains `/` or
    /// either part is not a valid key segment.
    pub fn for_output(namespace: &Namespace, unit: &str, output: &str) -> Result<Self> {
        if unit.contains('/') {
            return Err(TierstackError::InvalidKey {
                key: unit.to_owned(),
                reason: "unit names must not contain '/'",
            });
        }
        if output.contains('/') {
            return Err(TierstackError::InvalidKey {
                key: output.to_owned(),
                reason: "output names must not contain '/'",
            });
        }
        Self::parse(format!("/{namespace}/{unit}/{output}"))
    }

    /// Returns the key as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns whether this key lies under `prefix` (segment-aligned).
    #[must_use]
    pub fn starts_with(&self, prefix: &str) -> bool {
        let prefix = prefix.trim_end_matches('/');
        if prefix.is_empty() {
            return true;
        }
        self.0 == prefix
            || self
                .0
                .strip_prefix(prefix)
                .is_some_and(|rest| rest.starts_with('/'))
    }
}

impl TryFrom<String> for StoreKey {
    type Error = TierstackError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(value)
    }
}

impl From<StoreKey> for String {
    fn from(value: StoreKey) -> Self {
        value.0
    }
}

impl fmt::Display for StoreKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

fn validate_segments(path: &str, raw: &str) -> Result<()> {
    if path.split('/').any(str::is_empty) {
        return Err(TierstackError::InvalidKey {
            key: raw.to_owned(),
            reason: "key segments must not be empty",
        });
    }
    if path.chars().any(char::is_whitespace) {
        return Err(TierstackError::InvalidKey {
            key: raw.to_owned(),
            reason: "key must not contain whitespace",
        });
    }
    Ok(())
}

/// Naming context injected into a composition at construction.
///
/// Carries the store namespace used to derive output keys and the prefix
/// applied to every physical resource name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Naming {
    namespace: Namespace,
    prefix: String,
}

impl Naming {
    /// Creates a naming context.
    #[must_use]
    pub fn new(namespace: Namespace, prefix: impl Into<String>) -> Self {
        Self {
            namespace,
            prefix: prefix.into(),
        }
    }

    /// Returns the store namespace.
    #[must_use]
    pub const fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    /// Returns the resource naming prefix.
    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Returns `{prefix}-{suffix}`.
    #[must_use]
    pub fn resource(&self, suffix: &str) -> String {
        format!("{}-{suffix}", self.prefix)
    }

    /// Returns the store key for a unit output.
    ///
    /// # Errors
    ///
    /// See [`StoreKey::for_output`].
    pub fn key(&self, unit: &str, output: &str) -> Result<StoreKey> {
        StoreKey::for_output(&self.namespace, unit, output)
    }
}

/// How units obtain each other's outputs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Topology {
    /// All units live in one run and read each other's outputs in memory.
    InProcess,
    /// Units publish outputs to the parameter store and read them back by key.
    #[default]
    OutOfProcess,
}

impl fmt::Display for Topology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InProcess => write!(f, "in-process"),
            Self::OutOfProcess => write!(f, "out-of-process"),
        }
    }
}

/// Expected shape of a unit input value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ValueShape {
    /// Any string, including the empty string.
    Any,
    /// Any non-empty string.
    NonEmpty,
    /// A resource identifier with the given prefix, e.g. `vpc-`.
    Identifier(String),
    /// An Amazon Resource Name.
    Arn,
}

impl ValueShape {
    /// Returns whether `value` satisfies this shape.
    #[must_use]
    pub fn accepts(&self, value: &str) -> bool {
        match self {
            Self::Any => true,
            Self::NonEmpty => !value.is_empty(),
            Self::Identifier(prefix) => value.len() > prefix.len() && value.starts_with(prefix),
            Self::Arn => value.starts_with("arn:") && value.split(':').count() >= 6,
        }
    }
}

impl fmt::Display for ValueShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => write!(f, "any value"),
            Self::NonEmpty => write!(f, "a non-empty value"),
            Self::Identifier(prefix) => write!(f, "an identifier starting with \"{prefix}\""),
            Self::Arn => write!(f, "an ARN"),
        }
    }
}

/// Lifecycle state of a unit during one deployment run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UnitState {
    /// Declared in the plan; not yet attempted.
    Declared,
    /// Inputs are being resolved.
    InputsResolving,
    /// Every input has a concrete value.
    InputsResolved,
    /// Resource declarations are being rendered and submitted.
    Rendering,
    /// The provisioning API accepted the unit.
    Provisioned,
    /// Outputs were captured and, if indirect, written to the store.
    OutputsPublished,
    /// An input could not be resolved or rendered.
    InputResolutionFailed,
    /// The provisioning API or the publish step failed.
    ProvisioningFailed,
}

impl UnitState {
    /// Returns whether this is a terminal failure state.
    #[must_use]
    pub const fn is_failure(self) -> bool {
        matches!(self, Self::InputResolutionFailed | Self::ProvisioningFailed)
    }

    /// Returns whether no further transition is possible in this run.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::OutputsPublished | Self::InputResolutionFailed | Self::ProvisioningFailed
        )
    }
}

impl fmt::Display for UnitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Declared => "declared",
            Self::InputsResolving => "inputs-resolving",
            Self::InputsResolved => "inputs-resolved",
            Self::Rendering => "rendering",
            Self::Provisioned => "provisioned",
            Self::OutputsPublished => "outputs-published",
            Self::InputResolutionFailed => "input-resolution-failed",
            Self::ProvisioningFailed => "provisioning-failed",
        };
        write!(f, "{label}")
    }
}
