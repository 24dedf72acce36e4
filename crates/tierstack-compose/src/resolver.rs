//! Cross-unit reference resolution.
//!
//! Two strategies share the [`ReferenceResolver`] interface:
//!
//! - [`DirectResolver`]: in-process composition. A consumer reads the
//!   producer's output straight from the live [`Unit`], which must already
//!   be provisioned (or expose the output statically).
//! - [`IndirectResolver`]: out-of-process composition. A producer publishes
//!   each output to the parameter store under
//!   `/{namespace}/{unit}/{output}`; a consumer binds a deferred read of the
//!   same key, which only has to exist when the consumer is deployed.

use std::fmt;

use serde::{Deserialize, Serialize};
use tierstack_common::config::EmptyValuePolicy;
use tierstack_common::error::{Result, TierstackError};
use tierstack_common::types::{Naming, StoreKey, Topology};
use tierstack_store::{DeferredValue, ParameterClient, PutOutcome};

use crate::unit::Unit;

/// How a consumer input obtains its value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", tag = "kind")]
pub enum Binding {
    /// Read in memory from a unit of the same composition.
    Direct {
        /// Producer unit.
        producer: String,
        /// Producer output.
        output: String,
    },
    /// Read from the parameter store when the consumer is deployed.
    Deferred {
        /// Placeholder for the store read.
        value: DeferredValue,
    },
    /// A value fixed by configuration.
    Literal {
        /// The value.
        value: String,
    },
}

impl fmt::Display for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Direct { producer, output } => write!(f, "{producer}.{output}"),
            Self::Deferred { value } => write!(f, "{value}"),
            Self::Literal { value } => write!(f, "\"{value}\""),
        }
    }
}

/// A bound consumer input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reference {
    /// Consumer unit.
    pub consumer: String,
    /// Consumer input.
    pub input: String,
    /// Where the value comes from.
    pub binding: Binding,
    /// Producer output this input reads, for bindings made by
    /// [`Composition::connect`](crate::composition::Composition::connect).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<OutputRef>,
}

/// A producer unit's output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputRef {
    /// Producer unit.
    pub unit: String,
    /// Producer output.
    pub output: String,
}

/// An output captured after provisioning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishedOutput {
    /// Output name.
    pub name: String,
    /// Output value.
    pub value: String,
    /// Store key the value was written to, for indirect publication.
    pub key: Option<StoreKey>,
    /// Effect of the store write, for indirect publication.
    pub outcome: Option<PutOutcome>,
}

/// Strategy for binding and resolving references between units.
pub trait ReferenceResolver: Send + Sync {
    /// Returns the topology this strategy implements.
    fn topology(&self) -> Topology;

    /// Returns whether a producer must be part of the same composition.
    fn requires_local_producer(&self) -> bool;

    /// Returns the store client, if this strategy has one.
    fn client(&self) -> Option<&ParameterClient>;

    /// Binds `consumer.input` to `producer.output` at plan time.
    ///
    /// # Errors
    ///
    /// Returns a structural error if the binding cannot be expressed,
    /// e.g. an invalid store key.
    fn bind(&self, consumer: &str, input: &str, producer: &str, output: &str) -> Result<Binding>;

    /// Captures a provisioned unit's outputs, publishing them if the
    /// strategy is store-mediated.
    ///
    /// # Errors
    ///
    /// Returns the output producer's error, `EmptyOutput` under the
    /// `reject` policy, or a store error.
    fn publish(&self, unit: &Unit) -> Result<Vec<PublishedOutput>>;

    /// Binds `consumer.input` to an absolute store key owned outside the
    /// composition.
    ///
    /// # Errors
    ///
    /// Returns `Config` if the strategy has no store client.
    fn bind_key(&self, consumer: &str, input: &str, key: StoreKey) -> Result<Binding> {
        let client = self.client().ok_or_else(|| TierstackError::Config {
            message: format!(
                "input \"{input}\" of unit \"{consumer}\" reads {key} but no parameter store is configured"
            ),
        })?;
        Ok(Binding::Deferred {
            value: client.get_deferred(key).for_input(consumer, input),
        })
    }

    /// Produces the concrete value of a reference at deploy time.
    ///
    /// # Errors
    ///
    /// Returns `OutputNotReady` for a direct reference to an unprovisioned
    /// producer, `UnresolvedReference` for a deferred read whose key is
    /// still absent, or `NotFound` for an unknown producer.
    fn realize(&self, reference: &Reference, units: &[Unit]) -> Result<String> {
        match &reference.binding {
            Binding::Literal { value } => Ok(value.clone()),
            Binding::Direct { producer, output } => {
                let unit = units
                    .iter()
                    .find(|u| u.name() == producer)
                    .ok_or_else(|| TierstackError::NotFound {
                        kind: "unit",
                        id: producer.clone(),
                    })?;
                DirectResolver::read(unit, output)
            }
            Binding::Deferred { value } => {
                let client = self.client().ok_or_else(|| TierstackError::Config {
                    message: format!("no parameter store configured to resolve {value}"),
                })?;
                client.resolve(value)
            }
        }
    }
}

/// Reads one output under the empty-value policy.
fn capture(unit: &Unit, output: &str, policy: EmptyValuePolicy) -> Result<String> {
    let value = unit.output(output)?;
    if value.is_empty() && policy == EmptyValuePolicy::Reject {
        return Err(TierstackError::EmptyOutput {
            unit: unit.name().to_owned(),
            output: output.to_owned(),
        });
    }
    Ok(value)
}

/// In-memory resolution between units of one composition.
#[derive(Debug, Clone, Default)]
pub struct DirectResolver {
    client: Option<ParameterClient>,
    empty_values: EmptyValuePolicy,
}

impl DirectResolver {
    /// Creates a resolver without store access.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Allows bindings to externally owned store keys.
    #[must_use]
    pub fn with_store(mut self, client: ParameterClient) -> Self {
        self.client = Some(client);
        self
    }

    /// Sets the policy for empty outputs.
    #[must_use]
    pub const fn with_empty_values(mut self, policy: EmptyValuePolicy) -> Self {
        self.empty_values = policy;
        self
    }

    /// Resolves `consumer.input` from `producer.output` synchronously.
    ///
    /// # Errors
    ///
    /// Returns `OutputNotReady` if the producer has not computed the output
    /// yet, or `NotFound` if it declares no such output.
    pub fn resolve(
        &self,
        consumer: &str,
        input: &str,
        producer: &Unit,
        output: &str,
    ) -> Result<String> {
        let value = Self::read(producer, output)?;
        tracing::debug!(consumer, input, producer = producer.name(), output, "direct reference resolved");
        Ok(value)
    }

    fn read(producer: &Unit, output: &str) -> Result<String> {
        producer.output(output)
    }
}

impl ReferenceResolver for DirectResolver {
    fn topology(&self) -> Topology {
        Topology::InProcess
    }

    fn requires_local_producer(&self) -> bool {
        true
    }

    fn client(&self) -> Option<&ParameterClient> {
        self.client.as_ref()
    }

    fn bind(&self, _consumer: &str, _input: &str, producer: &str, output: &str) -> Result<Binding> {
        Ok(Binding::Direct {
            producer: producer.to_owned(),
            output: output.to_owned(),
        })
    }

    fn publish(&self, unit: &Unit) -> Result<Vec<PublishedOutput>> {
        unit.output_names()
            .map(|name| {
                Ok(PublishedOutput {
                    name: name.to_owned(),
                    value: capture(unit, name, self.empty_values)?,
                    key: None,
                    outcome: None,
                })
            })
            .collect()
    }
}

/// Store-mediated resolution between independently deployed units.
#[derive(Debug, Clone)]
pub struct IndirectResolver {
    client: ParameterClient,
    naming: Naming,
    empty_values: EmptyValuePolicy,
}

impl IndirectResolver {
    /// Creates a resolver publishing under `naming`'s namespace.
    #[must_use]
    pub fn new(client: ParameterClient, naming: Naming) -> Self {
        Self {
            client,
            naming,
            empty_values: EmptyValuePolicy::default(),
        }
    }

    /// Sets the policy for empty outputs.
    #[must_use]
    pub const fn with_empty_values(mut self, policy: EmptyValuePolicy) -> Self {
        self.empty_values = policy;
        self
    }

    /// Returns the key under which `unit` publishes `output`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidKey` if the names do not form a valid key.
    pub fn key_for(&self, unit: &str, output: &str) -> Result<StoreKey> {
        self.naming.key(unit, output)
    }

    /// Computes `output` of a provisioned unit and writes it to the store.
    ///
    /// # Errors
    ///
    /// Returns `OutputNotReady` if the unit is not provisioned,
    /// `EmptyOutput` under the `reject` policy, or a store error.
    pub fn publish_output(&self, unit: &Unit, output: &str) -> Result<PublishedOutput> {
        let value = capture(unit, output, self.empty_values)?;
        let key = self.key_for(unit.name(), output)?;
        let outcome = self.client.put(&key, &value)?;
        Ok(PublishedOutput {
            name: output.to_owned(),
            value,
            key: Some(key),
            outcome: Some(outcome),
        })
    }

    /// Binds `consumer.input` to a deferred read of `producer.output`.
    ///
    /// Succeeds whether or not the producer has ever been deployed.
    ///
    /// # Errors
    ///
    /// Returns `InvalidKey` if the names do not form a valid key.
    pub fn consume(
        &self,
        consumer: &str,
        input: &str,
        producer: &str,
        output: &str,
    ) -> Result<DeferredValue> {
        let key = self.key_for(producer, output)?;
        Ok(self.client.get_deferred(key).for_input(consumer, input))
    }
}

impl ReferenceResolver for IndirectResolver {
    fn topology(&self) -> Topology {
        Topology::OutOfProcess
    }

    fn requires_local_producer(&self) -> bool {
        false
    }

    fn client(&self) -> Option<&ParameterClient> {
        Some(&self.client)
    }

    fn bind(&self, consumer: &str, input: &str, producer: &str, output: &str) -> Result<Binding> {
        Ok(Binding::Deferred {
            value: self.consume(consumer, input, producer, output)?,
        })
    }

    fn publish(&self, unit: &Unit) -> Result<Vec<PublishedOutput>> {
        unit.output_names()
            .map(|name| self.publish_output(unit, name))
            .collect()
    }
}
