//! Resource units: independently deployable bundles of declarations.
//!
//! A unit declares the inputs it needs from elsewhere and the outputs it
//! offers to other units. Its inputs are filled exactly once, before
//! rendering; its computed outputs become readable only after the
//! provisioning API has accepted it, and each is evaluated at most once.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};
use tierstack_common::error::{Result, TierstackError};
use tierstack_common::types::ValueShape;

use crate::declaration::{ProvisionedResources, ResourceDeclaration};

/// Renders a unit's declarations from its resolved inputs.
pub type RenderFn = Box<dyn Fn(&ResolvedInputs) -> Result<Vec<ResourceDeclaration>> + Send + Sync>;

/// Computes an output from the unit's provisioned resources.
pub type OutputFn = Box<dyn Fn(&ProvisionedResources) -> Result<String> + Send + Sync>;

/// A declared input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputDecl {
    /// Input name, unique within the unit.
    pub name: String,
    /// Shape the resolved value must satisfy.
    pub shape: ValueShape,
}

enum OutputProducer {
    /// Known at declaration time; readable before provisioning.
    Static(String),
    /// Computed lazily from provisioned resources.
    Computed(OutputFn),
}

struct OutputDecl {
    name: String,
    producer: OutputProducer,
    value: OnceLock<String>,
}

/// Input values supplied to [`Unit::render`], keyed by input name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedInputs(BTreeMap<String, String>);

impl ResolvedInputs {
    /// Creates an empty mapping.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the value of an input.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let _ = self.0.insert(name.into(), value.into());
    }

    /// Returns the value of an input, if present.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    /// Returns the value of an input declared on `unit`.
    ///
    /// # Errors
    ///
    /// Returns `MissingInput` if the input has no value.
    pub fn require(&self, unit: &str, name: &str) -> Result<&str> {
        self.get(name).ok_or_else(|| TierstackError::MissingInput {
            unit: unit.to_owned(),
            input: name.to_owned(),
        })
    }

    /// Returns the number of values.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns whether no values are present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates values in input name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for ResolvedInputs {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// The declarations a unit hands to the provisioning API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderedUnit {
    /// Unit name.
    pub unit: String,
    /// Declarations in render order.
    pub declarations: Vec<ResourceDeclaration>,
}

/// A named, independently deployable bundle of resource declarations.
pub struct Unit {
    name: String,
    inputs: Vec<InputDecl>,
    outputs: Vec<OutputDecl>,
    renderer: RenderFn,
    provisioned: Option<ProvisionedResources>,
}

impl fmt::Debug for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Unit")
            .field("name", &self.name)
            .field("inputs", &self.inputs)
            .field("outputs", &self.output_names().collect::<Vec<_>>())
            .field("provisioned", &self.provisioned.is_some())
            .finish_non_exhaustive()
    }
}

impl Unit {
    /// Creates a unit with no inputs or outputs.
    pub fn new<F>(name: impl Into<String>, renderer: F) -> Self
    where
        F: Fn(&ResolvedInputs) -> Result<Vec<ResourceDeclaration>> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            renderer: Box::new(renderer),
            provisioned: None,
        }
    }

    /// Returns the unit name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Registers an expected input.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateInput` if `name` is already declared.
    pub fn declare_input(&mut self, name: impl Into<String>, shape: ValueShape) -> Result<()> {
        let name = name.into();
        if self.inputs.iter().any(|i| i.name == name) {
            return Err(TierstackError::DuplicateInput {
                unit: self.name.clone(),
                input: name,
            });
        }
        self.inputs.push(InputDecl { name, shape });
        Ok(())
    }

    /// Registers an output computed from the provisioned resources.
    ///
    /// `producer` runs at most once, the first time the output is read
    /// after provisioning.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateOutput` if `name` is already declared, or
    /// `InvalidKey` if it cannot appear in a store key.
    pub fn declare_output<F>(&mut self, name: impl Into<String>, producer: F) -> Result<()>
    where
        F: Fn(&ProvisionedResources) -> Result<String> + Send + Sync + 'static,
    {
        self.push_output(name.into(), OutputProducer::Computed(Box::new(producer)))
    }

    /// Registers an output whose value is fixed at declaration time,
    /// such as a physical name. It is readable before provisioning.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateOutput` if `name` is already declared, or
    /// `InvalidKey` if it cannot appear in a store key.
    pub fn declare_static_output(
        &mut self,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<()> {
        self.push_output(name.into(), OutputProducer::Static(value.into()))
    }

    fn push_output(&mut self, name: String, producer: OutputProducer) -> Result<()> {
        if name.is_empty() || name.contains('/') {
            return Err(TierstackError::InvalidKey {
                key: name,
                reason: "output names must be non-empty and must not contain '/'",
            });
        }
        if self.has_output(&name) {
            return Err(TierstackError::DuplicateOutput {
                unit: self.name.clone(),
                output: name,
            });
        }
        self.outputs.push(OutputDecl {
            name,
            producer,
            value: OnceLock::new(),
        });
        Ok(())
    }

    /// Returns the declared inputs in declaration order.
    #[must_use]
    pub fn inputs(&self) -> &[InputDecl] {
        &self.inputs
    }

    /// Returns the declared input named `name`, if any.
    #[must_use]
    pub fn input(&self, name: &str) -> Option<&InputDecl> {
        self.inputs.iter().find(|i| i.name == name)
    }

    /// Iterates output names in declaration order.
    pub fn output_names(&self) -> impl Iterator<Item = &str> {
        self.outputs.iter().map(|o| o.name.as_str())
    }

    /// Returns whether an output named `name` is declared.
    #[must_use]
    pub fn has_output(&self, name: &str) -> bool {
        self.outputs.iter().any(|o| o.name == name)
    }

    /// Produces the declarations to hand to the provisioning API.
    ///
    /// # Errors
    ///
    /// Returns `MissingInput` if a declared input has no value,
    /// `InvalidInput` if a value violates its shape, `Config` if two
    /// declarations share a logical id, or whatever the renderer returns.
    pub fn render(&self, inputs: &ResolvedInputs) -> Result<RenderedUnit> {
        for decl in &self.inputs {
            let value = inputs.require(&self.name, &decl.name)?;
            if !decl.shape.accepts(value) {
                return Err(TierstackError::InvalidInput {
                    unit: self.name.clone(),
                    input: decl.name.clone(),
                    expected: decl.shape.to_string(),
                    value: value.to_owned(),
                });
            }
        }
        let declarations = (self.renderer)(inputs)?;
        let mut seen = HashSet::new();
        for decl in &declarations {
            if !seen.insert(decl.logical_id.as_str()) {
                return Err(TierstackError::Config {
                    message: format!(
                        "unit \"{}\" declares logical id \"{}\" twice",
                        self.name, decl.logical_id
                    ),
                });
            }
        }
        tracing::debug!(unit = %self.name, count = declarations.len(), "unit rendered");
        Ok(RenderedUnit {
            unit: self.name.clone(),
            declarations,
        })
    }

    /// Records the identifiers returned by the provisioning API.
    ///
    /// Discards any computed outputs cached from an earlier provisioning,
    /// so a redeploy recomputes them.
    pub fn mark_provisioned(&mut self, resources: ProvisionedResources) {
        for output in &mut self.outputs {
            if matches!(output.producer, OutputProducer::Computed(_)) {
                output.value = OnceLock::new();
            }
        }
        self.provisioned = Some(resources);
    }

    /// Returns whether the unit has been provisioned.
    #[must_use]
    pub const fn is_provisioned(&self) -> bool {
        self.provisioned.is_some()
    }

    /// Returns the provisioned resources, if any.
    #[must_use]
    pub const fn provisioned(&self) -> Option<&ProvisionedResources> {
        self.provisioned.as_ref()
    }

    /// Reads an output.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if no such output is declared, `OutputNotReady`
    /// if it is computed and the unit is not provisioned yet, or the
    /// producer's own error.
    pub fn output(&self, name: &str) -> Result<String> {
        let output = self
            .outputs
            .iter()
            .find(|o| o.name == name)
            .ok_or_else(|| TierstackError::NotFound {
                kind: "output",
                id: format!("{}.{name}", self.name),
            })?;
        match &output.producer {
            OutputProducer::Static(value) => Ok(value.clone()),
            OutputProducer::Computed(producer) => {
                if let Some(value) = output.value.get() {
                    return Ok(value.clone());
                }
                let resources =
                    self.provisioned
                        .as_ref()
                        .ok_or_else(|| TierstackError::OutputNotReady {
                            unit: self.name.clone(),
                            output: name.to_owned(),
                        })?;
                let value = producer(resources)?;
                Ok(output.value.get_or_init(|| value).clone())
            }
        }
    }
}
