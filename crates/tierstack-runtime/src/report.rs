//! Deployment reports.
//!
//! A report records the order a run followed and, per attempted unit, the
//! final state, the inputs it resolved and the outputs it published. When
//! a unit fails, the report names it, the state it failed in, and every
//! unit the run never reached.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tierstack_common::error::{Result, TierstackError};
use tierstack_common::types::{Topology, UnitState};
use tierstack_compose::resolver::PublishedOutput;
use uuid::Uuid;

/// Outcome of one unit within a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitRecord {
    /// Unit name.
    pub name: String,
    /// Final state.
    pub state: UnitState,
    /// State the unit was in when it failed.
    pub failed_during: Option<UnitState>,
    /// Failure message.
    pub error: Option<String>,
    /// Concrete input values, by input name.
    pub inputs: BTreeMap<String, String>,
    /// Number of declarations handed to the provisioner.
    pub declarations: usize,
    /// Captured outputs.
    pub outputs: Vec<PublishedOutput>,
}

impl UnitRecord {
    pub(crate) fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: UnitState::Declared,
            failed_during: None,
            error: None,
            inputs: BTreeMap::new(),
            declarations: 0,
            outputs: Vec::new(),
        }
    }

    /// Returns the value published for `output`.
    #[must_use]
    pub fn output(&self, output: &str) -> Option<&str> {
        self.outputs
            .iter()
            .find(|o| o.name == output)
            .map(|o| o.value.as_str())
    }
}

/// Summary of one deployment run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentReport {
    /// Unique run identifier.
    pub run_id: Uuid,
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// When the run stopped.
    pub finished_at: DateTime<Utc>,
    /// Reference resolution strategy.
    pub topology: Topology,
    /// Provisioning backend.
    pub provisioner: String,
    /// Deployment order computed for the run.
    pub order: Vec<String>,
    /// Attempted units, in order.
    pub units: Vec<UnitRecord>,
    /// Units the run halted before reaching, in order.
    pub never_attempted: Vec<String>,
}

impl DeploymentReport {
    /// Returns whether every unit published its outputs.
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.never_attempted.is_empty()
            && self
                .units
                .iter()
                .all(|u| u.state == UnitState::OutputsPublished)
    }

    /// Returns the unit that halted the run.
    #[must_use]
    pub fn failure(&self) -> Option<&UnitRecord> {
        self.units.iter().find(|u| u.state.is_failure())
    }

    /// Returns the record of `name`, if the run attempted it.
    #[must_use]
    pub fn unit(&self, name: &str) -> Option<&UnitRecord> {
        self.units.iter().find(|u| u.name == name)
    }

    /// Serializes the report as pretty JSON.
    ///
    /// # Errors
    ///
    /// Returns `Serialization` if encoding fails.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Writes the report to `path` atomically.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding or writing fails.
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = self.to_json()?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json).map_err(|e| TierstackError::Io {
            path: tmp.clone(),
            source: e,
        })?;
        std::fs::rename(&tmp, path).map_err(|e| TierstackError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        tracing::debug!(path = %path.display(), run_id = %self.run_id, "report saved");
        Ok(())
    }

    /// Reads a report written by [`DeploymentReport::save`].
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| TierstackError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        Ok(serde_json::from_str(&content)?)
    }
}

impl fmt::Display for DeploymentReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "run {} ({}, {}): {}",
            self.run_id,
            self.topology,
            self.provisioner,
            self.order.join(" -> ")
        )?;
        for unit in &self.units {
            write!(f, "  {:<10} {}", unit.name, unit.state)?;
            if let Some(during) = unit.failed_during {
                write!(f, " (during {during})")?;
            }
            if let Some(error) = &unit.error {
                write!(f, ": {error}")?;
            }
            writeln!(f)?;
            for output in &unit.outputs {
                match &output.key {
                    Some(key) => writeln!(f, "    {key} = {}", output.value)?,
                    None => writeln!(f, "    {} = {}", output.name, output.value)?,
                }
            }
        }
        if !self.never_attempted.is_empty() {
            writeln!(f, "  never attempted: {}", self.never_attempted.join(", "))?;
        }
        Ok(())
    }
}
