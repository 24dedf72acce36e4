//! Unified error types for the Tierstack workspace.
//!
//! Errors fall into two families. Structural and configuration errors are
//! raised while a plan is being constructed, before anything is handed to
//! the provisioning API. Runtime errors surface while a plan is executing
//! and halt forward progress without any implicit rollback.

use std::path::PathBuf;

use thiserror::Error;

/// Top-level error type shared across the workspace.
#[derive(Debug, Error)]
pub enum TierstackError {
    /// An I/O operation failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path where the I/O error occurred.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A configuration value is invalid.
    #[error("invalid configuration: {message}")]
    Config {
        /// Description of the invalid configuration.
        message: String,
    },

    /// A unit, output, or other named item was not found.
    #[error("{kind} not found: {id}")]
    NotFound {
        /// Type of the missing item.
        kind: &'static str,
        /// Identifier of the missing item.
        id: String,
    },

    /// The unit graph contains a cycle.
    #[error("cyclic dependency detected: {}", format_cycle(.cycle))]
    CyclicDependency {
        /// Unit names forming the cycle, each depending on the next.
        cycle: Vec<String>,
    },

    /// Two units share a name within one composition.
    #[error("duplicate unit name: \"{name}\"")]
    DuplicateUnit {
        /// The repeated unit name.
        name: String,
    },

    /// An input was declared twice on the same unit.
    #[error("unit \"{unit}\" already declares input \"{input}\"")]
    DuplicateInput {
        /// Unit that owns the input.
        unit: String,
        /// The repeated input name.
        input: String,
    },

    /// An output was declared twice on the same unit.
    #[error("unit \"{unit}\" already declares output \"{output}\"")]
    DuplicateOutput {
        /// Unit that owns the output.
        unit: String,
        /// The repeated output name.
        output: String,
    },

    /// A declared input had no resolved value at render time.
    #[error("unit \"{unit}\" is missing a value for input \"{input}\"")]
    MissingInput {
        /// Unit being rendered.
        unit: String,
        /// Input that lacks a value.
        input: String,
    },

    /// A resolved input value does not satisfy its declared shape.
    #[error("unit \"{unit}\" input \"{input}\" expects {expected}, got \"{value}\"")]
    InvalidInput {
        /// Unit being rendered.
        unit: String,
        /// Offending input.
        input: String,
        /// Human-readable description of the expected shape.
        expected: String,
        /// The rejected value.
        value: String,
    },

    /// A direct reference read an output the producer has not computed yet.
    #[error("output \"{output}\" of unit \"{unit}\" is not ready")]
    OutputNotReady {
        /// Producer unit.
        unit: String,
        /// Output that was requested.
        output: String,
    },

    /// An output evaluated to an empty string while empty values are rejected.
    #[error("output \"{output}\" of unit \"{unit}\" is empty")]
    EmptyOutput {
        /// Producer unit.
        unit: String,
        /// Output that evaluated to an empty string.
        output: String,
    },

    /// A parameter store key has never been written.
    #[error("parameter not found: {key}")]
    KeyNotFound {
        /// The missing key.
        key: String,
    },

    /// A deferred store read was still absent when its value was required.
    #[error("unresolved reference for input \"{input}\" of unit \"{unit}\": parameter {key} does not exist")]
    UnresolvedReference {
        /// Consumer unit.
        unit: String,
        /// Consumer input.
        input: String,
        /// Store key that was still absent.
        key: String,
    },

    /// A store key is not a valid hierarchical key.
    #[error("invalid parameter key \"{key}\": {reason}")]
    InvalidKey {
        /// The rejected key.
        key: String,
        /// Why it was rejected.
        reason: &'static str,
    },

    /// The provisioning API rejected a unit.
    #[error("provisioning of unit \"{unit}\" failed: {message}")]
    Provisioning {
        /// Unit that failed to provision.
        unit: String,
        /// Provider-level error message, kept opaque.
        message: String,
    },

    /// JSON serialization or deserialization failed.
    #[error("serialization error: {source}")]
    Serialization {
        /// Underlying serialization error.
        #[from]
        source: serde_json::Error,
    },

    /// YAML deserialization failed.
    #[error("YAML error: {source}")]
    Yaml {
        /// Underlying YAML error.
        #[from]
        source: serde_yaml::Error,
    },
}

impl TierstackError {
    /// Returns whether this error is detected during plan construction,
    /// before any resources are handed to the provisioning API.
    #[must_use]
    pub const fn is_structural(&self) -> bool {
        matches!(
            self,
            Self::Config { .. }
                | Self::CyclicDependency { .. }
                | Self::DuplicateUnit { .. }
                | Self::DuplicateInput { .. }
                | Self::DuplicateOutput { .. }
                | Self::InvalidKey { .. }
        )
    }
}

fn format_cycle(cycle: &[String]) -> String {
    match cycle.first() {
        Some(first) => format!("{} -> {first}", cycle.join(" -> ")),
        None => String::new(),
    }
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, TierstackError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cycle_message_closes_the_loop() {
        let err = TierstackError::CyclicDependency {
            cycle: vec!["a".into(), "b".into(), "c".into()],
        };
        assert_eq!(err.to_string(), "cyclic dependency detected: a -> b -> c -> a");
    }

    #[test]
    fn structural_errors_are_classified() {
        let cycle = TierstackError::CyclicDependency { cycle: vec![] };
        let missing = TierstackError::KeyNotFound { key: "/app/x/y".into() };
        assert!(cycle.is_structural());
        assert!(!missing.is_structural());
    }

    #[test]
    fn unresolved_reference_names_the_key() {
        let err = TierstackError::UnresolvedReference {
            unit: "gateway".into(),
            input: "serviceArn".into(),
            key: "/app/compute/serviceArn".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("/app/compute/serviceArn"), "got: {msg}");
        assert!(msg.contains("gateway"), "got: {msg}");
    }
}
