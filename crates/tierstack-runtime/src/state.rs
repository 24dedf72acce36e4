//! Per-unit lifecycle state machine.
//!
//! ```text
//! Declared -> InputsResolving -> InputsResolved -> Rendering -> Provisioned -> OutputsPublished
//!                  |                                   |             |
//!                  v                                   v             v
//!        InputResolutionFailed        InputResolutionFailed or ProvisioningFailed
//! ```

use tierstack_common::error::{Result, TierstackError};
use tierstack_common::types::UnitState;

/// Returns whether a unit may move from `from` to `to` within one run.
#[must_use]
pub const fn is_valid_transition(from: UnitState, to: UnitState) -> bool {
    use UnitState::{
        Declared, InputResolutionFailed, InputsResolved, InputsResolving, OutputsPublished,
        Provisioned, ProvisioningFailed, Rendering,
    };
    matches!(
        (from, to),
        (Declared, InputsResolving)
            | (InputsResolving, InputsResolved | InputResolutionFailed)
            | (InputsResolved, Rendering)
            | (Rendering, Provisioned | InputResolutionFailed | ProvisioningFailed)
            | (Provisioned, OutputsPublished | ProvisioningFailed)
    )
}

/// Tracks one unit through a deployment run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lifecycle {
    unit: String,
    state: UnitState,
    failed_during: Option<UnitState>,
}

impl Lifecycle {
    /// Starts tracking `unit` in `Declared`.
    #[must_use]
    pub fn new(unit: impl Into<String>) -> Self {
        Self {
            unit: unit.into(),
            state: UnitState::Declared,
            failed_during: None,
        }
    }

    /// Returns the unit name.
    #[must_use]
    pub fn unit(&self) -> &str {
        &self.unit
    }

    /// Returns the current state.
    #[must_use]
    pub const fn state(&self) -> UnitState {
        self.state
    }

    /// Returns the state the unit was in when it failed.
    #[must_use]
    pub const fn failed_during(&self) -> Option<UnitState> {
        self.failed_during
    }

    /// Moves to `to`, returning the previous state.
    ///
    /// # Errors
    ///
    /// Returns `Config` if the transition is not part of the lifecycle.
    pub fn advance(&mut self, to: UnitState) -> Result<UnitState> {
        let from = self.state;
        if !is_valid_transition(from, to) {
            return Err(TierstackError::Config {
                message: format!("unit \"{}\" cannot move from {from} to {to}", self.unit),
            });
        }
        if to.is_failure() {
            self.failed_during = Some(from);
        }
        self.state = to;
        Ok(from)
    }
}
