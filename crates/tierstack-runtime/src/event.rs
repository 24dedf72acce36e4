//! Deployment lifecycle events.
//!
//! A [`crate::deployer::Deployer`] reports every unit state change and
//! every published output to an optional listener, in the order they
//! happen.

use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use tierstack_common::types::{StoreKey, UnitState};

/// A deployment lifecycle event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", tag = "event")]
pub enum DeployEvent {
    /// A unit changed state.
    StateChange {
        /// Unit that changed.
        unit: String,
        /// Previous state.
        from: UnitState,
        /// New state.
        to: UnitState,
    },
    /// A unit output was captured, and written to the store if `key` is set.
    OutputPublished {
        /// Producer unit.
        unit: String,
        /// Output name.
        output: String,
        /// Store key written.
        key: Option<StoreKey>,
    },
}

/// Callback receiving deployment events.
pub type EventListener = Box<dyn Fn(&DeployEvent) + Send + Sync>;

/// Listener that keeps every event it receives.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Arc<Mutex<Vec<DeployEvent>>>,
}

impl EventLog {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a listener appending to this log.
    #[must_use]
    pub fn listener(&self) -> EventListener {
        let events = Arc::clone(&self.events);
        Box::new(move |event| {
            events
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(event.clone());
        })
    }

    /// Returns a copy of the recorded events.
    #[must_use]
    pub fn events(&self) -> Vec<DeployEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Returns the successive states of `unit`, starting with its first
    /// recorded `from` state.
    #[must_use]
    pub fn states_of(&self, unit: &str) -> Vec<UnitState> {
        let mut states = Vec::new();
        for event in self.events() {
            if let DeployEvent::StateChange {
                unit: changed,
                from,
                to,
            } = event
            {
                if changed != unit {
                    continue;
                }
                if states.is_empty() {
                    states.push(from);
                }
                states.push(to);
            }
        }
        states
    }
}
