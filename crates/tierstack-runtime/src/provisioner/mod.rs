//! Provisioning API abstraction.
//!
//! The cloud control plane is an external collaborator: it accepts the
//! rendered declarations of one unit and returns the concrete identifiers
//! of the resources it created, or fails opaquely.

pub mod simulated;

use tierstack_common::error::Result;
use tierstack_compose::declaration::ProvisionedResources;
use tierstack_compose::unit::RenderedUnit;

pub use simulated::SimulatedProvisioner;

/// Declarative resource-provisioning API.
///
/// Implementors must be idempotent per unit: submitting the same rendered
/// unit again updates the resources in place and reports the same
/// identifiers.
pub trait Provisioner: Send + Sync {
    /// Short name of the backend, used in logs and reports.
    fn name(&self) -> &str;

    /// Creates or updates every resource of a rendered unit.
    ///
    /// # Errors
    ///
    /// Returns `Provisioning` if the provider rejects the unit.
    fn provision(&self, rendered: &RenderedUnit) -> Result<ProvisionedResources>;
}
