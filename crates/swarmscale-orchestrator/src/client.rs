//! The orchestrator capability the control loop depends on.

use async_trait::async_trait;

use swarmscale_core::{OrchestratorError, ServiceEntry};

/// Lists services and changes their replica count.
#[async_trait]
pub trait Orchestrator: Send + Sync {
    /// Every service the orchestrator knows, with running/desired counts.
    async fn list_services(&self) -> Result<Vec<ServiceEntry>, OrchestratorError>;

    /// Set `service` to exactly `replicas` replicas.
    async fn scale(&self, service: &str, replicas: u32) -> Result<(), OrchestratorError>;
}

/// Locate a service in a listing.
///
/// An entry named exactly `qualified_name` wins; otherwise the first entry
/// whose name contains `service_name` (case-sensitive) is returned.
pub fn find_service<'a>(
    entries: &'a [ServiceEntry],
    service_name: &str,
    qualified_name: &str,
) -> Option<&'a ServiceEntry> {
    entries
        .iter()
        .find(|e| e.name == qualified_name)
        .or_else(|| entries.iter().find(|e| e.name.contains(service_name)))
}
