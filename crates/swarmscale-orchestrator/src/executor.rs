//! Scaling executor: applies one scale decision.

use std::sync::Arc;

use tracing::info;

use swarmscale_core::{AutoscaleError, AutoscaleResult};

use crate::client::Orchestrator;

/// Issues scale commands for one service.
///
/// There is no retry: a failed scale is reported and the next control
/// loop cycle decides again.
pub struct ScalingExecutor {
    orchestrator: Arc<dyn Orchestrator>,
    qualified_name: String,
}

impl ScalingExecutor {
    pub fn new(orchestrator: Arc<dyn Orchestrator>, qualified_name: impl Into<String>) -> Self {
        Self {
            orchestrator,
            qualified_name: qualified_name.into(),
        }
    }

    pub fn qualified_name(&self) -> &str {
        &self.qualified_name
    }

    /// Scale the service to exactly `target` replicas.
    pub async fn apply(&self, target: u32) -> AutoscaleResult<()> {
        self.orchestrator
            .scale(&self.qualified_name, target)
            .await
            .map_err(|source| AutoscaleError::ScaleCommandFailed {
                service: self.qualified_name.clone(),
                target,
                source,
            })?;

        info!(service = %self.qualified_name, target, "scaled service");
        Ok(())
    }
}
