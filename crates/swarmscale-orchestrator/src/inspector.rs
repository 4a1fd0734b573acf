//! Replica inspector: how many replicas the service is running now.

use std::sync::Arc;

use tracing::debug;

use swarmscale_core::{AutoscaleError, Observation, OrchestratorError, ReplicaFallback};

use crate::client::{Orchestrator, find_service};

/// Reads the running replica count of one service.
///
/// Never fails: when the listing cannot be used, a fallback count is
/// returned together with `ReplicaInspectionFailed`.
pub struct ReplicaInspector {
    orchestrator: Arc<dyn Orchestrator>,
    service_name: String,
    qualified_name: String,
    fallback_replicas: u32,
    mode: ReplicaFallback,
    last_known: Option<u32>,
}

impl ReplicaInspector {
    /// Inspector falling back to a fixed count of 1.
    pub fn new(
        orchestrator: Arc<dyn Orchestrator>,
        service_name: impl Into<String>,
        qualified_name: impl Into<String>,
    ) -> Self {
        Self {
            orchestrator,
            service_name: service_name.into(),
            qualified_name: qualified_name.into(),
            fallback_replicas: 1,
            mode: ReplicaFallback::Fixed,
            last_known: None,
        }
    }

    pub fn with_fallback(mut self, fallback_replicas: u32, mode: ReplicaFallback) -> Self {
        self.fallback_replicas = fallback_replicas;
        self.mode = mode;
        self
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    /// Running replicas, or the fallback with the reason it was used.
    pub async fn current_replicas(&mut self) -> Observation<u32> {
        match self.try_current_replicas().await {
            Ok(running) => {
                self.last_known = Some(running);
                Observation::ok(running)
            }
            Err(source) => {
                let fallback = self.fallback_value();
                debug!(
                    service = %self.service_name,
                    fallback,
                    error = %source,
                    "replica inspection failed"
                );
                Observation::degraded(
                    fallback,
                    AutoscaleError::ReplicaInspectionFailed {
                        service: self.service_name.clone(),
                        source,
                    },
                )
            }
        }
    }

    /// Running replicas straight from the orchestrator.
    pub async fn try_current_replicas(&self) -> Result<u32, OrchestratorError> {
        let services = self.orchestrator.list_services().await?;
        find_service(&services, &self.service_name, &self.qualified_name)
            .map(|entry| entry.replicas.running)
            .ok_or_else(|| OrchestratorError::ServiceNotFound(self.service_name.clone()))
    }

    fn fallback_value(&self) -> u32 {
        match (self.mode, self.last_known) {
            (ReplicaFallback::LastKnown, Some(count)) => count,
            _ => self.fallback_replicas,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use swarmscale_core::{ReplicaCount, ServiceEntry};

    /// Serves queued listing results, one per call.
    struct ScriptedListing(Mutex<Vec<Result<Vec<ServiceEntry>, OrchestratorError>>>);

    impl ScriptedListing {
        fn new(mut results: Vec<Result<Vec<ServiceEntry>, OrchestratorError>>) -> Arc<Self> {
            results.reverse();
            Arc::new(Self(Mutex::new(results)))
        }
    }

    #[async_trait]
    impl Orchestrator for ScriptedListing {
        async fn list_services(&self) -> Result<Vec<ServiceEntry>, OrchestratorError> {
            self.0
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(|| Err(OrchestratorError::Transport("exhausted".into())))
        }

        async fn scale(&self, _service: &str, _replicas: u32) -> Result<(), OrchestratorError> {
            Ok(())
        }
    }

    fn listing(name: &str, running: u32, desired: u32) -> Vec<ServiceEntry> {
        vec![ServiceEntry {
            name: name.to_string(),
            replicas: ReplicaCount { running, desired },
        }]
    }

    #[tokio::test]
    async fn reports_running_count() {
        let orch = ScriptedListing::new(vec![Ok(listing("docker_service-a", 2, 3))]);
        let mut inspector = ReplicaInspector::new(orch, "service-a", "docker_service-a");

        let obs = inspector.current_replicas().await;
        assert_eq!(obs.value, 2);
        assert!(!obs.is_degraded());
    }

    #[tokio::test]
    async fn missing_service_falls_back_to_one() {
        let orch = ScriptedListing::new(vec![Ok(listing("docker_other", 4, 4))]);
        let mut inspector = ReplicaInspector::new(orch, "service-a", "docker_service-a");

        let obs = inspector.current_replicas().await;
        assert_eq!(obs.value, 1);
        assert!(matches!(
            obs.fault,
            Some(AutoscaleError::ReplicaInspectionFailed {
                source: OrchestratorError::ServiceNotFound(_),
                ..
            })
        ));
    }

    #[tokio::test]
    async fn listing_failure_uses_configured_fallback() {
        let orch = ScriptedListing::new(vec![Err(OrchestratorError::CommandFailed {
            status: "exit status: 1".into(),
            stderr: "Cannot connect to the Docker daemon".into(),
        })]);
        let mut inspector = ReplicaInspector::new(orch, "service-a", "docker_service-a")
            .with_fallback(2, ReplicaFallback::Fixed);

        let obs = inspector.current_replicas().await;
        assert_eq!(obs.value, 2);
        assert!(obs.is_degraded());
    }

    #[tokio::test]
    async fn fixed_mode_ignores_last_known() {
        let orch = ScriptedListing::new(vec![
            Ok(listing("docker_service-a", 4, 4)),
            Err(OrchestratorError::Transport("down".into())),
        ]);
        let mut inspector = ReplicaInspector::new(orch, "service-a", "docker_service-a");

        assert_eq!(inspector.current_replicas().await.value, 4);
        assert_eq!(inspector.current_replicas().await.value, 1);
    }

    #[tokio::test]
    async fn last_known_mode_reuses_previous_count() {
        let orch = ScriptedListing::new(vec![
            Err(OrchestratorError::Transport("down".into())),
            Ok(listing("docker_service-a", 4, 4)),
            Err(OrchestratorError::Transport("down".into())),
        ]);
        let mut inspector = ReplicaInspector::new(orch, "service-a", "docker_service-a")
            .with_fallback(1, ReplicaFallback::LastKnown);

        // Nothing known yet.
        assert_eq!(inspector.current_replicas().await.value, 1);
        assert_eq!(inspector.current_replicas().await.value, 4);

        let obs = inspector.current_replicas().await;
        assert_eq!(obs.value, 4);
        assert!(obs.is_degraded());
    }
}
