//! Degrading metrics client used by the control loop.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use swarmscale_core::{AutoscaleError, MetricError, Observation, UtilizationSample};

/// A backend that answers a query expression with a scalar.
#[async_trait]
pub trait MetricSource: Send + Sync {
    async fn try_query(&self, expression: &str) -> Result<f64, MetricError>;
}

/// Fetches CPU and memory utilization for one service.
///
/// Failures never propagate: an unavailable metric reads as `0.0` and
/// the `MetricUnavailable` condition is returned alongside it.
pub struct MetricsClient {
    source: Arc<dyn MetricSource>,
    cpu_query: String,
    memory_query: String,
}

impl MetricsClient {
    pub fn new(
        source: Arc<dyn MetricSource>,
        cpu_query: impl Into<String>,
        memory_query: impl Into<String>,
    ) -> Self {
        Self {
            source,
            cpu_query: cpu_query.into(),
            memory_query: memory_query.into(),
        }
    }

    pub fn cpu_query(&self) -> &str {
        &self.cpu_query
    }

    pub fn memory_query(&self) -> &str {
        &self.memory_query
    }

    /// Run one expression, substituting `0.0` on failure.
    pub async fn query(&self, expression: &str) -> Observation<f64> {
        match self.source.try_query(expression).await {
            Ok(value) => Observation::ok(value),
            Err(source) => {
                debug!(query = %expression, error = %source, "metric unavailable");
                Observation::degraded(
                    0.0,
                    AutoscaleError::MetricUnavailable {
                        query: expression.to_string(),
                        source,
                    },
                )
            }
        }
    }

    /// Fetch CPU and memory concurrently.
    ///
    /// Returns the sample together with any faults hit on the way.
    pub async fn sample(&self) -> (UtilizationSample, Vec<AutoscaleError>) {
        let (cpu, memory) = tokio::join!(
            self.query(&self.cpu_query),
            self.query(&self.memory_query)
        );

        let sample = UtilizationSample::new(
            cpu.value,
            memory.value,
            tokio::time::Instant::now().into_std(),
        );
        let faults = [cpu.fault, memory.fault].into_iter().flatten().collect();
        (sample, faults)
    }
}
