//! swarmscale-metrics: utilization signals for the control loop.
//!
//! # Architecture
//!
//! ```text
//! MetricsClient
//!   ├── query(expr)  → Observation<f64>   (0.0 + MetricUnavailable on failure)
//!   ├── sample()     → UtilizationSample  (cpu + memory fetched concurrently)
//!   └── Arc<dyn MetricSource>
//!         └── PrometheusClient → GET {backend}/api/v1/query?query=<expr>
//! ```
//!
//! A metric that cannot be read never fails a cycle: it reads as zero and
//! the fault is handed back to the caller for logging.

pub mod client;
pub mod prometheus;

pub use client::{MetricSource, MetricsClient};
pub use prometheus::PrometheusClient;
