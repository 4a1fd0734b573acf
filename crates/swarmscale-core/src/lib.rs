//! swarmscale-core: shared vocabulary for the swarmscale autoscaler.
//!
//! Holds the domain types every other crate speaks (samples, replica and
//! cooldown state, decisions), the error taxonomy, and the
//! `AutoscalerConfig` loader (TOML file + `SWARMSCALE_*` environment).

pub mod config;
pub mod error;
pub mod types;

pub use config::{AutoscalerConfig, OrchestratorBackend, ReplicaFallback};
pub use error::*;
pub use types::*;
