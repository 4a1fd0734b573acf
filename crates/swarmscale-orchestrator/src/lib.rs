//! swarmscale-orchestrator: talking to the orchestrator.
//!
//! The control loop only sees the `Orchestrator` trait. Two backends
//! implement it:
//!
//! ```text
//! Orchestrator (list_services, scale)
//!   ├── DockerCli  → `docker service ls --format json`
//!   │                `docker service scale --detach <name>=<n>`
//!   └── DockerApi  → GET  /services?status=true
//!                    GET  /services/{name}
//!                    POST /services/{name}/update?version=<index>
//!
//! ReplicaInspector  → current running count, degrading to a fallback
//! ScalingExecutor   → one scale call, failure reported, never retried
//! ```

pub mod client;
pub mod docker_api;
pub mod docker_cli;
pub mod executor;
pub mod inspector;

pub use client::{Orchestrator, find_service};
pub use docker_api::DockerApi;
pub use docker_cli::DockerCli;
pub use executor::ScalingExecutor;
pub use inspector::ReplicaInspector;
