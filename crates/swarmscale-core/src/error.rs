//! Error types for the swarmscale autoscaler.
//!
//! `MetricError` and `OrchestratorError` describe what went wrong while
//! talking to a collaborator. `AutoscaleError` is the taxonomy the control
//! loop reasons about; every variant is recovered locally and only ever
//! surfaces in logs.

use std::time::Duration;

use thiserror::Error;

/// Result type alias for control-loop operations.
pub type AutoscaleResult<T> = Result<T, AutoscaleError>;

/// Failures while querying the monitoring backend.
#[derive(Debug, Error)]
pub enum MetricError {
    #[error("invalid backend url: {0}")]
    InvalidUrl(String),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("backend returned http status {0}")]
    HttpStatus(u16),

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("query failed: {0}")]
    QueryFailed(String),

    #[error("query returned no series")]
    EmptyResult,

    #[error("sample value is not a usable percentage: {0}")]
    InvalidValue(String),
}

/// Failures while listing or scaling services on the orchestrator.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("failed to spawn `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("command timed out after {0:?}")]
    Timeout(Duration),

    #[error("command exited with {status}: {stderr}")]
    CommandFailed { status: String, stderr: String },

    #[error("invalid api url: {0}")]
    InvalidUrl(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("api returned http status {status}: {message}")]
    HttpStatus { status: u16, message: String },

    #[error("malformed listing: {0}")]
    Malformed(String),

    #[error("invalid replica count `{0}`")]
    InvalidReplicas(String),

    #[error("service not found: {0}")]
    ServiceNotFound(String),
}

/// The control loop's error taxonomy.
#[derive(Debug, Error)]
pub enum AutoscaleError {
    /// Backend unreachable, timed out, or returned a malformed payload.
    /// Recovered as utilization 0.
    #[error("metric unavailable for `{query}`: {source}")]
    MetricUnavailable {
        query: String,
        #[source]
        source: MetricError,
    },

    /// Listing failed or the service is absent. Recovered with the
    /// fallback replica count.
    #[error("replica inspection failed for {service}: {source}")]
    ReplicaInspectionFailed {
        service: String,
        #[source]
        source: OrchestratorError,
    },

    /// The scale invocation failed. No state is mutated.
    #[error("scaling {service} to {target} replicas failed: {source}")]
    ScaleCommandFailed {
        service: String,
        target: u32,
        #[source]
        source: OrchestratorError,
    },

    /// A cycle ended abnormally (e.g. a collaborator panicked).
    #[error("cycle aborted: {0}")]
    CycleAborted(String),
}

/// Configuration loading and validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to render config: {0}")]
    Render(#[from] toml::ser::Error),

    #[error("invalid value for {var}: `{value}`")]
    InvalidEnv { var: String, value: String },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}
