//! swarmscale.toml configuration.
//!
//! Precedence: built-in defaults, then the optional TOML file, then
//! `SWARMSCALE_*` environment variables. The result is validated before
//! anything is built from it.

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ConfigError;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AutoscalerConfig {
    /// Seconds between control-loop cycles.
    pub poll_interval_secs: u64,
    pub service: ServiceConfig,
    pub thresholds: ThresholdConfig,
    pub cooldown: CooldownConfig,
    pub metrics: MetricsConfig,
    pub orchestrator: OrchestratorConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServiceConfig {
    pub name: String,
    /// Stack the service was deployed in; scale commands address
    /// `{stack}_{name}`.
    pub stack: Option<String>,
    pub min_replicas: u32,
    pub max_replicas: u32,
    /// Count assumed when the replica listing fails. Defaults to
    /// `min_replicas`; must lie within `[min_replicas, max_replicas]`.
    pub fallback_replicas: Option<u32>,
    pub replica_fallback: ReplicaFallback,
}

/// What the replica inspector reports when the listing fails.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ReplicaFallback {
    /// Always `fallback_replicas`.
    #[default]
    Fixed,
    /// The last successfully observed count, else `fallback_replicas`.
    LastKnown,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ThresholdConfig {
    pub cpu_percent: f64,
    pub memory_percent: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CooldownConfig {
    pub scale_up_secs: u64,
    pub scale_down_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MetricsConfig {
    pub prometheus_url: String,
    pub cpu_query: Option<String>,
    pub memory_query: Option<String>,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OrchestratorConfig {
    pub backend: OrchestratorBackend,
    /// `docker` executable used by the CLI backend.
    pub docker_bin: String,
    /// Docker Engine endpoint used by the API backend.
    pub api_url: String,
    /// Upper bound for a single listing or scale call.
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum OrchestratorBackend {
    #[default]
    Cli,
    Api,
}

impl FromStr for OrchestratorBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cli" => Ok(Self::Cli),
            "api" => Ok(Self::Api),
            other => Err(format!("unknown orchestrator backend: {other}")),
        }
    }
}

impl FromStr for ReplicaFallback {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fixed" => Ok(Self::Fixed),
            "last_known" | "last-known" => Ok(Self::LastKnown),
            other => Err(format!("unknown replica fallback: {other}")),
        }
    }
}

impl Default for AutoscalerConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 30,
            service: ServiceConfig::default(),
            thresholds: ThresholdConfig::default(),
            cooldown: CooldownConfig::default(),
            metrics: MetricsConfig::default(),
            orchestrator: OrchestratorConfig::default(),
        }
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: "service-a".to_string(),
            stack: Some("docker".to_string()),
            min_replicas: 1,
            max_replicas: 5,
            fallback_replicas: None,
            replica_fallback: ReplicaFallback::Fixed,
        }
    }
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            cpu_percent: 70.0,
            memory_percent: 80.0,
        }
    }
}

impl Default for CooldownConfig {
    fn default() -> Self {
        Self {
            scale_up_secs: 60,
            scale_down_secs: 300,
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            prometheus_url: "http://localhost:9090".to_string(),
            cpu_query: None,
            memory_query: None,
            timeout_secs: 10,
        }
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            backend: OrchestratorBackend::Cli,
            docker_bin: "docker".to_string(),
            api_url: "http://localhost:2375".to_string(),
            timeout_secs: 30,
        }
    }
}

impl AutoscalerConfig {
    /// Load the effective configuration: defaults, optional file, process
    /// environment, validation.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None => Self::default(),
        };
        config.apply_env(|var| std::env::var(var).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        debug!(path = %path.display(), "config file read");
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Override fields from `SWARMSCALE_*` variables resolved by `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(name) = lookup("SWARMSCALE_SERVICE_NAME") {
            self.service.name = name;
        }
        if let Some(stack) = lookup("SWARMSCALE_STACK") {
            let stack = stack.trim().to_string();
            self.service.stack = (!stack.is_empty()).then_some(stack);
        }
        env_parse(&lookup, "SWARMSCALE_MIN_REPLICAS", &mut self.service.min_replicas)?;
        env_parse(&lookup, "SWARMSCALE_MAX_REPLICAS", &mut self.service.max_replicas)?;
        if lookup("SWARMSCALE_FALLBACK_REPLICAS").is_some() {
            let mut count = self.fallback_replicas();
            env_parse(&lookup, "SWARMSCALE_FALLBACK_REPLICAS", &mut count)?;
            self.service.fallback_replicas = Some(count);
        }
        env_parse(&lookup, "SWARMSCALE_REPLICA_FALLBACK", &mut self.service.replica_fallback)?;
        env_parse(&lookup, "SWARMSCALE_CPU_THRESHOLD", &mut self.thresholds.cpu_percent)?;
        env_parse(&lookup, "SWARMSCALE_MEMORY_THRESHOLD", &mut self.thresholds.memory_percent)?;
        env_parse(&lookup, "SWARMSCALE_SCALE_UP_COOLDOWN_SECS", &mut self.cooldown.scale_up_secs)?;
        env_parse(
            &lookup,
            "SWARMSCALE_SCALE_DOWN_COOLDOWN_SECS",
            &mut self.cooldown.scale_down_secs,
        )?;
        env_parse(&lookup, "SWARMSCALE_POLL_INTERVAL_SECS", &mut self.poll_interval_secs)?;
        if let Some(url) = lookup("SWARMSCALE_PROMETHEUS_URL") {
            self.metrics.prometheus_url = url;
        }
        env_parse(&lookup, "SWARMSCALE_ORCHESTRATOR", &mut self.orchestrator.backend)?;
        if let Some(bin) = lookup("SWARMSCALE_DOCKER_BIN") {
            self.orchestrator.docker_bin = bin;
        }
        if let Some(url) = lookup("SWARMSCALE_DOCKER_API_URL") {
            self.orchestrator.api_url = url;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));

        if self.service.name.trim().is_empty() {
            return invalid("service.name must not be empty".to_string());
        }
        if self.service.min_replicas < 1 {
            return invalid("service.min_replicas must be at least 1".to_string());
        }
        if self.service.max_replicas < self.service.min_replicas {
            return invalid(format!(
                "service.max_replicas ({}) must be >= service.min_replicas ({})",
                self.service.max_replicas, self.service.min_replicas
            ));
        }
        if let Some(fallback) = self.service.fallback_replicas
            && !(self.service.min_replicas..=self.service.max_replicas).contains(&fallback)
        {
            return invalid(format!(
                "service.fallback_replicas ({fallback}) must be within [{}, {}]",
                self.service.min_replicas, self.service.max_replicas
            ));
        }
        for (name, value) in [
            ("thresholds.cpu_percent", self.thresholds.cpu_percent),
            ("thresholds.memory_percent", self.thresholds.memory_percent),
        ] {
            if !(0.0..=100.0).contains(&value) {
                return invalid(format!("{name} must be within 0-100, got {value}"));
            }
        }
        if self.poll_interval_secs == 0 {
            return invalid("poll_interval_secs must be greater than 0".to_string());
        }
        if self.metrics.timeout_secs == 0 || self.orchestrator.timeout_secs == 0 {
            return invalid("timeouts must be greater than 0".to_string());
        }
        Ok(())
    }

    /// Replica count assumed when the listing fails.
    pub fn fallback_replicas(&self) -> u32 {
        self.service.fallback_replicas.unwrap_or(self.service.min_replicas)
    }

    /// Name the orchestrator knows the service by: `{stack}_{name}`.
    pub fn qualified_service_name(&self) -> String {
        match &self.service.stack {
            Some(stack) => format!("{stack}_{}", self.service.name),
            None => self.service.name.clone(),
        }
    }

    /// CPU utilization expression, defaulting to container CPU rate.
    pub fn cpu_query(&self) -> String {
        self.metrics.cpu_query.clone().unwrap_or_else(|| {
            format!(
                "rate(container_cpu_usage_seconds_total{{name=~\".*{svc}.*\"}}[5m]) * 100",
                svc = self.service.name
            )
        })
    }

    /// Memory utilization expression, defaulting to usage over limit.
    pub fn memory_query(&self) -> String {
        self.metrics.memory_query.clone().unwrap_or_else(|| {
            format!(
                "container_memory_usage_bytes{{name=~\".*{svc}.*\"}} / \
                 container_spec_memory_limit_bytes{{name=~\".*{svc}.*\"}} * 100",
                svc = self.service.name
            )
        })
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn scale_up_cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown.scale_up_secs)
    }

    pub fn scale_down_cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown.scale_down_secs)
    }

    pub fn metrics_timeout(&self) -> Duration {
        Duration::from_secs(self.metrics.timeout_secs)
    }

    pub fn orchestrator_timeout(&self) -> Duration {
        Duration::from_secs(self.orchestrator.timeout_secs)
    }
}

fn env_parse<F, T>(lookup: &F, var: &str, slot: &mut T) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    if let Some(raw) = lookup(var) {
        *slot = raw.trim().parse().map_err(|_| ConfigError::InvalidEnv {
            var: var.to_string(),
            value: raw.clone(),
        })?;
    }
    Ok(())
}
