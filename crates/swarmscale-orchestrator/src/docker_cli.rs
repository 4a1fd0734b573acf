//! Docker Swarm via the `docker` command-line tool.
//!
//! Listing:
//! `docker service ls --format json` prints one JSON object per line with
//! at least `Name` and `Replicas` (`"<running>/<desired>"`).
//!
//! Scaling:
//! `docker service scale --detach <name>=<n>`. `--detach` returns once the
//! update is accepted instead of waiting for tasks to converge, so the
//! command stays inside its timeout.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;
use tracing::debug;

use swarmscale_core::{OrchestratorError, ReplicaCount, ServiceEntry};

use crate::client::Orchestrator;

/// One line of `docker service ls --format json`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ListingLine {
    name: String,
    replicas: String,
}

/// Parse newline-delimited listing output. Any malformed line fails the
/// whole listing.
pub fn parse_service_listing(stdout: &str) -> Result<Vec<ServiceEntry>, OrchestratorError> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| -> Result<ServiceEntry, OrchestratorError> {
            let parsed: ListingLine = serde_json::from_str(line)
                .map_err(|e| OrchestratorError::Malformed(format!("{e}: {line}")))?;
            Ok(ServiceEntry {
                replicas: parsed.replicas.parse::<ReplicaCount>()?,
                name: parsed.name,
            })
        })
        .collect()
}

/// `Orchestrator` backed by a local `docker` executable.
#[derive(Debug, Clone)]
pub struct DockerCli {
    program: PathBuf,
    timeout: Duration,
}

impl DockerCli {
    pub fn new(program: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }

    /// Run the program with `args` and return stdout on exit status 0.
    async fn run(&self, args: &[&str]) -> Result<String, OrchestratorError> {
        let mut cmd = Command::new(&self.program);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!(program = %self.program.display(), ?args, "running orchestrator command");

        let output = match tokio::time::timeout(self.timeout, cmd.output()).await {
            Ok(result) => result.map_err(|source| OrchestratorError::Spawn {
                program: self.program.display().to_string(),
                source,
            })?,
            Err(_) => return Err(OrchestratorError::Timeout(self.timeout)),
        };

        if !output.status.success() {
            return Err(OrchestratorError::CommandFailed {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl Orchestrator for DockerCli {
    async fn list_services(&self) -> Result<Vec<ServiceEntry>, OrchestratorError> {
        let stdout = self.run(&["service", "ls", "--format", "json"]).await?;
        parse_service_listing(&stdout)
    }

    async fn scale(&self, service: &str, replicas: u32) -> Result<(), OrchestratorError> {
        let spec = format!("{service}={replicas}");
        self.run(&["service", "scale", "--detach", &spec]).await?;
        Ok(())
    }
}
