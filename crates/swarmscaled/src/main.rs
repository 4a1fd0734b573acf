//! swarmscaled: the swarmscale daemon.
//!
//! Watches CPU and memory utilization of one Docker Swarm service in
//! Prometheus and scales it between its replica bounds.
//!
//! # Usage
//!
//! ```text
//! swarmscaled run --config /etc/swarmscale/swarmscale.toml
//! swarmscaled run --once --log-format json
//! swarmscaled config --config swarmscale.toml
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::EnvFilter;

use swarmscale_autoscale::ControlLoop;
use swarmscale_core::{AutoscalerConfig, OrchestratorBackend};
use swarmscale_metrics::PrometheusClient;
use swarmscale_orchestrator::{DockerApi, DockerCli, Orchestrator};

const DEFAULT_LOG_FILTER: &str = "info,swarmscaled=debug,swarmscale=debug";

#[derive(Parser)]
#[command(name = "swarmscaled", version, about = "Docker Swarm service autoscaler")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the control loop until SIGINT or SIGTERM.
    Run {
        /// TOML configuration file. Defaults and SWARMSCALE_* variables
        /// apply without one.
        #[arg(long, short)]
        config: Option<PathBuf>,

        /// Run a single cycle and exit.
        #[arg(long)]
        once: bool,

        /// Log output format.
        #[arg(long, value_enum, default_value_t = LogFormat::Text)]
        log_format: LogFormat,
    },
    /// Print the effective configuration as TOML.
    Config {
        #[arg(long, short)]
        config: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Run {
            config,
            once,
            log_format,
        } => {
            init_tracing(log_format);
            let config = AutoscalerConfig::load(config.as_deref())
                .context("failed to load configuration")?;
            run(config, once).await
        }
        Command::Config { config } => {
            let config = AutoscalerConfig::load(config.as_deref())
                .context("failed to load configuration")?;
            print!("{}", config.to_toml_string()?);
            Ok(())
        }
    }
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

async fn run(config: AutoscalerConfig, once: bool) -> anyhow::Result<()> {
    info!(
        service = %config.qualified_service_name(),
        min = config.service.min_replicas,
        max = config.service.max_replicas,
        "swarmscaled starting"
    );

    // ── Collaborators ──────────────────────────────────────────

    let metrics = PrometheusClient::new(&config.metrics.prometheus_url, config.metrics_timeout())
        .context("invalid prometheus url")?;
    info!(url = %metrics.base_url(), "prometheus client initialized");

    let orchestrator: Arc<dyn Orchestrator> = match config.orchestrator.backend {
        OrchestratorBackend::Cli => {
            info!(program = %config.orchestrator.docker_bin, "using docker cli");
            Arc::new(DockerCli::new(
                &config.orchestrator.docker_bin,
                config.orchestrator_timeout(),
            ))
        }
        OrchestratorBackend::Api => {
            info!(url = %config.orchestrator.api_url, "using docker engine api");
            Arc::new(
                DockerApi::new(&config.orchestrator.api_url, config.orchestrator_timeout())
                    .context("invalid docker api url")?,
            )
        }
    };

    let mut control = ControlLoop::from_config(&config, Arc::new(metrics), orchestrator)?;

    if once {
        let outcome = control.tick().await;
        info!(?outcome, "single cycle finished");
        return Ok(());
    }

    // ── Shutdown signal ────────────────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let loop_handle = tokio::spawn(async move {
        control.run(shutdown_rx).await;
    });

    wait_for_signal().await;
    info!("shutdown signal received, finishing current cycle");
    let _ = shutdown_tx.send(true);
    let _ = loop_handle.await;

    info!("swarmscaled stopped");
    Ok(())
}

/// Resolve on SIGINT, or SIGTERM where available.
async fn wait_for_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = sigterm.recv() => {}
            }
            return;
        }
    }
    let _ = tokio::signal::ctrl_c().await;
}
