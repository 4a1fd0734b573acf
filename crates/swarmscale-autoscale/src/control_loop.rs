//! Control loop: observe, decide, execute, sleep.
//!
//! One `ControlLoop` manages exactly one service. Cycles never overlap,
//! and the shutdown signal is only checked between cycles, so a cycle
//! always runs to completion. Every failure inside a cycle is logged and
//! absorbed at the cycle boundary.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::FutureExt;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use swarmscale_core::{
    AutoscaleError, AutoscaleResult, AutoscalerConfig, ConfigError, CooldownState, ReplicaState,
    ScalingDecision, UtilizationSample,
};
use swarmscale_metrics::{MetricSource, MetricsClient};
use swarmscale_orchestrator::{Orchestrator, ReplicaInspector, ScalingExecutor};

use crate::policy::ScalingPolicy;

/// Default time between cycles.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);

/// Where the loop currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopPhase {
    Idle,
    Observing,
    Deciding,
    Executing,
    /// Terminal; reached only through the shutdown signal.
    Stopped,
}

/// How a cycle ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Nothing to do.
    Idle,
    /// Scaled to the given count.
    Scaled(u32),
    /// Scale command failed or the cycle aborted.
    Failed,
}

/// What one cycle observed and did.
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub sample: UtilizationSample,
    pub current: u32,
    pub decision: ScalingDecision,
    pub outcome: CycleOutcome,
}

pub struct ControlLoop {
    metrics: MetricsClient,
    inspector: ReplicaInspector,
    executor: ScalingExecutor,
    policy: ScalingPolicy,
    replicas: ReplicaState,
    cooldown: CooldownState,
    poll_interval: Duration,
    phase: LoopPhase,
    cycles: u64,
}

impl ControlLoop {
    pub fn new(
        metrics: MetricsClient,
        inspector: ReplicaInspector,
        executor: ScalingExecutor,
        policy: ScalingPolicy,
        replicas: ReplicaState,
        cooldown: CooldownState,
    ) -> Self {
        Self {
            metrics,
            inspector,
            executor,
            policy,
            replicas,
            cooldown,
            poll_interval: DEFAULT_POLL_INTERVAL,
            phase: LoopPhase::Idle,
            cycles: 0,
        }
    }

    /// Wire a loop from configuration and the two backends.
    pub fn from_config(
        config: &AutoscalerConfig,
        metric_source: Arc<dyn MetricSource>,
        orchestrator: Arc<dyn Orchestrator>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let qualified = config.qualified_service_name();
        let metrics = MetricsClient::new(metric_source, config.cpu_query(), config.memory_query());
        let inspector =
            ReplicaInspector::new(orchestrator.clone(), config.service.name.clone(), &*qualified)
                .with_fallback(config.fallback_replicas(), config.service.replica_fallback);
        let executor = ScalingExecutor::new(orchestrator, qualified);
        let replicas = ReplicaState::new(
            config.service.name.clone(),
            config.service.min_replicas,
            config.service.min_replicas,
            config.service.max_replicas,
        )?;
        let cooldown = CooldownState::new(config.scale_up_cooldown(), config.scale_down_cooldown());

        Ok(Self::new(
            metrics,
            inspector,
            executor,
            ScalingPolicy::from_config(config),
            replicas,
            cooldown,
        )
        .with_poll_interval(config.poll_interval()))
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn phase(&self) -> LoopPhase {
        self.phase
    }

    pub fn replicas(&self) -> &ReplicaState {
        &self.replicas
    }

    pub fn cooldown(&self) -> &CooldownState {
        &self.cooldown
    }

    /// Cycles completed so far, successful or not.
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// Run one observe → decide → execute pass.
    ///
    /// Observation never fails (metrics degrade to 0, replica count to its
    /// fallback). The only error is `ScaleCommandFailed`, in which case
    /// neither cooldown nor replica state is touched.
    pub async fn run_cycle(&mut self) -> AutoscaleResult<CycleReport> {
        let service = self.replicas.service_name.clone();

        self.set_phase(LoopPhase::Observing);
        let ((sample, metric_faults), observed) =
            tokio::join!(self.metrics.sample(), self.inspector.current_replicas());

        for fault in &metric_faults {
            warn!(%service, error = %fault, "metric unavailable, treating as 0");
        }
        if let Some(fault) = &observed.fault {
            warn!(%service, fallback = observed.value, error = %fault, "using fallback replica count");
        }
        self.replicas.current = observed.value;
        if !self.replicas.within_bounds() {
            warn!(
                %service,
                replicas = self.replicas.current,
                min = self.replicas.min,
                max = self.replicas.max,
                "replica count outside configured bounds"
            );
        }

        info!(
            %service,
            cpu = format_args!("{:.1}%", sample.cpu_percent),
            memory = format_args!("{:.1}%", sample.memory_percent),
            replicas = self.replicas.current,
            "observed"
        );

        self.set_phase(LoopPhase::Deciding);
        let now = now();
        let decision = self
            .policy
            .decide(&sample, &self.replicas, &self.cooldown, now);

        let mut report = CycleReport {
            sample,
            current: self.replicas.current,
            decision,
            outcome: CycleOutcome::Idle,
        };

        let Some(target) = decision.target() else {
            self.set_phase(LoopPhase::Idle);
            return Ok(report);
        };

        self.set_phase(LoopPhase::Executing);
        info!(%service, from = self.replicas.current, to = target, "{decision}");
        let applied = self.executor.apply(target).await;
        self.set_phase(LoopPhase::Idle);
        applied?;

        self.cooldown.record_scale(now);
        self.replicas.current = target;
        debug_assert!(self.replicas.within_bounds());
        report.outcome = CycleOutcome::Scaled(target);
        Ok(report)
    }

    /// Run one cycle and absorb whatever goes wrong in it, including a
    /// panic in a collaborator.
    pub async fn tick(&mut self) -> CycleOutcome {
        let result = AssertUnwindSafe(self.run_cycle()).catch_unwind().await;
        self.cycles += 1;
        self.phase = LoopPhase::Idle;

        match result {
            Ok(Ok(report)) => report.outcome,
            Ok(Err(e)) => {
                error!(service = %self.replicas.service_name, error = %e, "control loop cycle failed");
                CycleOutcome::Failed
            }
            Err(panic) => {
                let e = AutoscaleError::CycleAborted(panic_message(panic.as_ref()));
                error!(service = %self.replicas.service_name, error = %e, "control loop cycle panicked");
                CycleOutcome::Failed
            }
        }
    }

    /// Run cycles every `poll_interval` until `shutdown` turns true or its
    /// sender goes away.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) {
        info!(
            service = %self.replicas.service_name,
            interval_secs = self.poll_interval.as_secs(),
            min = self.replicas.min,
            max = self.replicas.max,
            "control loop started"
        );

        loop {
            if *shutdown.borrow_and_update() {
                break;
            }

            self.tick().await;

            // Wake early only for an actual stop request or a dropped sender.
            tokio::select! {
                _ = tokio::time::sleep(self.poll_interval) => {}
                _ = shutdown.wait_for(|stop| *stop) => break,
            }
        }

        self.phase = LoopPhase::Stopped;
        info!(service = %self.replicas.service_name, cycles = self.cycles, "control loop stopped");
    }

    fn set_phase(&mut self, phase: LoopPhase) {
        debug!(from = ?self.phase, to = ?phase, "phase");
        self.phase = phase;
    }
}

/// Current time on tokio's clock, so paused-time tests control it.
fn now() -> Instant {
    tokio::time::Instant::now().into_std()
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
