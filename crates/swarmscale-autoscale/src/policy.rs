//! Scaling policy: thresholds with hysteresis.
//!
//! `decide` is a pure function of the sample, the replica bounds, the
//! cooldown state and the current time. Recording a scale in the cooldown
//! state is the caller's job, and only after the scale succeeded.

use std::time::Instant;

use tracing::debug;

use swarmscale_core::{
    AutoscalerConfig, CooldownState, ReplicaState, ScaleDirection, ScalingDecision,
    UtilizationSample,
};

/// Scale down only once both metrics are below this fraction of their
/// thresholds.
pub const SCALE_DOWN_FACTOR: f64 = 0.5;

/// CPU and memory thresholds, in percent.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScalingPolicy {
    cpu_threshold: f64,
    memory_threshold: f64,
}

impl ScalingPolicy {
    pub fn new(cpu_threshold: f64, memory_threshold: f64) -> Self {
        Self {
            cpu_threshold,
            memory_threshold,
        }
    }

    pub fn from_config(config: &AutoscalerConfig) -> Self {
        Self::new(
            config.thresholds.cpu_percent,
            config.thresholds.memory_percent,
        )
    }

    pub fn cpu_threshold(&self) -> f64 {
        self.cpu_threshold
    }

    pub fn memory_threshold(&self) -> f64 {
        self.memory_threshold
    }

    /// Either metric is over its threshold.
    pub fn is_overloaded(&self, sample: &UtilizationSample) -> bool {
        sample.cpu_percent > self.cpu_threshold || sample.memory_percent > self.memory_threshold
    }

    /// Both metrics are under half their thresholds.
    pub fn is_underloaded(&self, sample: &UtilizationSample) -> bool {
        sample.cpu_percent < self.cpu_threshold * SCALE_DOWN_FACTOR
            && sample.memory_percent < self.memory_threshold * SCALE_DOWN_FACTOR
    }

    /// Direction the sample calls for, ignoring cooldowns.
    ///
    /// `None` inside the dead band or when the count already sits at the
    /// bound it would move towards.
    pub fn wanted_direction(
        &self,
        sample: &UtilizationSample,
        replicas: &ReplicaState,
    ) -> Option<ScaleDirection> {
        if self.is_overloaded(sample) && replicas.current < replicas.max {
            Some(ScaleDirection::Up)
        } else if self.is_underloaded(sample) && replicas.current > replicas.min {
            Some(ScaleDirection::Down)
        } else {
            None
        }
    }

    /// Decide what to do this cycle.
    ///
    /// Scale-up is checked first and wins. Each decision moves by one
    /// replica; the target is always clamped into `[min, max]`.
    pub fn decide(
        &self,
        sample: &UtilizationSample,
        replicas: &ReplicaState,
        cooldown: &CooldownState,
        now: Instant,
    ) -> ScalingDecision {
        let Some(direction) = self.wanted_direction(sample, replicas) else {
            return ScalingDecision::NoAction;
        };

        let allowed = match direction {
            ScaleDirection::Up => cooldown.scale_up_allowed(now),
            ScaleDirection::Down => cooldown.scale_down_allowed(now),
        };
        if !allowed {
            debug!(
                service = %replicas.service_name,
                ?direction,
                remaining_secs = cooldown.remaining(direction, now).as_secs(),
                "held by cooldown"
            );
            return ScalingDecision::NoAction;
        }

        let current = replicas.current;
        let (target, decision) = match direction {
            ScaleDirection::Up => {
                let target = clamp_target(current + 1, replicas);
                (target, ScalingDecision::ScaleUp(target))
            }
            ScaleDirection::Down => {
                let target = clamp_target(current - 1, replicas);
                (target, ScalingDecision::ScaleDown(target))
            }
        };
        debug!(
            service = %replicas.service_name,
            ?direction,
            from = current,
            to = target,
            cpu = sample.cpu_percent,
            memory = sample.memory_percent,
            "scale eligible"
        );
        decision
    }
}

/// Clamp into `[min, max]` without panicking on inverted bounds.
fn clamp_target(target: u32, replicas: &ReplicaState) -> u32 {
    target.min(replicas.max).max(replicas.min)
}
