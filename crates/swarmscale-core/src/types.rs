//! Domain types shared by the metrics, orchestrator and autoscale crates.
//!
//! `ReplicaState` and `CooldownState` are the only long-lived mutable
//! state in the system; both are plain structs owned by the control loop
//! so tests can build any state directly.

use std::fmt;
use std::str::FromStr;
use std::time::{Duration, Instant};

use crate::error::{AutoscaleError, ConfigError, OrchestratorError};

// ── Observation ────────────────────────────────────────────────────

/// A value from a collaborator that degrades instead of failing.
///
/// `value` is always usable; `fault` carries the condition that forced a
/// fallback value, for the caller to log.
#[derive(Debug)]
pub struct Observation<T> {
    pub value: T,
    pub fault: Option<AutoscaleError>,
}

impl<T> Observation<T> {
    /// A value observed without trouble.
    pub fn ok(value: T) -> Self {
        Self { value, fault: None }
    }

    /// A fallback value standing in for a failed observation.
    pub fn degraded(value: T, fault: AutoscaleError) -> Self {
        Self {
            value,
            fault: Some(fault),
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.fault.is_some()
    }
}

// ── Utilization ────────────────────────────────────────────────────

/// Point-in-time CPU and memory reading for the managed service.
///
/// A metric that could not be fetched is recorded as `0.0`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UtilizationSample {
    pub cpu_percent: f64,
    pub memory_percent: f64,
    pub observed_at: Instant,
}

impl UtilizationSample {
    pub fn new(cpu_percent: f64, memory_percent: f64, observed_at: Instant) -> Self {
        Self {
            cpu_percent,
            memory_percent,
            observed_at,
        }
    }
}

// ── Replica state ──────────────────────────────────────────────────

/// Replica bounds and last known count for one service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplicaState {
    pub service_name: String,
    pub current: u32,
    pub min: u32,
    pub max: u32,
}

impl ReplicaState {
    /// Create a replica state, validating `1 <= min <= max`.
    pub fn new(
        service_name: impl Into<String>,
        current: u32,
        min: u32,
        max: u32,
    ) -> Result<Self, ConfigError> {
        if min < 1 {
            return Err(ConfigError::Invalid(
                "min_replicas must be at least 1".to_string(),
            ));
        }
        if max < min {
            return Err(ConfigError::Invalid(format!(
                "max_replicas ({max}) must be >= min_replicas ({min})"
            )));
        }
        Ok(Self {
            service_name: service_name.into(),
            current,
            min,
            max,
        })
    }

    /// Whether `current` sits inside `[min, max]`.
    pub fn within_bounds(&self) -> bool {
        (self.min..=self.max).contains(&self.current)
    }
}

// ── Cooldown ───────────────────────────────────────────────────────

/// When the service was last scaled, and how long each direction must
/// wait afterwards.
///
/// `last_scale_at == None` means no scale has happened yet and neither
/// direction is restricted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CooldownState {
    pub last_scale_at: Option<Instant>,
    pub scale_up_cooldown: Duration,
    pub scale_down_cooldown: Duration,
}

impl CooldownState {
    pub fn new(scale_up_cooldown: Duration, scale_down_cooldown: Duration) -> Self {
        Self {
            last_scale_at: None,
            scale_up_cooldown,
            scale_down_cooldown,
        }
    }

    pub fn scale_up_allowed(&self, now: Instant) -> bool {
        self.window_elapsed(self.scale_up_cooldown, now)
    }

    pub fn scale_down_allowed(&self, now: Instant) -> bool {
        self.window_elapsed(self.scale_down_cooldown, now)
    }

    /// Time left before the given direction may act again.
    pub fn remaining(&self, direction: ScaleDirection, now: Instant) -> Duration {
        let window = match direction {
            ScaleDirection::Up => self.scale_up_cooldown,
            ScaleDirection::Down => self.scale_down_cooldown,
        };
        match self.last_scale_at {
            Some(last) => window.saturating_sub(now.saturating_duration_since(last)),
            None => Duration::ZERO,
        }
    }

    /// Start a new cooldown window. Only called after a successful scale.
    pub fn record_scale(&mut self, now: Instant) {
        self.last_scale_at = Some(now);
    }

    fn window_elapsed(&self, window: Duration, now: Instant) -> bool {
        match self.last_scale_at {
            Some(last) => now.saturating_duration_since(last) >= window,
            None => true,
        }
    }
}

// ── Decisions ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScaleDirection {
    Up,
    Down,
}

/// What the policy wants done this cycle. Never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalingDecision {
    NoAction,
    ScaleUp(u32),
    ScaleDown(u32),
}

impl ScalingDecision {
    /// The requested replica count, if any.
    pub fn target(&self) -> Option<u32> {
        match self {
            ScalingDecision::NoAction => None,
            ScalingDecision::ScaleUp(t) | ScalingDecision::ScaleDown(t) => Some(*t),
        }
    }
}

impl fmt::Display for ScalingDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScalingDecision::NoAction => write!(f, "no-action"),
            ScalingDecision::ScaleUp(t) => write!(f, "scale-up to {t}"),
            ScalingDecision::ScaleDown(t) => write!(f, "scale-down to {t}"),
        }
    }
}

// ── Orchestrator listing ───────────────────────────────────────────

/// Running vs desired tasks, as the orchestrator reports `"2/3"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplicaCount {
    pub running: u32,
    pub desired: u32,
}

impl FromStr for ReplicaCount {
    type Err = OrchestratorError;

    /// Parses `"<running>/<desired>"`. Anything after the first whitespace
    /// (e.g. `"(max 1 per node)"`) is ignored.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || OrchestratorError::InvalidReplicas(s.to_string());
        let head = s.split_whitespace().next().ok_or_else(invalid)?;
        let (running, desired) = head.split_once('/').ok_or_else(invalid)?;
        Ok(Self {
            running: running.parse().map_err(|_| invalid())?,
            desired: desired.parse().map_err(|_| invalid())?,
        })
    }
}

impl fmt::Display for ReplicaCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.running, self.desired)
    }
}

/// One service as listed by the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceEntry {
    pub name: String,
    pub replicas: ReplicaCount,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replica_state_rejects_zero_min() {
        assert!(ReplicaState::new("api", 1, 0, 5).is_err());
    }

    #[test]
    fn replica_state_rejects_max_below_min() {
        assert!(ReplicaState::new("api", 1, 3, 2).is_err());
    }

    #[test]
    fn replica_state_bounds() {
        let mut state = ReplicaState::new("api", 2, 1, 5).unwrap();
        assert!(state.within_bounds());
        state.current = 7;
        assert!(!state.within_bounds());
    }

    #[test]
    fn cooldown_unrestricted_before_first_scale() {
        let cooldown = CooldownState::new(Duration::from_secs(60), Duration::from_secs(300));
        let now = Instant::now();
        assert!(cooldown.scale_up_allowed(now));
        assert!(cooldown.scale_down_allowed(now));
        assert_eq!(cooldown.remaining(ScaleDirection::Down, now), Duration::ZERO);
    }

    #[test]
    fn cooldown_windows_are_per_direction() {
        let mut cooldown =
            CooldownState::new(Duration::from_secs(60), Duration::from_secs(300));
        let t0 = Instant::now();
        cooldown.record_scale(t0);

        let later = t0 + Duration::from_secs(120);
        assert!(cooldown.scale_up_allowed(later));
        assert!(!cooldown.scale_down_allowed(later));
        assert_eq!(
            cooldown.remaining(ScaleDirection::Down, later),
            Duration::from_secs(180)
        );
    }

    #[test]
    fn cooldown_boundary_is_inclusive() {
        let mut cooldown = CooldownState::new(Duration::from_secs(60), Duration::from_secs(60));
        let t0 = Instant::now();
        cooldown.record_scale(t0);
        assert!(!cooldown.scale_up_allowed(t0 + Duration::from_secs(59)));
        assert!(cooldown.scale_up_allowed(t0 + Duration::from_secs(60)));
    }

    #[test]
    fn decision_target_and_display() {
        assert_eq!(ScalingDecision::NoAction.target(), None);
        assert_eq!(ScalingDecision::ScaleUp(3).target(), Some(3));
        assert_eq!(ScalingDecision::ScaleDown(2).target(), Some(2));
        assert_eq!(ScalingDecision::ScaleUp(3).to_string(), "scale-up to 3");
    }

    #[test]
    fn replica_count_parses_running_and_desired() {
        let count: ReplicaCount = "2/3".parse().unwrap();
        assert_eq!(count, ReplicaCount { running: 2, desired: 3 });
    }

    #[test]
    fn replica_count_ignores_annotation() {
        let count: ReplicaCount = "1/1 (max 1 per node)".parse().unwrap();
        assert_eq!(count.running, 1);
        assert_eq!(count.desired, 1);
    }

    #[test]
    fn replica_count_rejects_garbage() {
        assert!("".parse::<ReplicaCount>().is_err());
        assert!("3".parse::<ReplicaCount>().is_err());
        assert!("a/b".parse::<ReplicaCount>().is_err());
        assert!("-1/2".parse::<ReplicaCount>().is_err());
    }

    #[test]
    fn observation_tracks_degradation() {
        let ok = Observation::ok(3u32);
        assert!(!ok.is_degraded());

        let degraded = Observation::degraded(
            1u32,
            AutoscaleError::CycleAborted("boom".to_string()),
        );
        assert!(degraded.is_degraded());
        assert_eq!(degraded.value, 1);
    }
}
