//! swarmscale-autoscale: utilization-driven replica scaling.
//!
//! Observes CPU and memory utilization for one service, compares them
//! against asymmetric thresholds, and steps the replica count by one
//! within `[min, max]`. Cooldown windows after every successful scale
//! prevent flapping.
//!
//! # Scaling Algorithm
//!
//! ```text
//! if (cpu > cpu_threshold or mem > mem_threshold)
//!    and current < max and scale-up cooldown elapsed:
//!     ScaleUp(min(current + 1, max))
//!
//! elif (cpu < cpu_threshold * 0.5 and mem < mem_threshold * 0.5)
//!    and current > min and scale-down cooldown elapsed:
//!     ScaleDown(max(current - 1, min))
//!
//! else:
//!     NoAction
//! ```
//!
//! Both windows are measured from the last successful scale in either
//! direction. A failed scale does not start a window.

pub mod control_loop;
pub mod policy;

pub use control_loop::{ControlLoop, CycleOutcome, CycleReport, LoopPhase};
pub use policy::ScalingPolicy;
