//! Simulated axis.
//!
//! Stands in for a real motor record when no hardware is attached. Each move
//! spawns a tokio task that steps the readback toward the setpoint every
//! tick and resolves the status on arrival. A newer move supersedes an older
//! one; the older status then fails.

use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::runtime::Handle;
use tracing::{debug, warn};

use super::Axis;
use crate::error::MoveFault;
use crate::status::{MoveStatus, StatusNotifier};

/// Motion parameters for one simulated axis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SimAxisConfig {
    /// Travel speed in mm/s
    #[serde(default = "default_velocity")]
    pub velocity_mm_s: f64,

    /// Motor resolution in mm
    #[serde(default = "default_resolution")]
    pub resolution_mm: f64,

    /// Update period of the simulation in milliseconds
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,

    /// Soft limits; moves outside fail without motion
    #[serde(default)]
    pub limits: Option<(f64, f64)>,
}

fn default_velocity() -> f64 {
    5.0
}

fn default_resolution() -> f64 {
    0.0001
}

fn default_tick_ms() -> u64 {
    10
}

impl Default for SimAxisConfig {
    fn default() -> Self {
        Self {
            velocity_mm_s: default_velocity(),
            resolution_mm: default_resolution(),
            tick_ms: default_tick_ms(),
            limits: None,
        }
    }
}

#[derive(Debug)]
struct SimState {
    position: f64,
    settled: bool,
    generation: u64,
}

pub struct SimulatedAxis {
    name: String,
    config: SimAxisConfig,
    state: Arc<Mutex<SimState>>,
}

impl SimulatedAxis {
    pub fn new(name: impl Into<String>, position: f64, config: SimAxisConfig) -> Self {
        Self {
            name: name.into(),
            config,
            state: Arc::new(Mutex::new(SimState {
                position,
                settled: true,
                generation: 0,
            })),
        }
    }

    pub fn config(&self) -> &SimAxisConfig {
        &self.config
    }

    fn check_move(&self, value: f64) -> Result<(), MoveFault> {
        if !value.is_finite() {
            return Err(MoveFault::axis(
                self.name.as_str(),
                format!("target {} is not a finite position", value),
            ));
        }
        if !(self.config.velocity_mm_s.is_finite() && self.config.velocity_mm_s > 0.0) {
            return Err(MoveFault::axis(
                self.name.as_str(),
                format!("velocity {} mm/s cannot reach a target", self.config.velocity_mm_s),
            ));
        }
        if let Some((low, high)) = self.config.limits {
            if value < low || value > high {
                return Err(MoveFault::OutOfRange {
                    axis: self.name.clone(),
                    target: value,
                    low,
                    high,
                });
            }
        }
        Ok(())
    }
}

impl Axis for SimulatedAxis {
    fn name(&self) -> &str {
        &self.name
    }

    fn read(&self) -> f64 {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .position
    }

    fn is_settled(&self) -> bool {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .settled
    }

    fn resolution(&self) -> f64 {
        self.config.resolution_mm
    }

    fn move_to(&self, value: f64) -> MoveStatus {
        if let Err(fault) = self.check_move(value) {
            warn!("[SIM] {}", fault);
            return MoveStatus::failed(fault);
        }

        let runtime = match Handle::try_current() {
            Ok(runtime) => runtime,
            Err(e) => {
                return MoveStatus::failed(MoveFault::axis(
                    self.name.as_str(),
                    format!("no async runtime to drive the move: {}", e),
                ))
            }
        };

        let generation = {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            state.generation += 1;
            state.settled = false;
            state.generation
        };

        debug!("[SIM] {} -> {}", self.name, value);
        let (status, notifier) = MoveStatus::pending(&self.name);
        runtime.spawn(drive(
            Arc::clone(&self.state),
            self.config,
            generation,
            value,
            notifier,
        ));
        status
    }
}

async fn drive(
    state: Arc<Mutex<SimState>>,
    config: SimAxisConfig,
    generation: u64,
    target: f64,
    notifier: StatusNotifier,
) {
    let tick = Duration::from_millis(config.tick_ms.max(1));
    let step = config.velocity_mm_s * tick.as_secs_f64();
    let mut interval = tokio::time::interval(tick);
    // First tick completes immediately
    interval.tick().await;

    loop {
        interval.tick().await;
        let mut guard = state.lock().unwrap_or_else(PoisonError::into_inner);
        if guard.generation != generation {
            drop(guard);
            notifier.fail("superseded by a newer move");
            return;
        }

        let remaining = target - guard.position;
        if remaining.abs() <= step.max(config.resolution_mm) {
            guard.position = target;
            guard.settled = true;
            drop(guard);
            notifier.finish();
            return;
        }
        guard.position += step.copysign(remaining);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[tokio::test(start_paused = true)]
    async fn test_sim_axis_reaches_target() {
        let axis = SimulatedAxis::new("ap-y", 0.0, SimAxisConfig::default());
        let status = axis.move_to(1.0);
        assert!(!axis.is_settled());

        status.wait().await.unwrap();
        assert!(axis.is_settled());
        assert_relative_eq!(axis.read(), 1.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sim_axis_moves_backwards() {
        let axis = SimulatedAxis::new("sg-y", 4.43, SimAxisConfig::default());
        axis.move_to(-3.55).wait().await.unwrap();
        assert_relative_eq!(axis.read(), -3.55);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sim_axis_is_moving_midway() {
        let config = SimAxisConfig {
            velocity_mm_s: 1.0,
            ..SimAxisConfig::default()
        };
        let axis = SimulatedAxis::new("ap-x", 0.0, config);
        let status = axis.move_to(10.0);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(!status.is_done());
        let midway = axis.read();
        assert!(midway > 0.0 && midway < 10.0, "midway readback {}", midway);
    }

    #[tokio::test]
    async fn test_sim_axis_rejects_out_of_limits() {
        let config = SimAxisConfig {
            limits: Some((0.0, 50.0)),
            ..SimAxisConfig::default()
        };
        let axis = SimulatedAxis::new("ap-y", 10.0, config);
        let err = axis.move_to(60.0).wait().await.unwrap_err();
        assert!(matches!(err, MoveFault::OutOfRange { .. }));
        assert!(axis.is_settled());
        assert_relative_eq!(axis.read(), 10.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_newer_move_supersedes_older() {
        let axis = SimulatedAxis::new("ap-z", 0.0, SimAxisConfig::default());
        let first = axis.move_to(100.0);
        let second = axis.move_to(1.0);

        assert!(first.wait().await.is_err());
        second.wait().await.unwrap();
        assert_relative_eq!(axis.read(), 1.0);
    }

    #[tokio::test]
    async fn test_non_finite_target_fails_without_motion() {
        let axis = SimulatedAxis::new("ap-y", 10.0, SimAxisConfig::default());
        for target in [f64::NAN, f64::INFINITY] {
            let status = axis.move_to(target);
            assert!(matches!(status.outcome(), Some(Err(MoveFault::Axis { .. }))));
        }
        assert!(axis.is_settled());
        assert_relative_eq!(axis.read(), 10.0);
    }

    #[tokio::test]
    async fn test_stalled_velocity_fails_without_motion() {
        for velocity_mm_s in [0.0, -1.0, f64::NAN] {
            let config = SimAxisConfig {
                velocity_mm_s,
                ..SimAxisConfig::default()
            };
            let axis = SimulatedAxis::new("sg-x", 5.25, config);
            let err = axis.move_to(5.3375).wait().await.unwrap_err();
            assert!(matches!(err, MoveFault::Axis { .. }));
            assert!(axis.is_settled());
        }
    }

    #[test]
    fn test_move_without_runtime_fails() {
        let axis = SimulatedAxis::new("ap-x", 0.0, SimAxisConfig::default());
        let status = axis.move_to(1.0);
        assert!(matches!(status.outcome(), Some(Err(MoveFault::Axis { .. }))));
        assert!(axis.is_settled());
    }
}
