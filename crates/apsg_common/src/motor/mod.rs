//! Motor facade.
//!
//! [`Axis`] is the minimal contract the coordinator needs from one physical
//! motor. Reads are expected to come from monitored values and never block;
//! `move_to` starts the move and returns immediately with a [`MoveStatus`].
//!
//! Implementations:
//! - [`SimulatedAxis`]: tokio-driven axis ramping at a fixed velocity
//! - [`FakeAxis`]: deterministic test double with call recording

pub mod fake;
pub mod sim;

pub use fake::{FakeAxis, FakeResponse, FakeRig, MoveCall, MoveLog};
pub use sim::{SimAxisConfig, SimulatedAxis};

use std::sync::Arc;

use crate::positions::Position;
use crate::status::MoveStatus;

/// One motorised axis as seen by the coordinator.
pub trait Axis: Send + Sync {
    /// Name used in logs and faults.
    fn name(&self) -> &str;

    /// Current readback value.
    fn read(&self) -> f64;

    /// Motion-complete flag (DMOV).
    fn is_settled(&self) -> bool;

    /// Smallest meaningful step (MRES).
    fn resolution(&self) -> f64;

    /// Start moving toward `value`. Must not block.
    ///
    /// Callers must not issue a second move on the same axis while the
    /// previous status is unresolved.
    fn move_to(&self, value: f64) -> MoveStatus;
}

pub type AxisHandle = Arc<dyn Axis>;

/// Aperture stage: x, y and z.
#[derive(Clone)]
pub struct Aperture {
    pub x: AxisHandle,
    pub y: AxisHandle,
    pub z: AxisHandle,
}

impl Aperture {
    pub fn new(x: AxisHandle, y: AxisHandle, z: AxisHandle) -> Self {
        Self { x, y, z }
    }

    /// Issue x, y and z concurrently.
    pub fn move_to(&self, target: &Position) -> MoveStatus {
        self.x.move_to(target.aperture_x)
            & self.y.move_to(target.aperture_y)
            & self.z.move_to(target.aperture_z)
    }

    pub fn is_settled(&self) -> bool {
        self.x.is_settled() && self.y.is_settled() && self.z.is_settled()
    }
}

/// Scatterguard stage: x and y.
#[derive(Clone)]
pub struct Scatterguard {
    pub x: AxisHandle,
    pub y: AxisHandle,
}

impl Scatterguard {
    pub fn new(x: AxisHandle, y: AxisHandle) -> Self {
        Self { x, y }
    }

    /// Issue x and y concurrently.
    pub fn move_to(&self, target: &Position) -> MoveStatus {
        self.x.move_to(target.scatterguard_x) & self.y.move_to(target.scatterguard_y)
    }

    pub fn is_settled(&self) -> bool {
        self.x.is_settled() && self.y.is_settled()
    }
}
