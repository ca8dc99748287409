//! Fake axes for deterministic testing.
//!
//! A [`FakeAxis`] never moves by itself. What a `move_to` does is picked with
//! [`FakeResponse`]: complete immediately, fail immediately, or hold the
//! status until the test releases it. Every call is recorded, and axes can
//! share a [`MoveLog`] so tests can assert the order of issue across axes.
//!
//! ## Example
//!
//! ```rust,ignore
//! let rig = FakeRig::at(small);
//! rig.sg_x.respond_with(FakeResponse::Hold);
//! let mut coordinator = rig.coordinator(registry);
//! // ... drive a move, then
//! rig.sg_x.release_all();
//! assert_eq!(rig.log.axes(), vec!["sg-x", "sg-y", "ap-x", "ap-y", "ap-z"]);
//! ```

use std::sync::{Arc, Mutex, PoisonError};

use super::{Aperture, Axis, Scatterguard};
use crate::coordinator::ApertureScatterguard;
use crate::error::MoveFault;
use crate::positions::{Position, PositionRegistry};
use crate::status::{MoveStatus, StatusNotifier};

/// One recorded `move_to` call.
#[derive(Debug, Clone, PartialEq)]
pub struct MoveCall {
    pub axis: String,
    pub target: f64,
}

/// Issue-order log shared between fake axes.
#[derive(Debug, Clone, Default)]
pub struct MoveLog {
    calls: Arc<Mutex<Vec<MoveCall>>>,
}

impl MoveLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, axis: &str, target: f64) {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(MoveCall {
                axis: axis.to_string(),
                target,
            });
    }

    pub fn calls(&self) -> Vec<MoveCall> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Axis names in issue order.
    pub fn axes(&self) -> Vec<String> {
        self.calls().into_iter().map(|c| c.axis).collect()
    }

    pub fn len(&self) -> usize {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).clear();
    }
}

/// What a [`FakeAxis`] does when asked to move.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum FakeResponse {
    /// Arrive instantly; the status is already resolved.
    #[default]
    Complete,
    /// Fail instantly with this message.
    Fail(String),
    /// Stay pending until [`FakeAxis::release_all`] or [`FakeAxis::fail_all`].
    Hold,
    /// Drop the notifier without resolving, like a driver that lost the move.
    Abandon,
}

#[derive(Debug)]
struct FakeState {
    position: f64,
    settled: bool,
    resolution: f64,
    response: FakeResponse,
    calls: Vec<f64>,
    held: Vec<(f64, StatusNotifier)>,
}

#[derive(Debug)]
pub struct FakeAxis {
    name: String,
    state: Mutex<FakeState>,
    log: MoveLog,
}

impl FakeAxis {
    pub fn new(name: &str, position: f64) -> Self {
        Self::with_log(name, position, MoveLog::new())
    }

    pub fn with_log(name: &str, position: f64, log: MoveLog) -> Self {
        Self {
            name: name.to_string(),
            state: Mutex::new(FakeState {
                position,
                settled: true,
                resolution: 0.0001,
                response: FakeResponse::Complete,
                calls: Vec::new(),
                held: Vec::new(),
            }),
            log,
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn respond_with(&self, response: FakeResponse) {
        self.state().response = response;
    }

    pub fn set_settled(&self, settled: bool) {
        self.state().settled = settled;
    }

    pub fn set_position(&self, position: f64) {
        self.state().position = position;
    }

    pub fn set_resolution(&self, resolution: f64) {
        self.state().resolution = resolution;
    }

    pub fn call_count(&self) -> usize {
        self.state().calls.len()
    }

    pub fn calls(&self) -> Vec<f64> {
        self.state().calls.clone()
    }

    pub fn held_count(&self) -> usize {
        self.state().held.len()
    }

    /// Complete every held move, updating the readback.
    pub fn release_all(&self) {
        let held = {
            let mut state = self.state();
            let held = std::mem::take(&mut state.held);
            if let Some((target, _)) = held.last() {
                state.position = *target;
            }
            state.settled = true;
            held
        };
        for (_, notifier) in held {
            notifier.finish();
        }
    }

    /// Fail every held move; the readback stays where it was.
    pub fn fail_all(&self, message: &str) {
        let held = {
            let mut state = self.state();
            state.settled = true;
            std::mem::take(&mut state.held)
        };
        for (_, notifier) in held {
            notifier.fail(message);
        }
    }
}

impl Axis for FakeAxis {
    fn name(&self) -> &str {
        &self.name
    }

    fn read(&self) -> f64 {
        self.state().position
    }

    fn is_settled(&self) -> bool {
        self.state().settled
    }

    fn resolution(&self) -> f64 {
        self.state().resolution
    }

    fn move_to(&self, value: f64) -> MoveStatus {
        self.log.record(&self.name, value);
        let mut state = self.state();
        state.calls.push(value);

        match state.response.clone() {
            FakeResponse::Complete => {
                state.position = value;
                MoveStatus::done()
            }
            FakeResponse::Fail(message) => {
                MoveStatus::failed(MoveFault::axis(self.name.as_str(), message))
            }
            FakeResponse::Hold => {
                let (status, notifier) = MoveStatus::pending(&self.name);
                state.settled = false;
                state.held.push((value, notifier));
                status
            }
            FakeResponse::Abandon => MoveStatus::pending(&self.name).0,
        }
    }
}

/// Five fake axes sharing one [`MoveLog`], named `ap-x`, `ap-y`, `ap-z`,
/// `sg-x` and `sg-y`.
pub struct FakeRig {
    pub ap_x: Arc<FakeAxis>,
    pub ap_y: Arc<FakeAxis>,
    pub ap_z: Arc<FakeAxis>,
    pub sg_x: Arc<FakeAxis>,
    pub sg_y: Arc<FakeAxis>,
    pub log: MoveLog,
}

impl FakeRig {
    /// All axes resting at `position`.
    pub fn at(position: Position) -> Self {
        let log = MoveLog::new();
        let axis = |name: &str, value: f64| Arc::new(FakeAxis::with_log(name, value, log.clone()));
        Self {
            ap_x: axis("ap-x", position.aperture_x),
            ap_y: axis("ap-y", position.aperture_y),
            ap_z: axis("ap-z", position.aperture_z),
            sg_x: axis("sg-x", position.scatterguard_x),
            sg_y: axis("sg-y", position.scatterguard_y),
            log,
        }
    }

    pub fn aperture(&self) -> Aperture {
        Aperture::new(self.ap_x.clone(), self.ap_y.clone(), self.ap_z.clone())
    }

    pub fn scatterguard(&self) -> Scatterguard {
        Scatterguard::new(self.sg_x.clone(), self.sg_y.clone())
    }

    pub fn axes(&self) -> [&Arc<FakeAxis>; 5] {
        [&self.ap_x, &self.ap_y, &self.ap_z, &self.sg_x, &self.sg_y]
    }

    /// Coordinator over this rig with `positions` loaded.
    pub fn coordinator(&self, positions: PositionRegistry) -> ApertureScatterguard {
        let mut coordinator = ApertureScatterguard::new(self.aperture(), self.scatterguard());
        coordinator.load_positions(positions);
        coordinator
    }

    pub fn total_calls(&self) -> usize {
        self.axes().iter().map(|a| a.call_count()).sum()
    }
}
