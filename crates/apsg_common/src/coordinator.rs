//! Safe-move coordinator for the aperture/scatterguard pair.
//!
//! The aperture and scatterguard share a travel corridor. Moving both at once
//! between calibrated slots can drive them into each other, so every move
//! runs in two phases:
//!
//! 1. the stage that is in the way moves first and is waited on
//! 2. the other stage moves, and the caller gets a status for the whole move
//!
//! Which stage goes first depends on the direction of aperture y travel:
//! towards larger y the scatterguard clears first, otherwise the aperture
//! does. Phase 2 can only be issued with the [`ClearedCorridor`] token that a
//! successfully awaited [`PhaseOneBarrier`] hands out.
//!
//! Moves are only defined between calibrated slots. Requests are rejected
//! without commanding any axis when aperture z is still moving, the target
//! is not exactly a calibrated tuple, or aperture z is not already within
//! [`APERTURE_Z_TOLERANCE_STEPS`] motor steps of the target z.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{MoveError, MoveFault};
use crate::motor::{Aperture, Scatterguard};
use crate::positions::{
    Position, PositionName, PositionRegistry, SlotName, NAME_MATCH_TOLERANCE_MM,
};
use crate::status::MoveStatus;

/// Allowed aperture z deviation, in motor resolution steps.
pub const APERTURE_Z_TOLERANCE_STEPS: f64 = 3.0;

/// Where the coordinator is in handling the latest request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovePhase {
    #[default]
    Idle,
    Validating,
    Ordering,
    Phase1Moving,
    Phase2Moving,
    Done,
    Error,
}

impl fmt::Display for MovePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MovePhase::Idle => "idle",
            MovePhase::Validating => "validating",
            MovePhase::Ordering => "ordering",
            MovePhase::Phase1Moving => "phase1_moving",
            MovePhase::Phase2Moving => "phase2_moving",
            MovePhase::Done => "done",
            MovePhase::Error => "error",
        };
        f.write_str(s)
    }
}

/// Which stage clears the corridor first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MoveOrder {
    ScatterguardFirst,
    ApertureFirst,
}

impl MoveOrder {
    /// Travel towards larger aperture y moves the scatterguard out first.
    pub fn for_travel(current_aperture_y: f64, target_aperture_y: f64) -> Self {
        if target_aperture_y > current_aperture_y {
            MoveOrder::ScatterguardFirst
        } else {
            MoveOrder::ApertureFirst
        }
    }
}

impl fmt::Display for MoveOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MoveOrder::ScatterguardFirst => f.write_str("scatterguard-first"),
            MoveOrder::ApertureFirst => f.write_str("aperture-first"),
        }
    }
}

/// Issued clearing move. Waiting on it is the only way to a [`ClearedCorridor`].
#[must_use = "phase 1 must be waited on before phase 2 can be issued"]
pub struct PhaseOneBarrier {
    order: MoveOrder,
    status: MoveStatus,
}

impl PhaseOneBarrier {
    fn issue(
        order: MoveOrder,
        aperture: &Aperture,
        scatterguard: &Scatterguard,
        target: &Position,
    ) -> Self {
        let status = match order {
            MoveOrder::ScatterguardFirst => scatterguard.move_to(target),
            MoveOrder::ApertureFirst => aperture.move_to(target),
        };
        Self { order, status }
    }

    /// The status of the clearing move itself.
    pub fn status(&self) -> &MoveStatus {
        &self.status
    }

    /// Wait for the clearing move. Returns the failed status alongside the
    /// fault so callers can still track axes that keep moving.
    pub async fn wait(self) -> Result<ClearedCorridor, (MoveFault, MoveStatus)> {
        match self.status.wait().await {
            Ok(()) => Ok(ClearedCorridor {
                order: self.order,
                phase_one: self.status,
            }),
            Err(fault) => Err((fault, self.status)),
        }
    }
}

/// Proof that the clearing stage has arrived.
pub struct ClearedCorridor {
    order: MoveOrder,
    phase_one: MoveStatus,
}

impl ClearedCorridor {
    /// Issue the remaining stage and combine it with the resolved phase 1.
    fn issue_remaining(
        self,
        aperture: &Aperture,
        scatterguard: &Scatterguard,
        target: &Position,
    ) -> MoveStatus {
        let phase_two = match self.order {
            MoveOrder::ScatterguardFirst => aperture.move_to(target),
            MoveOrder::ApertureFirst => scatterguard.move_to(target),
        };
        self.phase_one & phase_two
    }
}

/// Summary of the most recent move that got past validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoveRecord {
    pub request_id: Uuid,
    pub target: Position,
    pub target_name: PositionName,
    pub order: MoveOrder,
    pub issued_at: DateTime<Utc>,
}

/// Coordinator for one physical aperture/scatterguard pair.
///
/// `request_move` takes `&mut self`: one request at a time per pair. Share
/// it behind a `tokio::sync::Mutex` if several tasks need it.
pub struct ApertureScatterguard {
    aperture: Aperture,
    scatterguard: Scatterguard,
    positions: Option<PositionRegistry>,
    last_name: PositionName,
    phase: MovePhase,
    in_flight: Option<MoveStatus>,
    last_move: Option<MoveRecord>,
}

impl ApertureScatterguard {
    pub fn new(aperture: Aperture, scatterguard: Scatterguard) -> Self {
        Self {
            aperture,
            scatterguard,
            positions: None,
            last_name: PositionName::Invalid,
            phase: MovePhase::Idle,
            in_flight: None,
            last_move: None,
        }
    }

    pub fn load_positions(&mut self, positions: PositionRegistry) {
        info!(
            "[MOVE] Loaded {} aperture positions: {}",
            positions.len(),
            positions
                .iter()
                .map(|(slot, p)| format!("{}={}", slot, p))
                .collect::<Vec<_>>()
                .join(", ")
        );
        self.positions = Some(positions);
    }

    pub fn positions(&self) -> Option<&PositionRegistry> {
        self.positions.as_ref()
    }

    /// Name of the slot last requested. Best effort, not read back from hardware.
    pub fn current_position_name(&self) -> PositionName {
        self.last_name
    }

    pub fn phase(&self) -> MovePhase {
        self.phase
    }

    pub fn last_move(&self) -> Option<&MoveRecord> {
        self.last_move.as_ref()
    }

    pub fn aperture(&self) -> &Aperture {
        &self.aperture
    }

    pub fn scatterguard(&self) -> &Scatterguard {
        &self.scatterguard
    }

    /// Current readbacks of all five axes.
    pub fn readback(&self) -> Position {
        Position::new(
            self.aperture.x.read(),
            self.aperture.y.read(),
            self.aperture.z.read(),
            self.scatterguard.x.read(),
            self.scatterguard.y.read(),
        )
    }

    /// Slot the readbacks currently sit at, within one micrometre.
    pub fn matched_readback_name(&self) -> PositionName {
        match &self.positions {
            Some(positions) => positions.match_name(&self.readback(), NAME_MATCH_TOLERANCE_MM),
            None => PositionName::Invalid,
        }
    }

    /// Move to a calibrated slot by name.
    pub async fn request_named_move(&mut self, slot: SlotName) -> Result<MoveStatus, MoveError> {
        let target = self
            .positions
            .as_ref()
            .ok_or(MoveError::PositionsNotLoaded)?
            .get(slot)
            .ok_or(MoveError::SlotNotCalibrated(slot))?;
        self.request_move(target).await
    }

    /// Move safely to `target`, which must be one of the calibrated positions.
    ///
    /// Waits for the clearing stage, then returns a status covering both
    /// stages while the second is still moving. Validation failures happen
    /// before any axis is commanded. A failed clearing move is returned as
    /// [`MoveError::AxisMoveFailed`] and nothing is reversed.
    pub async fn request_move(&mut self, target: Position) -> Result<MoveStatus, MoveError> {
        let request_id = Uuid::new_v4();

        let order = match self.plan(request_id, &target) {
            Ok(order) => order,
            Err(e) => {
                self.phase = MovePhase::Error;
                warn!("[MOVE] {} rejected: {}", request_id, e);
                return Err(e);
            }
        };

        self.last_move = Some(MoveRecord {
            request_id,
            target,
            target_name: self.last_name,
            order,
            issued_at: Utc::now(),
        });

        self.phase = MovePhase::Phase1Moving;
        let barrier = PhaseOneBarrier::issue(order, &self.aperture, &self.scatterguard, &target);
        self.in_flight = Some(barrier.status().clone());
        debug!(
            "[MOVE] {} phase 1 issued ({}), waiting for {} axes",
            request_id,
            order,
            barrier.status().len()
        );

        let cleared = match barrier.wait().await {
            Ok(cleared) => cleared,
            Err((fault, _)) => {
                self.phase = MovePhase::Error;
                warn!("[MOVE] {} phase 1 failed: {}", request_id, fault);
                return Err(MoveError::AxisMoveFailed(fault));
            }
        };

        self.phase = MovePhase::Phase2Moving;
        let status = cleared.issue_remaining(&self.aperture, &self.scatterguard, &target);
        debug!("[MOVE] {} phase 2 issued", request_id);

        self.in_flight = Some(status.clone());
        self.phase = MovePhase::Done;
        Ok(status)
    }

    /// Validation and ordering. Reads device state only, commands nothing.
    fn plan(&mut self, request_id: Uuid, target: &Position) -> Result<MoveOrder, MoveError> {
        self.phase = MovePhase::Validating;

        if !self.aperture.z.is_settled() {
            return Err(MoveError::AxisBusy);
        }

        if let Some(previous) = &self.in_flight {
            if !previous.all_parts_resolved() {
                return Err(MoveError::PreviousMoveInFlight);
            }
        }

        let positions = self.positions.as_ref().ok_or(MoveError::PositionsNotLoaded)?;
        if !positions.is_member(target) {
            return Err(MoveError::UnknownTarget { target: *target });
        }

        let current_z = self.aperture.z.read();
        let tolerance = APERTURE_Z_TOLERANCE_STEPS * self.aperture.z.resolution();
        if (current_z - target.aperture_z).abs() > tolerance {
            return Err(MoveError::UncalibratedZDeviation {
                current: current_z,
                target: target.aperture_z,
                tolerance,
            });
        }

        self.last_name = positions.match_name(target, NAME_MATCH_TOLERANCE_MM);

        self.phase = MovePhase::Ordering;
        let current_y = self.aperture.y.read();
        let order = MoveOrder::for_travel(current_y, target.aperture_y);
        info!(
            "[MOVE] {} to {} {}: aperture y {} -> {}, {}",
            request_id, self.last_name, target, current_y, target.aperture_y, order
        );
        Ok(order)
    }
}
