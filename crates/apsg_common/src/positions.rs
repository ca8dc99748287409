//! Calibrated aperture positions.
//!
//! A position is the full 5-axis setpoint (aperture x/y/z, scatterguard x/y)
//! that selects one aperture size. Four slots are calibrated per beamline and
//! held in a [`PositionRegistry`], which answers two different questions:
//!
//! - `is_member`: is this exactly one of the calibrated tuples? Gates moves.
//! - `match_name`: which slot is this within a tolerance of? Observability only,
//!   never fails, returns [`PositionName::Invalid`] when nothing is close.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::RegistryError;

/// One micrometre, in mm.
pub const NAME_MATCH_TOLERANCE_MM: f64 = 0.001;

/// Full 5-axis setpoint of the aperture/scatterguard pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub aperture_x: f64,
    pub aperture_y: f64,
    pub aperture_z: f64,
    pub scatterguard_x: f64,
    pub scatterguard_y: f64,
}

impl Position {
    pub const fn new(
        aperture_x: f64,
        aperture_y: f64,
        aperture_z: f64,
        scatterguard_x: f64,
        scatterguard_y: f64,
    ) -> Self {
        Self {
            aperture_x,
            aperture_y,
            aperture_z,
            scatterguard_x,
            scatterguard_y,
        }
    }

    pub fn from_array(values: [f64; 5]) -> Self {
        let [ax, ay, az, sx, sy] = values;
        Self::new(ax, ay, az, sx, sy)
    }

    pub fn to_array(&self) -> [f64; 5] {
        [
            self.aperture_x,
            self.aperture_y,
            self.aperture_z,
            self.scatterguard_x,
            self.scatterguard_y,
        ]
    }

    /// Largest per-axis absolute difference. Infinite if any axis is NaN.
    pub fn max_abs_diff(&self, other: &Position) -> f64 {
        self.to_array()
            .iter()
            .zip(other.to_array().iter())
            .map(|(a, b)| (a - b).abs())
            .fold(0.0, |max, diff| {
                if diff.is_nan() {
                    f64::INFINITY
                } else {
                    max.max(diff)
                }
            })
    }

    pub fn is_finite(&self) -> bool {
        self.to_array().iter().all(|v| v.is_finite())
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({}, {}, {}, {}, {})",
            self.aperture_x,
            self.aperture_y,
            self.aperture_z,
            self.scatterguard_x,
            self.scatterguard_y
        )
    }
}

/// The four calibrated slots, in matching priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotName {
    Large,
    Medium,
    Small,
    RobotLoad,
}

impl SlotName {
    pub const ALL: [SlotName; 4] = [
        SlotName::Large,
        SlotName::Medium,
        SlotName::Small,
        SlotName::RobotLoad,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SlotName::Large => "large",
            SlotName::Medium => "medium",
            SlotName::Small => "small",
            SlotName::RobotLoad => "robot_load",
        }
    }

    /// Key suffix used by GDA beamline parameter files.
    pub fn gda_suffix(&self) -> &'static str {
        match self {
            SlotName::Large => "LARGE_APERTURE",
            SlotName::Medium => "MEDIUM_APERTURE",
            SlotName::Small => "SMALL_APERTURE",
            SlotName::RobotLoad => "ROBOT_LOAD",
        }
    }

    fn index(&self) -> usize {
        match self {
            SlotName::Large => 0,
            SlotName::Medium => 1,
            SlotName::Small => 2,
            SlotName::RobotLoad => 3,
        }
    }
}

impl fmt::Display for SlotName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown aperture position {0:?} (expected large, medium, small or robot_load)")]
pub struct ParseSlotError(String);

impl FromStr for SlotName {
    type Err = ParseSlotError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "large" => Ok(SlotName::Large),
            "medium" => Ok(SlotName::Medium),
            "small" => Ok(SlotName::Small),
            "robot_load" | "robotload" => Ok(SlotName::RobotLoad),
            _ => Err(ParseSlotError(s.to_string())),
        }
    }
}

/// Slot name as reported for an arbitrary position.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionName {
    Large,
    Medium,
    Small,
    RobotLoad,
    #[default]
    Invalid,
}

impl PositionName {
    pub fn as_str(&self) -> &'static str {
        match self {
            PositionName::Large => "large",
            PositionName::Medium => "medium",
            PositionName::Small => "small",
            PositionName::RobotLoad => "robot_load",
            PositionName::Invalid => "invalid",
        }
    }

    pub fn slot(&self) -> Option<SlotName> {
        match self {
            PositionName::Large => Some(SlotName::Large),
            PositionName::Medium => Some(SlotName::Medium),
            PositionName::Small => Some(SlotName::Small),
            PositionName::RobotLoad => Some(SlotName::RobotLoad),
            PositionName::Invalid => None,
        }
    }
}

impl From<SlotName> for PositionName {
    fn from(slot: SlotName) -> Self {
        match slot {
            SlotName::Large => PositionName::Large,
            SlotName::Medium => PositionName::Medium,
            SlotName::Small => PositionName::Small,
            SlotName::RobotLoad => PositionName::RobotLoad,
        }
    }
}

impl fmt::Display for PositionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Calibration as delivered by a loader: one tuple per slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedPositionTable {
    pub large: Position,
    pub medium: Position,
    pub small: Position,
    pub robot_load: Position,
}

impl NamedPositionTable {
    pub fn get(&self, slot: SlotName) -> Position {
        match slot {
            SlotName::Large => self.large,
            SlotName::Medium => self.medium,
            SlotName::Small => self.small,
            SlotName::RobotLoad => self.robot_load,
        }
    }
}

/// Fixed-size table of calibrated slots.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PositionRegistry {
    slots: [Option<Position>; 4],
}

impl PositionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a complete registry, checking that all four tuples are distinct.
    pub fn from_table(table: &NamedPositionTable) -> Result<Self, RegistryError> {
        let mut registry = Self::new();
        for slot in SlotName::ALL {
            registry.register(slot, table.get(slot))?;
        }
        Ok(registry)
    }

    pub fn register(&mut self, name: SlotName, position: Position) -> Result<(), RegistryError> {
        if self.slots[name.index()].is_some() {
            return Err(RegistryError::DuplicateName(name));
        }
        if !position.is_finite() {
            return Err(RegistryError::NonFinite(name));
        }
        if let Some((existing, _)) = self.iter().find(|(_, p)| **p == position) {
            return Err(RegistryError::DuplicatePosition { name, existing });
        }
        self.slots[name.index()] = Some(position);
        Ok(())
    }

    pub fn get(&self, name: SlotName) -> Option<Position> {
        self.slots[name.index()]
    }

    /// Like [`get`](Self::get) but reports the missing slot as an error.
    pub fn require(&self, name: SlotName) -> Result<Position, RegistryError> {
        self.get(name).ok_or(RegistryError::MissingSlot(name))
    }

    pub fn is_complete(&self) -> bool {
        self.slots.iter().all(Option::is_some)
    }

    pub fn len(&self) -> usize {
        self.slots.iter().flatten().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Registered slots in matching priority order.
    pub fn iter(&self) -> impl Iterator<Item = (SlotName, &Position)> + '_ {
        SlotName::ALL
            .into_iter()
            .filter_map(move |slot| self.slots[slot.index()].as_ref().map(|p| (slot, p)))
    }

    /// First slot whose every coordinate lies within `tolerance` of `position`.
    pub fn match_name(&self, position: &Position, tolerance: f64) -> PositionName {
        self.iter()
            .find(|(_, calibrated)| calibrated.max_abs_diff(position) <= tolerance)
            .map(|(slot, _)| slot.into())
            .unwrap_or(PositionName::Invalid)
    }

    /// Exact equality against the calibrated tuples, no tolerance.
    pub fn is_member(&self, position: &Position) -> bool {
        self.iter().any(|(_, calibrated)| calibrated == position)
    }

    pub fn to_table(&self) -> Result<NamedPositionTable, RegistryError> {
        Ok(NamedPositionTable {
            large: self.require(SlotName::Large)?,
            medium: self.require(SlotName::Medium)?,
            small: self.require(SlotName::Small)?,
            robot_load: self.require(SlotName::RobotLoad)?,
        })
    }
}
