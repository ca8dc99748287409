//! Apsg Common - safe moves for a beamline aperture/scatterguard pair.
//!
//! The aperture (x, y, z) and scatterguard (x, y) stages share a travel
//! corridor. [`ApertureScatterguard`] moves them between calibrated slots in
//! an order that keeps them from colliding.

pub mod calibration;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod motor;
pub mod positions;
pub mod status;

pub use coordinator::{ApertureScatterguard, MoveOrder, MovePhase, MoveRecord};
pub use error::{CalibrationError, ConfigError, MoveError, MoveFault, RegistryError};
pub use motor::{Aperture, Axis, AxisHandle, Scatterguard};
pub use positions::{NamedPositionTable, Position, PositionName, PositionRegistry, SlotName};
pub use status::{MoveStatus, StatusNotifier};
