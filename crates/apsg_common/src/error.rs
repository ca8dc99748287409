//! Error types for the aperture/scatterguard pair.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::positions::{Position, SlotName};

/// Why a single issued move (or a combination of moves) did not succeed.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MoveFault {
    #[error("{axis}: {message}")]
    Axis { axis: String, message: String },

    #[error("{axis}: target {target} outside soft limits [{low}, {high}]")]
    OutOfRange {
        axis: String,
        target: f64,
        low: f64,
        high: f64,
    },

    #[error("{axis}: status dropped before the move resolved")]
    Abandoned { axis: String },

    #[error("move did not resolve within {0:?}")]
    TimedOut(Duration),
}

impl MoveFault {
    pub fn axis(axis: impl Into<String>, message: impl Into<String>) -> Self {
        MoveFault::Axis {
            axis: axis.into(),
            message: message.into(),
        }
    }
}

/// Rejections and failures of a safe move request.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MoveError {
    #[error("aperture z is still moving; wait for it to finish before requesting another move")]
    AxisBusy,

    #[error("target {target} is not one of the calibrated aperture positions")]
    UnknownTarget { target: Position },

    #[error(
        "current aperture z ({current}) is outside tolerance ({tolerance}) of target z ({target}); \
         safe moves are only defined between calibrated positions"
    )]
    UncalibratedZDeviation {
        current: f64,
        target: f64,
        tolerance: f64,
    },

    #[error("aperture/scatterguard move failed: {0}")]
    AxisMoveFailed(#[from] MoveFault),

    #[error("no aperture positions loaded")]
    PositionsNotLoaded,

    #[error("aperture position {0} is not calibrated")]
    SlotNotCalibrated(SlotName),

    #[error("previous aperture/scatterguard move has not resolved yet")]
    PreviousMoveInFlight,
}

impl MoveError {
    /// True when the request was refused before any axis was commanded.
    pub fn is_rejection(&self) -> bool {
        !matches!(self, MoveError::AxisMoveFailed(_))
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RegistryError {
    #[error("position {0} is already registered")]
    DuplicateName(SlotName),

    #[error("{name} duplicates the calibrated position of {existing}")]
    DuplicatePosition { name: SlotName, existing: SlotName },

    #[error("position {0} has a non-finite coordinate")]
    NonFinite(SlotName),

    #[error("position {0} was never registered")]
    MissingSlot(SlotName),
}

#[derive(Error, Debug)]
pub enum CalibrationError {
    #[error("failed to read beamline parameters {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed beamline parameter on line {line}: {content:?}")]
    Parse { line: usize, content: String },

    #[error("beamline parameter {0} is missing")]
    MissingParameter(String),

    #[error("beamline parameter {key} is not numeric: {value}")]
    NotNumeric { key: String, value: String },

    #[error("calibrated positions are invalid: {0}")]
    Registry(#[from] RegistryError),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error(transparent)]
    Calibration(#[from] CalibrationError),

    #[error("config defines neither inline positions nor a beamline parameters file")]
    NoPositions,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_axis_failures_are_not_rejections() {
        assert!(MoveError::AxisBusy.is_rejection());
        assert!(MoveError::PositionsNotLoaded.is_rejection());
        assert!(MoveError::PreviousMoveInFlight.is_rejection());
        assert!(MoveError::SlotNotCalibrated(SlotName::Small).is_rejection());
        assert!(!MoveError::AxisMoveFailed(MoveFault::axis("sg-x", "stall")).is_rejection());
    }

    #[test]
    fn test_fault_message_names_axis() {
        let fault = MoveFault::OutOfRange {
            axis: "ap-y".to_string(),
            target: 60.0,
            low: 0.0,
            high: 50.0,
        };
        assert!(fault.to_string().starts_with("ap-y:"));
    }
}
