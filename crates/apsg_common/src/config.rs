//! Configuration for apsg tools.
//!
//! Loads settings from /etc/apsg/config.toml or uses defaults. Positions come
//! either inline (`[positions.*]` tables) or from a GDA beamline parameter
//! file; inline positions win when both are present.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::calibration::BeamlineParameters;
use crate::error::ConfigError;
use crate::motor::SimAxisConfig;
use crate::positions::{NamedPositionTable, Position, PositionRegistry};

/// Config file path
pub const CONFIG_PATH: &str = "/etc/apsg/config.toml";

/// Where calibrated positions come from.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CalibrationConfig {
    /// GDA beamline parameters file
    #[serde(default)]
    pub beamline_parameters: Option<PathBuf>,
}

/// Simulated axes used when no hardware is attached.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    #[serde(default = "default_aperture_axis")]
    pub aperture: SimAxisConfig,

    #[serde(default = "default_scatterguard_axis")]
    pub scatterguard: SimAxisConfig,
}

fn default_aperture_axis() -> SimAxisConfig {
    SimAxisConfig::default()
}

fn default_scatterguard_axis() -> SimAxisConfig {
    // Scatterguard motors are slower and coarser
    SimAxisConfig {
        velocity_mm_s: 2.0,
        resolution_mm: 0.0005,
        ..SimAxisConfig::default()
    }
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            aperture: default_aperture_axis(),
            scatterguard: default_scatterguard_axis(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// tracing filter directive, overridden by RUST_LOG
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub calibration: CalibrationConfig,

    /// Inline calibrated positions
    #[serde(default)]
    pub positions: Option<NamedPositionTable>,

    #[serde(default)]
    pub simulation: SimulationConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Demo calibration so a fresh install can run against simulated axes.
fn default_positions() -> NamedPositionTable {
    NamedPositionTable {
        large: Position::new(2.389, 40.986, 15.8, 5.25, 4.43),
        medium: Position::new(2.384, 44.967, 15.8, 5.285, 0.46),
        small: Position::new(2.430, 48.974, 15.8, 5.3375, -3.55),
        robot_load: Position::new(2.386, 31.40, 15.8, 5.25, 4.43),
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            calibration: CalibrationConfig::default(),
            positions: Some(default_positions()),
            simulation: SimulationConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    /// Load from `path`, or from [`CONFIG_PATH`] falling back to defaults.
    ///
    /// An explicitly given path must exist and parse.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load_from_path(path),
            None => Ok(Self::load_from_path(Path::new(CONFIG_PATH)).unwrap_or_else(|e| {
                warn!("Config not found, using defaults: {}", e);
                Config::default()
            })),
        }
    }

    fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::parse(&content)?;
        info!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Save default config to path (for init)
    pub fn save_default(path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(&Config::default())?;
        let io_err = |source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        fs::write(path, content).map_err(io_err)?;
        info!("Saved default config to {}", path.display());
        Ok(())
    }

    /// Build the registry of calibrated positions.
    pub fn position_registry(&self) -> Result<PositionRegistry, ConfigError> {
        if let Some(table) = &self.positions {
            if self.calibration.beamline_parameters.is_some() {
                warn!("Both inline positions and a beamline parameters file configured; using inline positions");
            }
            return PositionRegistry::from_table(table)
                .map_err(|e| ConfigError::Calibration(e.into()));
        }

        match &self.calibration.beamline_parameters {
            Some(path) => Ok(BeamlineParameters::from_file(path)?.position_registry()?),
            None => Err(ConfigError::NoPositions),
        }
    }
}
