//! Beamline parameter files.
//!
//! GDA keeps per-beamline calibration in a flat text file of `key = value`
//! lines. The aperture positions live under keys such as
//! `miniap_x_LARGE_APERTURE` and `sg_y_ROBOT_LOAD`.

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tracing::{debug, info};

use crate::error::CalibrationError;
use crate::positions::{NamedPositionTable, Position, PositionRegistry, SlotName};

/// One parameter value.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Number(f64),
    Flag(bool),
    Text(String),
}

impl ParamValue {
    fn parse(raw: &str) -> Self {
        match raw {
            "Yes" => ParamValue::Flag(true),
            "No" => ParamValue::Flag(false),
            _ => raw
                .parse::<f64>()
                .map(ParamValue::Number)
                .unwrap_or_else(|_| ParamValue::Text(raw.to_string())),
        }
    }
}

/// Parsed beamline parameter file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BeamlineParameters {
    params: HashMap<String, ParamValue>,
}

impl BeamlineParameters {
    pub fn from_file(path: &Path) -> Result<Self, CalibrationError> {
        let content = fs::read_to_string(path).map_err(|source| CalibrationError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let params = Self::parse(&content)?;
        info!("[CAL] Loaded {} beamline parameters from {}", params.len(), path.display());
        Ok(params)
    }

    /// Parse `key = value` lines. `#` starts a comment, blank lines are skipped.
    pub fn parse(content: &str) -> Result<Self, CalibrationError> {
        let mut params = HashMap::new();

        for (idx, raw_line) in content.lines().enumerate() {
            let line = match raw_line.find('#') {
                Some(pos) => &raw_line[..pos],
                None => raw_line,
            }
            .trim();

            if line.is_empty() {
                continue;
            }

            let (key, value) = line.split_once('=').ok_or_else(|| CalibrationError::Parse {
                line: idx + 1,
                content: raw_line.to_string(),
            })?;
            let key = key.trim();
            let value = value.trim();
            if key.is_empty() {
                return Err(CalibrationError::Parse {
                    line: idx + 1,
                    content: raw_line.to_string(),
                });
            }

            if params
                .insert(key.to_string(), ParamValue::parse(value))
                .is_some()
            {
                debug!("[CAL] Parameter {} redefined on line {}", key, idx + 1);
            }
        }

        Ok(Self { params })
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&ParamValue> {
        self.params.get(key)
    }

    pub fn number(&self, key: &str) -> Result<f64, CalibrationError> {
        match self.params.get(key) {
            Some(ParamValue::Number(v)) => Ok(*v),
            Some(ParamValue::Flag(v)) => Err(CalibrationError::NotNumeric {
                key: key.to_string(),
                value: if *v { "Yes".into() } else { "No".into() },
            }),
            Some(ParamValue::Text(v)) => Err(CalibrationError::NotNumeric {
                key: key.to_string(),
                value: v.clone(),
            }),
            None => Err(CalibrationError::MissingParameter(key.to_string())),
        }
    }

    /// The five motor positions calibrated for `slot`.
    pub fn aperture_position(&self, slot: SlotName) -> Result<Position, CalibrationError> {
        let suffix = slot.gda_suffix();
        Ok(Position::new(
            self.number(&format!("miniap_x_{}", suffix))?,
            self.number(&format!("miniap_y_{}", suffix))?,
            self.number(&format!("miniap_z_{}", suffix))?,
            self.number(&format!("sg_x_{}", suffix))?,
            self.number(&format!("sg_y_{}", suffix))?,
        ))
    }

    pub fn position_table(&self) -> Result<NamedPositionTable, CalibrationError> {
        Ok(NamedPositionTable {
            large: self.aperture_position(SlotName::Large)?,
            medium: self.aperture_position(SlotName::Medium)?,
            small: self.aperture_position(SlotName::Small)?,
            robot_load: self.aperture_position(SlotName::RobotLoad)?,
        })
    }

    /// Registry of all four calibrated slots.
    pub fn position_registry(&self) -> Result<PositionRegistry, CalibrationError> {
        Ok(PositionRegistry::from_table(&self.position_table()?)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RegistryError;
    use std::io::Write;

    const PARAMS: &str = "\
# Beamline parameters
dcm_perp_offset_FIXED = 25.6
DataCollection_TurboMode = Yes

miniap_x_LARGE_APERTURE = 2.389
miniap_y_LARGE_APERTURE = 40.986
miniap_z_LARGE_APERTURE = 15.8
sg_x_LARGE_APERTURE = 5.25
sg_y_LARGE_APERTURE = 4.43

miniap_x_MEDIUM_APERTURE = 2.384
miniap_y_MEDIUM_APERTURE = 44.967
miniap_z_MEDIUM_APERTURE = 15.8
sg_x_MEDIUM_APERTURE = 5.285
sg_y_MEDIUM_APERTURE = 0.46

miniap_x_SMALL_APERTURE = 2.430
miniap_y_SMALL_APERTURE = 48.974
miniap_z_SMALL_APERTURE = 15.8
sg_x_SMALL_APERTURE = 5.3375
sg_y_SMALL_APERTURE = -3.55

miniap_x_ROBOT_LOAD = 2.386   # parked for robot loads
miniap_y_ROBOT_LOAD = 31.40
miniap_z_ROBOT_LOAD = 15.8
sg_x_ROBOT_LOAD = 5.25
sg_y_ROBOT_LOAD = 4.43
";

    #[test]
    fn test_parse_values() {
        let params = BeamlineParameters::parse(PARAMS).unwrap();
        assert_eq!(params.get("DataCollection_TurboMode"), Some(&ParamValue::Flag(true)));
        assert_eq!(params.number("dcm_perp_offset_FIXED").unwrap(), 25.6);
        assert_eq!(params.number("miniap_x_ROBOT_LOAD").unwrap(), 2.386);
    }

    #[test]
    fn test_position_table_from_gda_keys() {
        let params = BeamlineParameters::parse(PARAMS).unwrap();
        let table = params.position_table().unwrap();
        assert_eq!(table.small, Position::new(2.430, 48.974, 15.8, 5.3375, -3.55));
        assert_eq!(table.robot_load, Position::new(2.386, 31.40, 15.8, 5.25, 4.43));

        let registry = params.position_registry().unwrap();
        assert!(registry.is_complete());
        assert!(registry.is_member(&table.medium));
    }

    #[test]
    fn test_missing_key_is_reported() {
        let trimmed: String = PARAMS
            .lines()
            .filter(|l| !l.starts_with("sg_y_MEDIUM_APERTURE"))
            .collect::<Vec<_>>()
            .join("\n");
        let params = BeamlineParameters::parse(&trimmed).unwrap();
        match params.position_table() {
            Err(CalibrationError::MissingParameter(key)) => {
                assert_eq!(key, "sg_y_MEDIUM_APERTURE")
            }
            other => panic!("expected missing parameter, got {:?}", other),
        }
    }

    #[test]
    fn test_non_numeric_position() {
        let params = BeamlineParameters::parse("miniap_x_LARGE_APERTURE = Yes").unwrap();
        assert!(matches!(
            params.aperture_position(SlotName::Large),
            Err(CalibrationError::NotNumeric { .. })
        ));
    }

    #[test]
    fn test_line_without_equals_is_an_error() {
        let err = BeamlineParameters::parse("a = 1\nnot a parameter\n").unwrap_err();
        assert!(matches!(err, CalibrationError::Parse { line: 2, .. }));
    }

    #[test]
    fn test_duplicate_slots_rejected() {
        let doubled = PARAMS
            .replace("miniap_y_MEDIUM_APERTURE = 44.967", "miniap_y_MEDIUM_APERTURE = 40.986")
            .replace("sg_x_MEDIUM_APERTURE = 5.285", "sg_x_MEDIUM_APERTURE = 5.25")
            .replace("sg_y_MEDIUM_APERTURE = 0.46", "sg_y_MEDIUM_APERTURE = 4.43")
            .replace("miniap_x_MEDIUM_APERTURE = 2.384", "miniap_x_MEDIUM_APERTURE = 2.389");
        let params = BeamlineParameters::parse(&doubled).unwrap();
        assert!(matches!(
            params.position_registry(),
            Err(CalibrationError::Registry(RegistryError::DuplicatePosition { .. }))
        ));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(PARAMS.as_bytes()).unwrap();
        let params = BeamlineParameters::from_file(file.path()).unwrap();
        assert_eq!(params.position_table().unwrap().large.aperture_y, 40.986);
    }

    #[test]
    fn test_from_missing_file() {
        let err = BeamlineParameters::from_file(Path::new("/nonexistent/beamline.txt")).unwrap_err();
        assert!(matches!(err, CalibrationError::Io { .. }));
    }
}
