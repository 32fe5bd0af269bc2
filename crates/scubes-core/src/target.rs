use serde::{Deserialize, Serialize};

use crate::error::{Result, ScubesError};
use crate::wcs::SkyPosition;

/// One row of the input object table, as written in the configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ObjectEntry {
    pub name: String,
    /// Right ascension: sexagesimal hours (`"03:35:16.598"`) or decimal
    /// degrees.
    pub ra: String,
    /// Declination: sexagesimal or decimal degrees.
    pub dec: String,
    pub tile: String,
    /// Stamp side length in pixels.
    pub size: usize,
    /// Radius in pixels beyond which the mask excludes everything.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub angsize: Option<f64>,
    #[serde(default)]
    pub spec_z: String,
    #[serde(default)]
    pub phot_z: String,
}

impl ObjectEntry {
    pub fn to_target(&self) -> Result<Target> {
        if self.name.trim().is_empty() || self.name.contains(['/', '\\']) {
            return Err(ScubesError::InvalidUserInput(format!(
                "invalid object name {:?}",
                self.name
            )));
        }
        if self.size == 0 {
            return Err(ScubesError::InvalidUserInput(format!(
                "{}: stamp size must be positive",
                self.name
            )));
        }
        Ok(Target {
            name: self.name.clone(),
            position: SkyPosition::parse(&self.ra, &self.dec)?,
            tile: self.tile.clone(),
            size: self.size,
            angsize: self.angsize,
        })
    }
}

/// A catalogued object resolved for processing.
#[derive(Clone, Debug, PartialEq)]
pub struct Target {
    pub name: String,
    pub position: SkyPosition,
    pub tile: String,
    pub size: usize,
    pub angsize: Option<f64>,
}
