use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::bands::Band;
use crate::calibration::GridExtrapolation;
use crate::cube::CubeOptions;
use crate::extraction::{ExtractorBackend, SExtractorSettings};
use crate::mask::MaskParams;
use crate::target::ObjectEntry;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub paths: PathsConfig,
    #[serde(default)]
    pub calibration: CalibrationConfig,
    #[serde(default)]
    pub extraction: ExtractionConfig,
    #[serde(default)]
    pub mask: MaskParams,
    #[serde(default)]
    pub cube: CubeOptions,
    /// Bands in cube order.
    #[serde(default = "default_bands")]
    pub bands: Vec<Band>,
    pub objects: Vec<ObjectEntry>,
}

fn default_bands() -> Vec<Band> {
    Band::ALL.to_vec()
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            paths: PathsConfig::default(),
            calibration: CalibrationConfig::default(),
            extraction: ExtractionConfig::default(),
            mask: MaskParams::default(),
            cube: CubeOptions::default(),
            bands: default_bands(),
            objects: Vec::new(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Root of the per-object output directories.
    pub work_dir: PathBuf,
    /// Holds `{tile}_ZP.cat` zero-point tables.
    pub data_dir: PathBuf,
    /// Holds `SPLUS_<band>_offsets_grid.npy` correction grids.
    pub zpcorr_dir: PathBuf,
    /// Survey tile images, flat or in per-tile subdirectories.
    pub tiles_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            work_dir: PathBuf::from("cubes"),
            data_dir: PathBuf::from("data"),
            zpcorr_dir: PathBuf::from("data/zpcorr_idr3"),
            tiles_dir: PathBuf::from("tiles"),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    /// Behaviour of correction surfaces outside the 0..9200 pixel grid.
    pub grid_extrapolation: GridExtrapolation,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    pub backend: ExtractorBackend,
    pub sextractor: SExtractorSettings,
}
