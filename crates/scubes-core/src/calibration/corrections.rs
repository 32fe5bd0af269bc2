use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use ndarray::Array2;
use tracing::{debug, warn};

use crate::bands::Band;
use crate::consts::{ZP_GRID_BINS, ZP_GRID_MAX, ZP_GRID_MIN};
use crate::error::{Result, ScubesError};
use crate::io::npy::read_npy;

use super::spline::{BicubicSpline, GridExtrapolation};

/// Node coordinates of the correction grid along either axis.
pub fn grid_nodes() -> Vec<f64> {
    let step = (ZP_GRID_MAX - ZP_GRID_MIN) / ZP_GRID_BINS as f64;
    (0..=ZP_GRID_BINS)
        .map(|i| ZP_GRID_MIN + step * i as f64)
        .collect()
}

fn surface(band: Band, grid: &Array2<f64>, extrapolation: GridExtrapolation) -> Result<BicubicSpline> {
    let nodes = grid_nodes();
    BicubicSpline::new(&nodes, &nodes, grid, extrapolation)
        .map_err(|e| ScubesError::MissingCalibrationData(format!("{band} correction grid: {e}")))
}

/// Position-dependent zero-point corrections, one surface per band.
#[derive(Clone, Debug, Default)]
pub struct ZeroPointCorrections {
    surfaces: BTreeMap<Band, BicubicSpline>,
}

impl ZeroPointCorrections {
    /// Path of the correction grid of `band` inside `dir`.
    pub fn path(dir: &Path, band: Band) -> PathBuf {
        dir.join(format!("SPLUS_{}_offsets_grid.npy", band.code()))
    }

    /// Load `SPLUS_<band>_offsets_grid.npy` for every band in `bands`.
    pub fn load(dir: &Path, bands: &[Band], extrapolation: GridExtrapolation) -> Result<Self> {
        let mut corrections = Self::default();
        for &band in bands {
            corrections.load_band(dir, band, extrapolation)?;
        }
        Ok(corrections)
    }

    /// Load the grid of `band` from `dir` unless its surface is already
    /// present.
    pub fn load_band(&mut self, dir: &Path, band: Band, extrapolation: GridExtrapolation) -> Result<()> {
        if self.has_band(band) {
            return Ok(());
        }
        let path = Self::path(dir, band);
        let grid = read_npy(&path).map_err(|e| match e {
            ScubesError::Io(io) if io.kind() == ErrorKind::NotFound => {
                ScubesError::MissingCalibrationData(format!(
                    "correction grid {} not found",
                    path.display()
                ))
            }
            ScubesError::InvalidFits(msg) | ScubesError::UnsupportedFormat(msg) => {
                ScubesError::MissingCalibrationData(format!("{}: {msg}", path.display()))
            }
            other => other,
        })?;
        debug!(band = %band, path = %path.display(), "Loaded zero-point correction grid");
        self.surfaces.insert(band, surface(band, &grid, extrapolation)?);
        Ok(())
    }

    pub fn has_band(&self, band: Band) -> bool {
        self.surfaces.contains_key(&band)
    }

    /// Build the surfaces from in-memory grids sampled on [`grid_nodes`].
    pub fn from_grids(
        grids: impl IntoIterator<Item = (Band, Array2<f64>)>,
        extrapolation: GridExtrapolation,
    ) -> Result<Self> {
        let mut surfaces = BTreeMap::new();
        for (band, grid) in grids {
            surfaces.insert(band, surface(band, &grid, extrapolation)?);
        }
        Ok(Self { surfaces })
    }

    /// Correction for `band` at tile pixel (`x`, `y`).
    pub fn evaluate(&self, band: Band, x: f64, y: f64) -> Result<f64> {
        let surface = self.surfaces.get(&band).ok_or_else(|| {
            ScubesError::MissingCalibrationData(format!("no correction grid loaded for {band}"))
        })?;
        if !surface.contains(x, y) {
            warn!(
                band = %band,
                x,
                y,
                "Tile position outside the zero-point correction grid"
            );
        }
        surface.eval(x, y)
    }
}
