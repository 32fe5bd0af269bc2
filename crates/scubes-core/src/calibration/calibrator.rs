use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::{debug, info};

use crate::artifacts::ArtifactLayout;
use crate::bands::Band;
use crate::consts::ZP_CORRECTION_DECIMALS;
use crate::error::{Result, ScubesError};
use crate::stamp::{require_f64, require_str, update_stamp_header, Stamp};
use crate::target::Target;

use super::corrections::ZeroPointCorrections;
use super::spline::GridExtrapolation;
use super::zero_points::ZeroPointTable;

/// Header keyword holding the calibrated zero point.
pub const MAGZP_KEY: &str = "MAGZP";
const MAGZP_COMMENT: &str = "Magnitude zero point";

/// Zero point written for one stamp.
#[derive(Clone, Debug, PartialEq)]
pub struct CalibratedStamp {
    pub path: PathBuf,
    pub band: Band,
    pub zero_point: f64,
}

/// Round a correction to the precision stored in stamp headers.
pub fn round_correction(value: f64) -> f64 {
    let scale = 10f64.powi(ZP_CORRECTION_DECIMALS);
    (value * scale).round() / scale
}

/// Writes `MAGZP` into the data stamps of an object. The correction surface
/// of a band is loaded the first time a stamp of that band is calibrated and
/// kept for the lifetime of the calibrator.
pub struct StampCalibrator {
    data_dir: PathBuf,
    /// `None` when only preloaded surfaces may be used.
    zpcorr_dir: Option<PathBuf>,
    extrapolation: GridExtrapolation,
    corrections: Mutex<ZeroPointCorrections>,
}

impl StampCalibrator {
    pub fn new(
        data_dir: impl Into<PathBuf>,
        zpcorr_dir: impl Into<PathBuf>,
        extrapolation: GridExtrapolation,
    ) -> Self {
        Self {
            data_dir: data_dir.into(),
            zpcorr_dir: Some(zpcorr_dir.into()),
            extrapolation,
            corrections: Mutex::new(ZeroPointCorrections::default()),
        }
    }

    /// Calibrator using already loaded correction surfaces.
    pub fn with_corrections(data_dir: impl Into<PathBuf>, corrections: ZeroPointCorrections) -> Self {
        Self {
            data_dir: data_dir.into(),
            zpcorr_dir: None,
            extrapolation: GridExtrapolation::default(),
            corrections: Mutex::new(corrections),
        }
    }

    /// Position correction of `band` at tile pixel (`x`, `y`).
    fn correction(&self, band: Band, x: f64, y: f64) -> Result<f64> {
        let mut corrections = self.corrections.lock().map_err(|_| {
            ScubesError::MissingCalibrationData("correction surfaces unavailable".into())
        })?;
        if let Some(dir) = &self.zpcorr_dir {
            corrections.load_band(dir, band, self.extrapolation)?;
        }
        corrections.evaluate(band, x, y)
    }

    /// Zero point of one stamp header: base value of its band plus the
    /// rounded position correction at (`X0TILE`, `Y0TILE`).
    pub fn zero_point(&self, table: &ZeroPointTable, path: &Path) -> Result<(Band, f64)> {
        let header = Stamp::read_header(path)?;
        let band = Band::from_code(require_str(&header, path, "FILTER")?)?;
        let x0 = require_f64(&header, path, "X0TILE")?;
        let y0 = require_f64(&header, path, "Y0TILE")?;
        let base = table.get(band)?;
        let correction = round_correction(self.correction(band, x0, y0)?);
        Ok((band, base + correction))
    }

    /// Calibrate every data stamp of `target`'s tile, rewriting `MAGZP` in
    /// place. Running it again with unchanged inputs writes the same values.
    pub fn calibrate(&self, layout: &ArtifactLayout, target: &Target) -> Result<Vec<CalibratedStamp>> {
        let stamps = layout.data_stamps(target)?;
        if stamps.is_empty() {
            return Err(ScubesError::StampNotFound(format!(
                "no data stamps for {} in {}",
                target.name,
                layout.object_dir(target).display()
            )));
        }

        let table = ZeroPointTable::load(&self.data_dir, &target.tile)?;
        let mut written = Vec::with_capacity(stamps.len());
        for path in stamps {
            let (band, zero_point) = self.zero_point(&table, &path)?;
            update_stamp_header(&path, |h| {
                h.set_with_comment(MAGZP_KEY, zero_point, MAGZP_COMMENT);
            })?;
            debug!(object = %target.name, band = %band, zero_point, "Calibrated stamp");
            written.push(CalibratedStamp {
                path,
                band,
                zero_point,
            });
        }
        info!(object = %target.name, stamps = written.len(), "Stamps calibrated");
        Ok(written)
    }
}
