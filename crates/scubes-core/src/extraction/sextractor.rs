use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Command;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::consts::{DEFAULT_BACK_SIZE, DEFAULT_SATUR_LEVEL};
use crate::error::{Result, ScubesError};
use crate::io::fits::FitsFile;

use super::catalog::{CatalogEntry, Extraction, CATALOG_COLUMNS};
use super::{DetectionImage, SourceExtractor};

/// Run configuration that does not depend on the image.
const FIXED_CONFIG: &[(&str, &str)] = &[
    ("DETECT_TYPE", "CCD"),
    ("DETECT_MINAREA", "4"),
    ("DETECT_THRESH", "1.1"),
    ("ANALYSIS_THRESH", "3.0"),
    ("DEBLEND_NTHRESH", "64"),
    ("DEBLEND_MINCONT", "0.0002"),
    ("CLEAN", "Y"),
    ("CLEAN_PARAM", "1.0"),
    ("MASK_TYPE", "CORRECT"),
    ("PHOT_APERTURES", "5.45454545"),
    ("PHOT_AUTOPARAMS", "3.0,1.82"),
    ("PHOT_PETROPARAMS", "2.0,2.73"),
    ("PHOT_FLUXFRAC", "0.2,0.5,0.7,0.9"),
    ("MAG_ZEROPOINT", "20"),
    ("MAG_GAMMA", "4.0"),
    ("PIXEL_SCALE", "0.55"),
    ("BACK_FILTERSIZE", "7"),
    ("BACKPHOTO_TYPE", "LOCAL"),
    ("BACKPHOTO_THICK", "48"),
    ("CHECKIMAGE_TYPE", "SEGMENTATION"),
    ("CATALOG_TYPE", "ASCII_HEAD"),
];

/// User-adjustable part of the SExtractor run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SExtractorSettings {
    pub executable: PathBuf,
    /// Convolution filter (e.g. `tophat_3.0_3x3.conv`); filtering is off
    /// when unset.
    pub filter_name: Option<PathBuf>,
    /// Neural network weights for CLASS_STAR (`default.nnw`).
    pub starnnw_name: Option<PathBuf>,
    /// Use 1600 for ellipticals.
    pub satur_level: f64,
    /// Background mesh size: 54 for ellipticals, 256 for spirals.
    pub back_size: usize,
}

impl Default for SExtractorSettings {
    fn default() -> Self {
        Self {
            executable: PathBuf::from("sextractor"),
            filter_name: None,
            starnnw_name: None,
            satur_level: DEFAULT_SATUR_LEVEL,
            back_size: DEFAULT_BACK_SIZE,
        }
    }
}

/// Scratch files of one run, next to the detection stamp. They are removed
/// when the run ends, whether or not it succeeded.
struct RunFiles {
    params: PathBuf,
    catalog: PathBuf,
    segmentation: PathBuf,
}

impl RunFiles {
    fn for_image(path: &Path) -> Self {
        Self {
            params: path.with_extension("param"),
            catalog: path.with_extension("cat"),
            segmentation: path.with_extension("seg.fits"),
        }
    }
}

impl Drop for RunFiles {
    fn drop(&mut self) {
        for path in [&self.params, &self.catalog, &self.segmentation] {
            if let Err(e) = fs::remove_file(path) {
                if e.kind() != ErrorKind::NotFound {
                    warn!(path = %path.display(), error = %e, "Could not remove SExtractor scratch file");
                }
            }
        }
    }
}

/// External SExtractor runner.
#[derive(Clone, Debug, Default)]
pub struct SExtractor {
    pub settings: SExtractorSettings,
}

impl SExtractor {
    pub fn new(settings: SExtractorSettings) -> Self {
        Self { settings }
    }

    /// Command-line configuration for an image with the given gain and
    /// seeing (arcsec).
    pub fn arguments(
        &self,
        image: &Path,
        gain: f64,
        seeing: f64,
        params: &Path,
        catalog: &Path,
        segmentation: &Path,
    ) -> Vec<String> {
        let mut args = vec![image.display().to_string()];
        let mut set = |key: &str, value: String| {
            args.push(format!("-{key}"));
            args.push(value);
        };
        for (key, value) in FIXED_CONFIG {
            set(key, value.to_string());
        }
        match &self.settings.filter_name {
            Some(f) => {
                set("FILTER", "Y".into());
                set("FILTER_NAME", f.display().to_string());
            }
            None => set("FILTER", "N".into()),
        }
        if let Some(nnw) = &self.settings.starnnw_name {
            set("STARNNW_NAME", nnw.display().to_string());
        }
        set("SATUR_LEVEL", self.settings.satur_level.to_string());
        set("BACK_SIZE", self.settings.back_size.to_string());
        set("GAIN", gain.to_string());
        set("SEEING_FWHM", seeing.to_string());
        set("PARAMETERS_NAME", params.display().to_string());
        set("CATALOG_NAME", catalog.display().to_string());
        set("CHECKIMAGE_NAME", segmentation.display().to_string());
        args
    }
}

impl SourceExtractor for SExtractor {
    fn extract_sources(&self, image: &DetectionImage<'_>) -> Result<Extraction> {
        let header = &image.stamp.header;
        let gain = header.get_f64("GAIN").ok_or_else(|| ScubesError::MissingHeaderKey {
            path: image.path.to_path_buf(),
            key: "GAIN".into(),
        })?;
        let seeing = header.get_f64("PSFFWHM").ok_or_else(|| ScubesError::MissingHeaderKey {
            path: image.path.to_path_buf(),
            key: "PSFFWHM".into(),
        })?;

        let files = RunFiles::for_image(image.path);
        fs::write(&files.params, CATALOG_COLUMNS.join("\n") + "\n")?;
        let args = self.arguments(
            image.path,
            gain,
            seeing,
            &files.params,
            &files.catalog,
            &files.segmentation,
        );
        debug!(exe = %self.settings.executable.display(), args = ?args, "Running SExtractor");

        let output = Command::new(&self.settings.executable)
            .args(&args)
            .output()
            .map_err(|e| {
                ScubesError::ExtractionFailed(format!(
                    "could not run {}: {e}",
                    self.settings.executable.display()
                ))
            })?;
        if !output.status.success() {
            return Err(ScubesError::ExtractionFailed(format!(
                "{} exited with {}: {}",
                self.settings.executable.display(),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let catalog = parse_ascii_head(&fs::read_to_string(&files.catalog)?)?;
        let mut seg_file = FitsFile::open(&files.segmentation)?;
        let index = seg_file.first_image().ok_or_else(|| {
            ScubesError::ExtractionFailed("segmentation image is empty".into())
        })?;
        let segmentation = seg_file
            .read_hdu(index)?
            .physical_array2()?
            .mapv(|v| v.max(0.0) as u32);

        Ok(Extraction {
            catalog,
            segmentation,
        })
    }
}

/// Parse an `ASCII_HEAD` catalog. Positions are converted to 0-based pixels.
pub fn parse_ascii_head(text: &str) -> Result<Vec<CatalogEntry>> {
    let mut columns: HashMap<String, usize> = HashMap::new();
    let mut entries = Vec::new();

    for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
        if let Some(rest) = line.strip_prefix('#') {
            let mut parts = rest.split_whitespace();
            if let (Some(index), Some(name)) = (parts.next(), parts.next()) {
                if let Ok(index) = index.parse::<usize>() {
                    columns.insert(name.to_string(), index.saturating_sub(1));
                }
            }
            continue;
        }

        let fields: Vec<&str> = line.split_whitespace().collect();
        let get = |name: &str| -> Result<f64> {
            let idx = *columns.get(name).ok_or_else(|| {
                ScubesError::ExtractionFailed(format!("catalog lacks column {name}"))
            })?;
            fields
                .get(idx)
                .and_then(|f| f.parse::<f64>().ok())
                .ok_or_else(|| ScubesError::ExtractionFailed(format!("bad {name} value in: {line}")))
        };

        entries.push(CatalogEntry {
            number: get("NUMBER")? as u32,
            x: get("X_IMAGE")? - 1.0,
            y: get("Y_IMAGE")? - 1.0,
            kron_radius: get("KRON_RADIUS")?,
            ellipticity: get("ELLIPTICITY")?,
            theta: get("THETA_IMAGE")?,
            a: get("A_IMAGE")?,
            b: get("B_IMAGE")?,
            mag_auto: get("MAG_AUTO")?,
            fwhm: get("FWHM_IMAGE")?,
            class_star: get("CLASS_STAR")?,
        });
    }
    Ok(entries)
}
