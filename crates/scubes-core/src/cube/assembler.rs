use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use ndarray::{stack, Array2, Array3, Axis};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::acquisition::{StampMaker, StampSource};
use crate::artifacts::ArtifactLayout;
use crate::bands::Band;
use crate::calibration::{StampCalibrator, MAGZP_KEY};
use crate::consts::{DEFAULT_FLUX_SCALE, FLAM_UNIT, PARALLEL_BAND_THRESHOLD, REQUIRED_STAMP_COUNT};
use crate::error::{Result, ScubesError};
use crate::io::fits::{Bitpix, Hdu, ImageData};
use crate::io::fits_header::{Header, Value};
use crate::io::fits_writer::write_hdus;
use crate::mask::{run_refine_loop, FinalMask, MaskBuilder, RefineOutcome, RefinePrompt};
use crate::pipeline::types::{PipelineStage, ProgressReporter};
use crate::stamp::{require_f64, Stamp, StampKind};
use crate::target::Target;
use crate::wcs::Wcs;

use super::flux::{FluxConversion, UncertaintyModel};
use super::metadata::band_metadata;

/// Keywords of the first stamp header that do not carry over to the cube.
const PER_BAND_KEYS: &[&str] = &["FILTER", MAGZP_KEY, "NCOMBINE", "EFFTIME", "GAIN", "PSFFWHM"];

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CubeOptions {
    /// Flux density represented by one stored unit (`BSCALE`).
    pub flux_scale: f64,
    pub include_mask: bool,
    pub uncertainty: UncertaintyModel,
    /// Stamp files (data and weight) expected before assembly.
    pub required_stamps: usize,
    /// Cut the detection stamp even when no mask is requested.
    pub build_detection: bool,
}

impl Default for CubeOptions {
    fn default() -> Self {
        Self {
            flux_scale: DEFAULT_FLUX_SCALE,
            include_mask: true,
            uncertainty: UncertaintyModel::default(),
            required_stamps: REQUIRED_STAMP_COUNT,
            build_detection: true,
        }
    }
}

/// Redshift fields of the DATA header. Values that parse as numbers are
/// written as floats, anything else verbatim.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Redshifts {
    pub spec_z: String,
    pub phot_z: String,
}

fn redshift_value(text: &str) -> Value {
    match text.trim().parse::<f64>() {
        Ok(z) => Value::Float(z),
        Err(_) => Value::Text(text.to_string()),
    }
}

/// What an assembly run did.
#[derive(Clone, Debug, PartialEq)]
pub enum AssemblyOutcome {
    Written {
        path: PathBuf,
        bands: Vec<Band>,
        has_errors: bool,
        has_mask: bool,
    },
    /// The cube already existed and no rebuild was requested.
    Skipped(PathBuf),
    /// Mask refinement was quit; nothing was written.
    Aborted,
}

/// Flux (and optional uncertainty) of one band in storage units.
struct BandLayers {
    flux: Array2<f64>,
    error: Option<Array2<f64>>,
}

/// Builds the cube of one target from its stamps.
pub struct CubeAssembler<'a> {
    layout: &'a ArtifactLayout,
    source: &'a dyn StampSource,
    calibrator: &'a StampCalibrator,
    masks: &'a MaskBuilder<'a>,
    bands: Vec<Band>,
    options: CubeOptions,
}

impl<'a> CubeAssembler<'a> {
    pub fn new(
        layout: &'a ArtifactLayout,
        source: &'a dyn StampSource,
        calibrator: &'a StampCalibrator,
        masks: &'a MaskBuilder<'a>,
        bands: &[Band],
        options: CubeOptions,
    ) -> Self {
        Self {
            layout,
            source,
            calibrator,
            masks,
            bands: bands.to_vec(),
            options,
        }
    }

    pub fn options(&self) -> &CubeOptions {
        &self.options
    }

    /// Assemble and write the cube of `target`.
    ///
    /// An existing cube is left alone unless `rebuild` is set. Missing stamps
    /// trigger one acquisition attempt; missing zero points trigger
    /// calibration. When a mask is requested and none exists, `prompt` drives
    /// the refinement; quitting there writes nothing.
    pub fn assemble(
        &self,
        target: &Target,
        redshifts: &Redshifts,
        rebuild: bool,
        prompt: &mut dyn RefinePrompt,
        reporter: &Arc<dyn ProgressReporter>,
    ) -> Result<AssemblyOutcome> {
        let cube_path = self.layout.cube(target);
        if cube_path.exists() && !rebuild {
            info!(object = %target.name, path = %cube_path.display(), "Cube exists, skipping");
            return Ok(AssemblyOutcome::Skipped(cube_path));
        }
        if self.bands.is_empty() {
            return Err(ScubesError::InvalidUserInput("no bands selected".into()));
        }

        self.ensure_stamps(target, reporter)?;
        if self.options.include_mask || self.options.build_detection {
            self.ensure_detection(target, reporter)?;
        }

        let data_paths: Vec<PathBuf> = self
            .bands
            .iter()
            .map(|&b| self.layout.stamp(target, b, StampKind::Data))
            .collect();
        let headers = self.calibrated_headers(target, &data_paths, reporter)?;

        let weight_paths: Vec<PathBuf> = self
            .bands
            .iter()
            .map(|&b| self.layout.stamp(target, b, StampKind::Weight))
            .collect();
        let has_errors = weight_paths.iter().all(|p| p.is_file());
        debug!(object = %target.name, has_errors, "Weight stamps checked");

        let wcs = Wcs::from_header(&headers[0])?;
        let layers = self.convert(&data_paths, &weight_paths, &headers, has_errors, reporter)?;
        let metadata = band_metadata(&self.bands, &headers);

        let mask = if self.options.include_mask {
            match self.load_or_refine_mask(target, prompt, reporter)? {
                Some(mask) => Some(mask),
                None => return Ok(AssemblyOutcome::Aborted),
            }
        } else {
            None
        };

        reporter.begin_stage(PipelineStage::Writing, None);
        let base = cube_header(&headers[0], &wcs, self.options.flux_scale);
        let mut hdus = vec![Hdu::empty(Header::new())];

        let flux_views: Vec<_> = layers.iter().map(|l| l.flux.view()).collect();
        let flux: Array3<f64> = stack(Axis(0), &flux_views)
            .map_err(|e| ScubesError::InvalidFits(format!("stamps differ in shape: {e}")))?;
        let mut data_header = base.clone();
        data_header.set_with_comment("EXTNAME", "DATA", "Name of the extension");
        data_header.set_with_comment("SPECZ", redshift_value(&redshifts.spec_z), "Spectroscopic redshift");
        data_header.set_with_comment("PHOTZ", redshift_value(&redshifts.phot_z), "Photometric redshift");
        hdus.push(Hdu::image(data_header, ImageData::from_array3(Bitpix::F64, &flux)));

        if has_errors {
            let error_views: Vec<_> = layers.iter().filter_map(|l| l.error.as_ref()).map(|e| e.view()).collect();
            let errors: Array3<f64> = stack(Axis(0), &error_views)
                .map_err(|e| ScubesError::InvalidFits(format!("weight stamps differ in shape: {e}")))?;
            let mut error_header = base;
            error_header.set_with_comment("EXTNAME", "ERRORS", "Name of the extension");
            hdus.push(Hdu::image(error_header, ImageData::from_array3(Bitpix::F64, &errors)));
        }

        let has_mask = mask.is_some();
        if let Some(mask) = mask {
            if mask.data.dim() != (flux.dim().1, flux.dim().2) {
                return Err(ScubesError::InvalidFits(format!(
                    "mask shape {:?} does not match stamps {:?}",
                    mask.data.dim(),
                    (flux.dim().1, flux.dim().2)
                )));
            }
            let mut hdu = mask.to_hdu();
            hdu.header.set_with_comment("EXTNAME", "MASK", "Boolean mask of the galaxy");
            hdus.push(hdu);
        }

        let mut table_header = Header::new();
        table_header.set("EXTNAME", "METADATA");
        hdus.push(Hdu::table(table_header, metadata));

        write_hdus(&cube_path, &hdus)?;
        reporter.finish_stage();
        info!(object = %target.name, path = %cube_path.display(), bands = self.bands.len(), has_errors, has_mask, "Cube written");

        Ok(AssemblyOutcome::Written {
            path: cube_path,
            bands: self.bands.clone(),
            has_errors,
            has_mask,
        })
    }

    fn required_stamps(&self) -> usize {
        self.options
            .required_stamps
            .min(StampKind::ALL.len() * self.bands.len())
    }

    /// Make sure enough stamp files exist, acquiring them once if not.
    fn ensure_stamps(&self, target: &Target, reporter: &Arc<dyn ProgressReporter>) -> Result<()> {
        let required = self.required_stamps();
        let found = self.layout.count_stamps(target, &self.bands);
        if found >= required {
            return Ok(());
        }

        warn!(object = %target.name, found, required, "Stamps missing, acquiring");
        reporter.begin_stage(PipelineStage::Acquiring, Some(self.bands.len() * StampKind::ALL.len()));
        let report = StampMaker::new(self.source, self.layout).make_stamps(target, &self.bands, true)?;
        reporter.finish_stage();
        debug!(written = report.written.len(), skipped = report.skipped.len(), "Acquisition finished");

        let found = self.layout.count_stamps(target, &self.bands);
        if found < required {
            return Err(ScubesError::IncompleteStampSet { found, required });
        }
        Ok(())
    }

    fn ensure_detection(&self, target: &Target, reporter: &Arc<dyn ProgressReporter>) -> Result<PathBuf> {
        reporter.begin_stage(PipelineStage::Detecting, None);
        let path = StampMaker::new(self.source, self.layout)
            .make_detection(target, false)
            .map_err(|e| match e {
                ScubesError::TileNotFound(_) | ScubesError::CutoutOutOfBounds { .. } => {
                    ScubesError::MissingDetectionImage(self.layout.detection(target))
                }
                other => other,
            })?;
        reporter.finish_stage();
        Ok(path)
    }

    /// Data stamp headers in band order, calibrating the object first if any
    /// lacks a zero point.
    fn calibrated_headers(
        &self,
        target: &Target,
        paths: &[PathBuf],
        reporter: &Arc<dyn ProgressReporter>,
    ) -> Result<Vec<Header>> {
        let headers = read_headers(paths)?;
        if headers.iter().all(|h| h.contains(MAGZP_KEY)) {
            return Ok(headers);
        }
        reporter.begin_stage(PipelineStage::Calibrating, Some(paths.len()));
        self.calibrator.calibrate(self.layout, target)?;
        reporter.finish_stage();

        let headers = read_headers(paths)?;
        for (h, p) in headers.iter().zip(paths) {
            require_f64(h, p, MAGZP_KEY)?;
        }
        Ok(headers)
    }

    /// Read the stamps in band order, then convert them to flux.
    fn convert(
        &self,
        data_paths: &[PathBuf],
        weight_paths: &[PathBuf],
        headers: &[Header],
        has_errors: bool,
        reporter: &Arc<dyn ProgressReporter>,
    ) -> Result<Vec<BandLayers>> {
        let mut inputs = Vec::with_capacity(self.bands.len());
        for (i, &band) in self.bands.iter().enumerate() {
            let counts = Stamp::read(&data_paths[i])?.data;
            let weights = if has_errors {
                let gain = require_f64(&headers[i], &data_paths[i], "GAIN")?;
                Some((Stamp::read(&weight_paths[i])?.data, gain))
            } else {
                None
            };
            let zp = require_f64(&headers[i], &data_paths[i], MAGZP_KEY)?;
            let conversion = FluxConversion::new(zp, band.wave_eff(), self.options.flux_scale);
            debug!(band = %band, zero_point = zp, factor = conversion.factor(), "Flux conversion");
            inputs.push((conversion, counts, weights));
        }

        reporter.begin_stage(PipelineStage::Converting, Some(inputs.len()));
        let counter = AtomicUsize::new(0);
        let model = self.options.uncertainty;
        let one = |(conversion, counts, weights): &(FluxConversion, Array2<f64>, Option<(Array2<f64>, f64)>)| {
            let layers = BandLayers {
                flux: conversion.flam(counts),
                error: weights
                    .as_ref()
                    .map(|(w, gain)| conversion.uncertainty(counts, w, *gain, model)),
            };
            let done = counter.fetch_add(1, Ordering::Relaxed) + 1;
            reporter.advance(done);
            layers
        };
        let layers: Vec<BandLayers> = if inputs.len() >= PARALLEL_BAND_THRESHOLD {
            inputs.par_iter().map(one).collect()
        } else {
            inputs.iter().map(one).collect()
        };
        reporter.finish_stage();
        Ok(layers)
    }

    /// Existing mask, or a freshly refined one. `None` when refinement was
    /// quit.
    fn load_or_refine_mask(
        &self,
        target: &Target,
        prompt: &mut dyn RefinePrompt,
        reporter: &Arc<dyn ProgressReporter>,
    ) -> Result<Option<FinalMask>> {
        let mask_path = self.layout.mask(target);
        if mask_path.is_file() {
            debug!(path = %mask_path.display(), "Using existing mask");
            return FinalMask::read(&mask_path).map(Some);
        }

        reporter.begin_stage(PipelineStage::Extracting, None);
        let session = self.masks.propose(target)?;
        reporter.finish_stage();

        reporter.begin_stage(PipelineStage::Refining, None);
        let outcome = run_refine_loop(session, prompt)?;
        reporter.finish_stage();
        match outcome {
            RefineOutcome::Accepted(mask) => {
                mask.write(&mask_path)?;
                info!(path = %mask_path.display(), masked = mask.masked_pixels(), "Mask saved");
                Ok(Some(mask))
            }
            RefineOutcome::Aborted => {
                warn!(object = %target.name, "Refinement quit, no cube written");
                Ok(None)
            }
        }
    }
}

fn read_headers(paths: &[PathBuf]) -> Result<Vec<Header>> {
    paths.iter().map(|p| Stamp::read_header(p)).collect()
}

/// Shared header of the flux-bearing layers.
fn cube_header(first: &Header, wcs: &Wcs, flux_scale: f64) -> Header {
    let mut header = first.clone();
    for key in PER_BAND_KEYS {
        header.remove(key);
    }
    header.remove("EXTNAME");
    wcs.apply_to(&mut header, true);
    header.set_with_comment("BSCALE", flux_scale, "Linear factor in scaling equation");
    header.set_with_comment("BZERO", 0i64, "Zero point in scaling equation");
    header.set_with_comment("BUNIT", FLAM_UNIT, "Physical units of the array values");
    header
}
