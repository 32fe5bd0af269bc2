#![allow(dead_code)]

use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use ndarray::Array2;
use scubes_core::bands::Band;
use scubes_core::calibration::ZeroPointCorrections;
use scubes_core::error::{Result, ScubesError};
use scubes_core::extraction::{CatalogEntry, DetectionImage, Extraction, ExtractorBackend, SourceExtractor};
use scubes_core::io::fits_header::Header;
use scubes_core::io::npy::write_npy;
use scubes_core::pipeline::PipelineConfig;
use scubes_core::stamp::{Stamp, StampKind};
use scubes_core::target::{ObjectEntry, Target};
use scubes_core::wcs::{SkyPosition, Wcs};

pub const TILE: &str = "HYDRA-0045";
pub const RA: f64 = 150.0;
pub const DEC: f64 = -30.0;
pub const GAIN: f64 = 2.0;
/// Survey pixel scale in degrees.
pub const PIXEL_DEG: f64 = 0.55 / 3600.0;

/// Base zero point of the first band; each following band adds 0.1.
pub const BASE_ZP: f64 = 20.0;

pub fn base_zero_point(band: Band) -> f64 {
    let i = Band::ALL.iter().position(|&b| b == band).unwrap_or(0);
    BASE_ZP + 0.1 * i as f64
}

pub fn target(name: &str, size: usize) -> Target {
    Target {
        name: name.to_string(),
        position: SkyPosition::new(RA, DEC).unwrap(),
        tile: TILE.to_string(),
        size,
        angsize: None,
    }
}

pub fn object_entry(name: &str, size: usize) -> ObjectEntry {
    ObjectEntry {
        name: name.to_string(),
        ra: RA.to_string(),
        dec: DEC.to_string(),
        tile: TILE.to_string(),
        size,
        angsize: None,
        spec_z: "0.0046".to_string(),
        phot_z: "n/a".to_string(),
    }
}

/// TAN WCS of a `size` stamp centered on the test position.
pub fn stamp_wcs(size: usize) -> Wcs {
    let c = size as f64 / 2.0 + 0.5;
    Wcs::tan([RA, DEC], [c, c], PIXEL_DEG)
}

/// Header of a per-band stamp as a tile cutout would produce it.
pub fn band_header(band: Band, size: usize) -> Header {
    let mut h = Header::new();
    h.set("FILTER", band.code());
    h.set("EXPTIME", band.exptime() * 2.0);
    h.set("GAIN", GAIN);
    h.set("PSFFWHM", 1.1);
    h.set("DATE-OBS", "2019-11-02T03:12:40");
    h.set("TILE", TILE);
    h.set("X0TILE", 4600.0);
    h.set("Y0TILE", 4600.0);
    stamp_wcs(size).apply_to(&mut h, false);
    h
}

/// Alternating +amp / -amp pattern: zero mean, standard deviation `amp`.
pub fn checkerboard(rows: usize, cols: usize, amp: f64) -> Array2<f64> {
    Array2::from_shape_fn((rows, cols), |(r, c)| if (r + c) % 2 == 0 { amp } else { -amp })
}

pub fn add_gaussian(data: &mut Array2<f64>, x: f64, y: f64, sigma: f64, amp: f64) {
    for ((row, col), v) in data.indexed_iter_mut() {
        let d2 = (col as f64 - x).powi(2) + (row as f64 - y).powi(2);
        *v += amp * (-d2 / (2.0 * sigma * sigma)).exp();
    }
}

/// Detection image: faint sky with the galaxy at the center.
pub fn detection_image(size: usize) -> Array2<f64> {
    let mut data = checkerboard(size, size, 0.001);
    let c = (size as f64 - 1.0) / 2.0;
    add_gaussian(&mut data, c, c, 3.0, 5.0);
    data
}

/// Stamp source with constant counts and weights, standing in for tiles.
pub struct SyntheticSource {
    pub counts: f64,
    pub weight: f64,
    /// Bands whose tile images are missing.
    pub missing: Vec<Band>,
    pub with_weights: bool,
    pub with_detection: bool,
    pub fetches: Arc<AtomicUsize>,
}

impl SyntheticSource {
    pub fn new() -> Self {
        Self {
            counts: 10.0,
            weight: 4.0,
            missing: Vec::new(),
            with_weights: true,
            with_detection: true,
            fetches: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn without(mut self, band: Band) -> Self {
        self.missing.push(band);
        self
    }

    pub fn fetch_count(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.fetches)
    }
}

impl scubes_core::acquisition::StampSource for SyntheticSource {
    fn fetch_cutout(&self, target: &Target, band: Band, kind: StampKind) -> Result<Stamp> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if self.missing.contains(&band) || (kind == StampKind::Weight && !self.with_weights) {
            return Err(ScubesError::TileNotFound(format!("{TILE} {band} {kind}")));
        }
        let value = match kind {
            StampKind::Data => self.counts,
            StampKind::Weight => self.weight,
        };
        let size = target.size;
        Ok(Stamp::new(
            Array2::from_elem((size, size), value),
            band_header(band, size),
        ))
    }

    fn fetch_detection(&self, target: &Target) -> Result<Stamp> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if !self.with_detection {
            return Err(ScubesError::TileNotFound(format!("{TILE} detection image")));
        }
        let mut header = Header::new();
        header.set("OBJECT", target.name.as_str());
        header.set("TILE", TILE);
        header.set("GAIN", GAIN);
        stamp_wcs(target.size).apply_to(&mut header, false);
        Ok(Stamp::new(detection_image(target.size), header))
    }
}

/// Extractor returning a fixed catalog and an empty segmentation map.
pub struct FixedExtractor {
    pub catalog: Vec<CatalogEntry>,
}

impl SourceExtractor for FixedExtractor {
    fn extract_sources(&self, image: &DetectionImage<'_>) -> Result<Extraction> {
        Ok(Extraction {
            catalog: self.catalog.clone(),
            segmentation: Array2::zeros(image.stamp.data.dim()),
        })
    }
}

pub fn source(number: u32, x: f64, y: f64, fwhm: f64, class_star: f64) -> CatalogEntry {
    CatalogEntry {
        number,
        x,
        y,
        kron_radius: 3.5,
        ellipticity: 0.05,
        theta: 10.0,
        a: 1.5,
        b: 1.4,
        mag_auto: 17.0,
        fwhm,
        class_star,
    }
}

/// `{tile}_ZP.cat` with a `SPLUS_<band>` column per band.
pub fn write_zero_point_table(data_dir: &Path) {
    fs::create_dir_all(data_dir).unwrap();
    let names: Vec<String> = Band::ALL.iter().map(|b| format!("SPLUS_{}", b.code())).collect();
    let values: Vec<String> = Band::ALL.iter().map(|&b| format!("{:.2}", base_zero_point(b))).collect();
    let text = format!("# tile {}\n{TILE} {}\n", names.join(" "), values.join(" "));
    fs::write(data_dir.join(format!("{TILE}_ZP.cat")), text).unwrap();
}

/// Constant correction grids for every band.
pub fn write_correction_grids(dir: &Path, value: f64) {
    fs::create_dir_all(dir).unwrap();
    let grid = Array2::from_elem((17, 17), value);
    for band in Band::ALL {
        write_npy(&ZeroPointCorrections::path(dir, band), &grid).unwrap();
    }
}

/// Configuration rooted in `root` with calibration data in place.
pub fn test_config(root: &Path) -> PipelineConfig {
    let mut config = PipelineConfig::default();
    config.paths.work_dir = root.join("cubes");
    config.paths.data_dir = root.join("data");
    config.paths.zpcorr_dir = root.join("data/zpcorr");
    config.paths.tiles_dir = root.join("tiles");
    config.extraction.backend = ExtractorBackend::Builtin;
    config.mask.save_preview = false;
    write_zero_point_table(&config.paths.data_dir);
    write_correction_grids(&config.paths.zpcorr_dir, 0.0);
    config
}
