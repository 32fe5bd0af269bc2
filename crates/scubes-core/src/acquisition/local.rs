use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::bands::Band;
use crate::error::{Result, ScubesError};
use crate::io::fits::FitsFile;
use crate::io::fits_header::{Card, Header};
use crate::stamp::{Stamp, StampKind};
use crate::target::Target;
use crate::wcs::Wcs;

use super::cutout::{cut, Cutout};
use super::source::StampSource;

/// Header keywords copied verbatim from the tile into every stamp.
const COPIED_KEYS: &[&str] = &[
    "OBJECT", "FILTER", "EXPTIME", "GAIN", "TELESCOP", "INSTRUME", "AIRMASS", "DATE-OBS",
];

/// Keyword of the tile's mean seeing.
const TILE_FWHM_KEY: &str = "OAJ PRO FWHMMEAN";

/// Default file extensions tried, in order, for band images.
const BAND_EXTENSIONS: &[&str] = &[".fits", ".fits.fz", ".fz"];

/// Default file extensions tried, in order, for the detection image.
const DETECTION_EXTENSIONS: &[&str] = &[".fits", ".fits.fz"];

/// Result of looking for one candidate file.
pub enum Probe {
    /// No file at this path; the next candidate may be tried.
    Absent(PathBuf),
    Found(FitsFile),
}

/// Open `path`, reporting plain absence as [`Probe::Absent`]. Any other
/// failure (permissions, corrupt header) is returned as an error.
/// Tile-compressed files open like plain ones.
pub fn probe(path: &Path) -> Result<Probe> {
    match FitsFile::open(path) {
        Ok(file) => Ok(Probe::Found(file)),
        Err(ScubesError::Io(e)) if e.kind() == ErrorKind::NotFound => {
            Ok(Probe::Absent(path.to_path_buf()))
        }
        Err(e) => Err(e),
    }
}

/// Stamps cut from survey tiles on the local file system.
///
/// For tile `T` the images are looked up as `T_<band>_<kind><ext>` and
/// `T_det_scimas<ext>`, first in `tiles_dir/T/` and then in `tiles_dir/`,
/// trying each extension in order.
#[derive(Clone, Debug)]
pub struct LocalTileSource {
    tiles_dir: PathBuf,
    band_extensions: Vec<String>,
    detection_extensions: Vec<String>,
}

impl LocalTileSource {
    pub fn new(tiles_dir: impl Into<PathBuf>) -> Self {
        Self {
            tiles_dir: tiles_dir.into(),
            band_extensions: BAND_EXTENSIONS.iter().map(|s| s.to_string()).collect(),
            detection_extensions: DETECTION_EXTENSIONS.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Replace the extension list used for band images.
    pub fn with_band_extensions(mut self, extensions: &[&str]) -> Self {
        self.band_extensions = extensions.iter().map(|s| s.to_string()).collect();
        self
    }

    fn candidates(&self, tile: &str, stem: &str, extensions: &[String]) -> Vec<PathBuf> {
        let dirs = [self.tiles_dir.join(tile), self.tiles_dir.clone()];
        dirs.iter()
            .flat_map(|dir| extensions.iter().map(move |ext| dir.join(format!("{stem}{ext}"))))
            .collect()
    }

    /// Candidate paths of a band image, in lookup order.
    pub fn band_candidates(&self, tile: &str, band: Band, kind: StampKind) -> Vec<PathBuf> {
        let stem = format!("{tile}_{}_{}", band.code(), kind.suffix());
        self.candidates(tile, &stem, &self.band_extensions)
    }

    /// Candidate paths of the detection image, in lookup order.
    pub fn detection_candidates(&self, tile: &str) -> Vec<PathBuf> {
        let stem = format!("{tile}_det_scimas");
        self.candidates(tile, &stem, &self.detection_extensions)
    }

    fn open_first(&self, candidates: Vec<PathBuf>, what: &str) -> Result<FitsFile> {
        for path in candidates {
            match probe(&path)? {
                Probe::Found(file) => {
                    debug!(path = %path.display(), "Using tile image");
                    return Ok(file);
                }
                Probe::Absent(path) => debug!(path = %path.display(), "Tile candidate absent"),
            }
        }
        Err(ScubesError::TileNotFound(what.to_string()))
    }

    fn cut_stamp(&self, file: &mut FitsFile, target: &Target) -> Result<(Header, Cutout)> {
        let index = image_hdu(file)?;
        let header = file.header(index)?.clone();
        let wcs = Wcs::from_header(&header)?;
        let cutout = cut(file, index, &wcs, &target.position, target.size)?;
        Ok((header, cutout))
    }
}

/// Index of the HDU holding the tile pixels: the primary HDU for plain
/// tiles, the first extension for `.fz` files.
fn image_hdu(file: &FitsFile) -> Result<usize> {
    file.first_image().ok_or_else(|| {
        ScubesError::InvalidFits(format!("{} has no image data", file.path().display()))
    })
}

/// Stamp header built from the tile header and cutout geometry.
pub fn stamp_header(
    tile_header: &Header,
    target: &Target,
    band: Option<Band>,
    kind: StampKind,
    cutout: &Cutout,
) -> Header {
    let mut header = Header::new();
    for key in COPIED_KEYS {
        if let Some(value) = tile_header.get(key) {
            match tile_header.comment(key) {
                Some(c) => header.set_with_comment(key, value.clone(), c),
                None => header.set(key, value.clone()),
            }
        }
    }
    if let (Some(band), false) = (band, header.contains("FILTER")) {
        header.set("FILTER", band.code());
    }

    let tile_name = tile_header
        .get_str("OBJECT")
        .unwrap_or(&target.tile)
        .to_string();
    header.set("TILE", tile_name);
    header.set("OBJECT", target.name.as_str());

    if kind == StampKind::Data && band.is_some() {
        if let Some(n) = tile_header.get("NCOMBINE") {
            header.set_with_comment("NCOMBINE", n.clone(), "Number of combined images");
        }
        if let Some(t) = tile_header.get("EFECTIME") {
            header.set_with_comment("EFFTIME", t.clone(), "Effective exposed total time");
        }
    }
    if let Some(fwhm) = tile_header.get(TILE_FWHM_KEY) {
        header.set("PSFFWHM", fwhm.clone());
    }

    header.set_with_comment("X0TILE", cutout.center.0 + 1.0, "Location in tile");
    header.set_with_comment("Y0TILE", cutout.center.1 + 1.0, "Location in tile");
    for card in cutout.wcs.to_cards() {
        push_or_replace(&mut header, card);
    }
    header
}

fn push_or_replace(header: &mut Header, card: Card) {
    header.remove(&card.keyword);
    header.push(card);
}

impl StampSource for LocalTileSource {
    fn fetch_cutout(&self, target: &Target, band: Band, kind: StampKind) -> Result<Stamp> {
        let what = format!("{} {} {}", target.tile, band, kind);
        let mut file = self.open_first(self.band_candidates(&target.tile, band, kind), &what)?;
        let (tile_header, cutout) = self.cut_stamp(&mut file, target)?;
        let header = stamp_header(&tile_header, target, Some(band), kind, &cutout);
        Ok(Stamp::new(cutout.data, header))
    }

    fn fetch_detection(&self, target: &Target) -> Result<Stamp> {
        let what = format!("{} detection image", target.tile);
        let mut file = self.open_first(self.detection_candidates(&target.tile), &what)?;
        let (tile_header, cutout) = self.cut_stamp(&mut file, target)?;
        let header = stamp_header(&tile_header, target, None, StampKind::Data, &cutout);
        Ok(Stamp::new(cutout.data, header))
    }
}
