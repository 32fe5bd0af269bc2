use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::bands::Band;
use crate::error::Result;
use crate::stamp::StampKind;
use crate::target::Target;

/// File naming of every artifact the pipeline reads or writes. All files of
/// an object live in `work_dir/<object>/`.
#[derive(Clone, Debug)]
pub struct ArtifactLayout {
    work_dir: PathBuf,
}

impl ArtifactLayout {
    pub fn new(work_dir: impl Into<PathBuf>) -> Self {
        Self {
            work_dir: work_dir.into(),
        }
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    pub fn object_dir(&self, target: &Target) -> PathBuf {
        self.work_dir.join(&target.name)
    }

    /// `{object}_{tile}_{size}x{size}`
    fn stem(target: &Target) -> String {
        format!("{0}_{1}_{2}x{2}", target.name, target.tile, target.size)
    }

    fn product(&self, target: &Target, suffix: &str) -> PathBuf {
        self.object_dir(target)
            .join(format!("{}_{suffix}", Self::stem(target)))
    }

    /// `{object}_{tile}_{band}_{size}x{size}_{kind}.fits`
    pub fn stamp(&self, target: &Target, band: Band, kind: StampKind) -> PathBuf {
        self.object_dir(target).join(format!(
            "{0}_{1}_{2}_{3}x{3}_{4}.fits",
            target.name,
            target.tile,
            band.code(),
            target.size,
            kind.suffix()
        ))
    }

    pub fn detection(&self, target: &Target) -> PathBuf {
        self.product(target, "det_scimas.fits")
    }

    pub fn mask(&self, target: &Target) -> PathBuf {
        self.product(target, "mask.fits")
    }

    pub fn cube(&self, target: &Target) -> PathBuf {
        self.product(target, "cube.fits")
    }

    pub fn segmentation(&self, target: &Target) -> PathBuf {
        self.product(target, "segmentation.fits")
    }

    pub fn catalog(&self, target: &Target) -> PathBuf {
        self.product(target, "sexcat.fits")
    }

    /// Mask refinement preview (colour composite beside detection image).
    pub fn mask_preview(&self, target: &Target) -> PathBuf {
        self.product(target, "maskMosaic.png")
    }

    /// Number of stamp files (data and weight) of `bands` present for the
    /// target's tile and size.
    pub fn count_stamps(&self, target: &Target, bands: &[Band]) -> usize {
        bands
            .iter()
            .flat_map(|&band| StampKind::ALL.map(|kind| self.stamp(target, band, kind)))
            .filter(|path| path.is_file())
            .count()
    }

    /// Data stamps of the target's tile, any size, sorted by name.
    pub fn data_stamps(&self, target: &Target) -> Result<Vec<PathBuf>> {
        let prefix = format!("{}_{}_", target.name, target.tile);
        let suffix = format!("_{}.fits", StampKind::Data.suffix());
        let entries = match fs::read_dir(self.object_dir(target)) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut paths = Vec::new();
        for entry in entries {
            let entry = entry?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name.starts_with(&prefix) && name.ends_with(&suffix) {
                paths.push(entry.path());
            }
        }
        paths.sort();
        Ok(paths)
    }
}
