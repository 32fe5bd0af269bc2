use std::path::PathBuf;

use tracing::{info, warn};

use crate::artifacts::ArtifactLayout;
use crate::bands::Band;
use crate::error::{Result, ScubesError};
use crate::stamp::StampKind;
use crate::target::Target;

use super::source::StampSource;

/// Why a stamp was not written.
#[derive(Clone, Debug, PartialEq)]
pub enum SkipReason {
    /// Every pixel of the cutout is zero.
    Blank,
    /// The tile image for this band is not available.
    TileMissing(String),
    /// The target falls outside the tile.
    OutOfBounds,
}

/// Summary of one acquisition pass.
#[derive(Clone, Debug, Default)]
pub struct AcquisitionReport {
    pub written: Vec<PathBuf>,
    pub existing: usize,
    pub skipped: Vec<(Band, StampKind, SkipReason)>,
}

/// Writes stamps fetched from a [`StampSource`] into the artifact layout.
pub struct StampMaker<'a> {
    source: &'a dyn StampSource,
    layout: &'a ArtifactLayout,
}

impl<'a> StampMaker<'a> {
    pub fn new(source: &'a dyn StampSource, layout: &'a ArtifactLayout) -> Self {
        Self { source, layout }
    }

    /// Cut and save data and weight stamps for every band. Existing files are
    /// kept unless `redo` is set. Bands whose tile image is missing, or whose
    /// cutout is blank or off the tile, are skipped and reported.
    pub fn make_stamps(&self, target: &Target, bands: &[Band], redo: bool) -> Result<AcquisitionReport> {
        let mut report = AcquisitionReport::default();
        for kind in StampKind::ALL {
            for &band in bands {
                let path = self.layout.stamp(target, band, kind);
                if path.exists() && !redo {
                    report.existing += 1;
                    continue;
                }
                let stamp = match self.source.fetch_cutout(target, band, kind) {
                    Ok(stamp) => stamp,
                    Err(ScubesError::TileNotFound(what)) => {
                        warn!(object = %target.name, band = %band, kind = %kind, "Tile image not found");
                        report.skipped.push((band, kind, SkipReason::TileMissing(what)));
                        continue;
                    }
                    Err(ScubesError::CutoutOutOfBounds { .. }) => {
                        warn!(object = %target.name, band = %band, kind = %kind, "Target outside tile");
                        report.skipped.push((band, kind, SkipReason::OutOfBounds));
                        continue;
                    }
                    Err(e) => return Err(e),
                };
                if stamp.is_blank() {
                    warn!(object = %target.name, band = %band, kind = %kind, "Blank cutout skipped");
                    report.skipped.push((band, kind, SkipReason::Blank));
                    continue;
                }
                stamp.write(&path)?;
                info!(path = %path.display(), "Saved stamp");
                report.written.push(path);
            }
        }
        Ok(report)
    }

    /// Cut and save the detection stamp unless it already exists (or `redo`).
    pub fn make_detection(&self, target: &Target, redo: bool) -> Result<PathBuf> {
        let path = self.layout.detection(target);
        if path.exists() && !redo {
            return Ok(path);
        }
        let stamp = self.source.fetch_detection(target)?;
        stamp.write(&path)?;
        info!(path = %path.display(), "Saved detection stamp");
        Ok(path)
    }
}
