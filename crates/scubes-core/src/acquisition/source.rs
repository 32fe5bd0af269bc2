use crate::bands::Band;
use crate::error::Result;
use crate::stamp::{Stamp, StampKind};
use crate::target::Target;

/// Where per-band and detection cutouts come from.
///
/// Implementations return the cutout with a complete stamp header; writing
/// it to disk is left to [`super::StampMaker`].
pub trait StampSource: Send + Sync {
    /// Cutout of one band image around the target.
    fn fetch_cutout(&self, target: &Target, band: Band, kind: StampKind) -> Result<Stamp>;

    /// Cutout of the filter-independent detection image around the target.
    fn fetch_detection(&self, target: &Target) -> Result<Stamp>;
}
