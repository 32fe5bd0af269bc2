use std::collections::BTreeSet;
use std::path::PathBuf;

use ndarray::Array2;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::artifacts::ArtifactLayout;
use crate::consts::{
    DEFAULT_ANGSIZE_SCALE, DEFAULT_CLASS_STAR, DEFAULT_EXCLUSION_RADIUS_FACTOR,
    PIXEL_SCALE_ARCSEC,
};
use crate::error::{Result, ScubesError};
use crate::extraction::background::percentile;
use crate::extraction::{catalog_table, CatalogEntry, DetectionImage, Extraction, SourceExtractor};
use crate::io::fits::{Bitpix, Hdu, ImageData};
use crate::io::fits_header::Header;
use crate::io::fits_writer::write_hdus;
use crate::stamp::Stamp;
use crate::target::Target;
use crate::wcs::Wcs;

use super::preview::MaskPreview;
use super::session::MaskSession;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaskParams {
    /// Sources with a stellarity strictly above this are masked.
    pub class_star: f64,
    /// Exclusion radius in units of FWHM / pixel scale.
    pub radius_factor: f64,
    /// Arcseconds per pixel.
    pub pixel_scale: f64,
    /// Multiplier applied to the target's angular radius.
    pub angsize_scale: f64,
    /// Also drop pixels fainter than the absolute value of this percentile
    /// of the detection image.
    pub sky_floor_percentile: Option<f64>,
    /// Write the colour/detection preview while refining.
    pub save_preview: bool,
}

impl Default for MaskParams {
    fn default() -> Self {
        Self {
            class_star: DEFAULT_CLASS_STAR,
            radius_factor: DEFAULT_EXCLUSION_RADIUS_FACTOR,
            pixel_scale: PIXEL_SCALE_ARCSEC,
            angsize_scale: DEFAULT_ANGSIZE_SCALE,
            sky_floor_percentile: None,
            save_preview: true,
        }
    }
}

/// Circle around a star-like source, in 0-based pixels.
#[derive(Clone, Debug, PartialEq)]
pub struct ExclusionCircle {
    /// 1-based index shown to the user and used in keep lists.
    pub index: usize,
    pub x: f64,
    pub y: f64,
    pub radius: f64,
}

impl ExclusionCircle {
    pub fn contains(&self, x: f64, y: f64) -> bool {
        (x - self.x).hypot(y - self.y) <= self.radius
    }
}

/// Star-like sources of a catalog as exclusion circles, numbered from 1 in
/// catalog order.
pub fn exclusion_circles(catalog: &[CatalogEntry], params: &MaskParams) -> Vec<ExclusionCircle> {
    catalog
        .iter()
        .filter(|e| e.class_star > params.class_star)
        .enumerate()
        .map(|(i, e)| ExclusionCircle {
            index: i + 1,
            x: e.x,
            y: e.y,
            radius: params.radius_factor * e.fwhm / params.pixel_scale,
        })
        .collect()
}

/// Everything needed to rasterise a mask for a given keep list.
#[derive(Clone, Debug)]
pub struct MaskGeometry {
    /// (rows, cols)
    pub shape: (usize, usize),
    /// Target position in 0-based pixels (x, y).
    pub center: (f64, f64),
    /// Pixels farther than this from `center` are excluded.
    pub clip_radius: Option<f64>,
    pub circles: Vec<ExclusionCircle>,
    /// Pixels above the sky floor, when one is applied.
    pub floor: Option<Array2<bool>>,
}

impl MaskGeometry {
    /// 1 = keep, 0 = excluded. Circles whose index is in `keep` do not
    /// exclude anything.
    pub fn render(&self, keep: &BTreeSet<usize>) -> Array2<u8> {
        let active: Vec<&ExclusionCircle> = self
            .circles
            .iter()
            .filter(|c| !keep.contains(&c.index))
            .collect();
        Array2::from_shape_fn(self.shape, |(row, col)| {
            let (x, y) = (col as f64, row as f64);
            if let Some(r) = self.clip_radius {
                if (x - self.center.0).hypot(y - self.center.1) > r {
                    return 0;
                }
            }
            if let Some(floor) = &self.floor {
                if !floor[[row, col]] {
                    return 0;
                }
            }
            if active.iter().any(|c| c.contains(x, y)) {
                0
            } else {
                1
            }
        })
    }
}

/// Detection stamp with its WCS and the target's pixel position.
#[derive(Clone, Debug)]
pub struct Detection {
    pub path: PathBuf,
    pub stamp: Stamp,
    pub wcs: Wcs,
    pub center: (f64, f64),
}

/// Runs DETECT, EXTRACT and PROPOSE for one target and hands the result to a
/// [`MaskSession`] for refinement.
pub struct MaskBuilder<'a> {
    layout: &'a ArtifactLayout,
    extractor: &'a dyn SourceExtractor,
    params: MaskParams,
}

impl<'a> MaskBuilder<'a> {
    pub fn new(layout: &'a ArtifactLayout, extractor: &'a dyn SourceExtractor, params: MaskParams) -> Self {
        Self {
            layout,
            extractor,
            params,
        }
    }

    pub fn params(&self) -> &MaskParams {
        &self.params
    }

    /// Load the detection stamp and project the target onto it.
    pub fn detect(&self, target: &Target) -> Result<Detection> {
        let path = self.layout.detection(target);
        if !path.is_file() {
            return Err(ScubesError::MissingDetectionImage(path));
        }
        let stamp = Stamp::read(&path)?;
        let wcs = Wcs::from_header(&stamp.header)?;
        let center = wcs.world_to_pixel(&target.position)?;
        debug!(object = %target.name, x = center.0, y = center.1, "Target position on detection stamp");
        Ok(Detection {
            path,
            stamp,
            wcs,
            center,
        })
    }

    /// Run the extractor and persist its catalog and segmentation map.
    pub fn extract(&self, target: &Target, detection: &Detection) -> Result<Extraction> {
        let extraction = self.extractor.extract_sources(&DetectionImage {
            path: &detection.path,
            stamp: &detection.stamp,
        })?;
        info!(object = %target.name, sources = extraction.catalog.len(), "Sources extracted");

        let mut cat_header = Header::new();
        cat_header.set("EXTNAME", "LDAC_OBJECTS");
        write_hdus(
            &self.layout.catalog(target),
            &[
                Hdu::empty(Header::new()),
                Hdu::table(cat_header, catalog_table(&extraction.catalog)),
            ],
        )?;

        let mut seg_header = Header::new();
        detection.wcs.apply_to(&mut seg_header, false);
        let seg = extraction.segmentation.mapv(f64::from);
        write_hdus(
            &self.layout.segmentation(target),
            &[
                Hdu::empty(Header::new()),
                Hdu::image(seg_header, ImageData::from_array2(Bitpix::I32, &seg)),
            ],
        )?;
        Ok(extraction)
    }

    /// Exclusion geometry for a target from its detection and catalog.
    pub fn geometry(&self, target: &Target, detection: &Detection, catalog: &[CatalogEntry]) -> MaskGeometry {
        let data = &detection.stamp.data;
        let floor = self
            .params
            .sky_floor_percentile
            .and_then(|q| percentile(data, q))
            .map(|level| data.mapv(|v| v > level.abs()));
        MaskGeometry {
            shape: data.dim(),
            center: detection.center,
            clip_radius: target.angsize.map(|r| r * self.params.angsize_scale),
            circles: exclusion_circles(catalog, &self.params),
            floor,
        }
    }

    /// DETECT, EXTRACT and PROPOSE: a session holding the proposed
    /// exclusion circles with an empty keep list.
    pub fn propose(&self, target: &Target) -> Result<MaskSession> {
        let detection = self.detect(target)?;
        let extraction = self.extract(target, &detection)?;
        let geometry = self.geometry(target, &detection, &extraction.catalog);
        info!(object = %target.name, circles = geometry.circles.len(), "Exclusion circles proposed");

        let preview = if self.params.save_preview {
            Some(MaskPreview::new(self.layout, target, &detection.stamp.data))
        } else {
            None
        };
        Ok(MaskSession::new(
            &target.name,
            geometry,
            detection.stamp.header,
            preview,
        ))
    }
}
