use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use image::{Rgb, RgbImage};
use ndarray::Array2;
use tracing::{debug, info};

use crate::artifacts::ArtifactLayout;
use crate::bands::{Band, ColorGroup};
use crate::consts::{LUPTON_MINIMUM, LUPTON_Q, LUPTON_STRETCH, PREVIEW_VMAX, PREVIEW_VMIN};
use crate::error::{Result, ScubesError};
use crate::io::image_io::{draw_circle, grey_image, save_png, side_by_side};
use crate::stamp::{Stamp, StampKind};
use crate::target::Target;

use super::builder::MaskGeometry;

const CIRCLE_COLOR: Rgb<u8> = Rgb([0, 200, 0]);
const CLIP_COLOR: Rgb<u8> = Rgb([230, 230, 0]);

/// Asinh colour composite of three channels (Lupton et al. 2004).
///
/// `minimum` is subtracted from every channel; `q` softens the asinh and
/// `stretch` sets the linear range. Row 0 of the inputs is the bottom row of
/// the image.
pub fn lupton_rgb(
    red: &Array2<f64>,
    green: &Array2<f64>,
    blue: &Array2<f64>,
    minimum: f64,
    q: f64,
    stretch: f64,
) -> Result<RgbImage> {
    if red.dim() != green.dim() || red.dim() != blue.dim() {
        return Err(ScubesError::InvalidUserInput(format!(
            "colour channels differ in shape: {:?} {:?} {:?}",
            red.dim(),
            green.dim(),
            blue.dim()
        )));
    }
    const MAX: f64 = 255.0;
    let slope = 0.1 * MAX / (0.1 * q).asinh();
    let soften = q / stretch;

    let (h, w) = red.dim();
    let mut img = RgbImage::new(w as u32, h as u32);
    for row in 0..h {
        for col in 0..w {
            let mut c = [
                red[[row, col]] - minimum,
                green[[row, col]] - minimum,
                blue[[row, col]] - minimum,
            ];
            let intensity = (c[0] + c[1] + c[2]) / 3.0;
            let fac = if intensity > 0.0 && intensity.is_finite() {
                (intensity * soften).asinh() * slope / intensity
            } else {
                0.0
            };
            for v in &mut c {
                *v = (*v * fac).max(0.0);
            }
            let peak = c[0].max(c[1]).max(c[2]);
            if peak >= MAX {
                for v in &mut c {
                    *v *= MAX / peak;
                }
            }
            let px = Rgb([c[0].min(MAX) as u8, c[1].min(MAX) as u8, c[2].min(MAX) as u8]);
            img.put_pixel(col as u32, (h - 1 - row) as u32, px);
        }
    }
    Ok(img)
}

/// Sum of the data stamps of one colour group.
fn group_sum(layout: &ArtifactLayout, target: &Target, group: ColorGroup) -> Result<Array2<f64>> {
    let mut sum: Option<Array2<f64>> = None;
    for band in Band::ALL.into_iter().filter(|b| b.color_group() == group) {
        let stamp = Stamp::read(&layout.stamp(target, band, StampKind::Data))?;
        sum = Some(match sum {
            Some(acc) if acc.dim() == stamp.data.dim() => acc + &stamp.data,
            Some(acc) => {
                return Err(ScubesError::InvalidUserInput(format!(
                    "stamp {band} has shape {:?}, expected {:?}",
                    stamp.data.dim(),
                    acc.dim()
                )))
            }
            None => stamp.data,
        });
    }
    sum.ok_or_else(|| ScubesError::StampNotFound(format!("no bands in group {group:?}")))
}

/// Colour composite of a target's data stamps.
pub fn color_composite(layout: &ArtifactLayout, target: &Target) -> Result<RgbImage> {
    let red = group_sum(layout, target, ColorGroup::Red)?;
    let green = group_sum(layout, target, ColorGroup::Green)?;
    let blue = group_sum(layout, target, ColorGroup::Blue)?;
    lupton_rgb(&red, &green, &blue, LUPTON_MINIMUM, LUPTON_Q, LUPTON_STRETCH)
}

/// Refinement figure: colour composite (when the stamps allow one) beside
/// the detection image, both overlaid with the active exclusion circles and
/// the clipping radius.
#[derive(Clone, Debug)]
pub struct MaskPreview {
    path: PathBuf,
    composite: Option<RgbImage>,
    detection: RgbImage,
}

impl MaskPreview {
    pub fn new(layout: &ArtifactLayout, target: &Target, detection: &Array2<f64>) -> Self {
        let composite = match color_composite(layout, target) {
            Ok(img) => Some(img),
            Err(e) => {
                debug!(object = %target.name, error = %e, "No colour composite for preview");
                None
            }
        };
        Self {
            path: layout.mask_preview(target),
            composite,
            detection: grey_image(detection, PREVIEW_VMIN, PREVIEW_VMAX),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn overlay(base: &RgbImage, geometry: &MaskGeometry, keep: &BTreeSet<usize>) -> RgbImage {
        let mut img = base.clone();
        if let Some(r) = geometry.clip_radius {
            draw_circle(&mut img, geometry.center.0, geometry.center.1, r, CLIP_COLOR);
        }
        for c in geometry.circles.iter().filter(|c| !keep.contains(&c.index)) {
            draw_circle(&mut img, c.x, c.y, c.radius, CIRCLE_COLOR);
        }
        img
    }

    pub fn render(&self, geometry: &MaskGeometry, keep: &BTreeSet<usize>) -> RgbImage {
        let right = Self::overlay(&self.detection, geometry, keep);
        match &self.composite {
            Some(rgb) => side_by_side(&Self::overlay(rgb, geometry, keep), &right),
            None => right,
        }
    }

    /// Render and write the PNG, returning its path.
    pub fn save(&self, geometry: &MaskGeometry, keep: &BTreeSet<usize>) -> Result<&Path> {
        if let Some(dir) = self.path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        save_png(&self.render(geometry, keep), &self.path)?;
        info!(path = %self.path.display(), "Saved mask preview");
        Ok(&self.path)
    }
}
