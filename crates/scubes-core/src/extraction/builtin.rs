use ndarray::Array2;
use tracing::debug;

use crate::consts::{
    BACKGROUND_CLIP_ITERATIONS, BACKGROUND_CLIP_SIGMA, DETECT_MINAREA, DETECT_THRESH,
    MAG_ZEROPOINT, PIXEL_SCALE_ARCSEC, SIGMA_TO_FWHM,
};
use crate::error::Result;

use super::background::sigma_clipped_stats;
use super::catalog::{CatalogEntry, Extraction};
use super::components::label_components;
use super::{DetectionImage, SourceExtractor};

/// In-process detector: sigma-clipped sky, threshold, 8-connected
/// components and flux-weighted moments.
///
/// The stellarity score compares each source's FWHM with the seeing
/// (`PSFFWHM` of the detection stamp, or the median source FWHM when absent)
/// and penalises elongation.
#[derive(Clone, Debug)]
pub struct BuiltinExtractor {
    /// Detection threshold in units of the sky RMS.
    pub threshold: f64,
    pub min_area: usize,
    /// Arcseconds per pixel, used to convert `PSFFWHM`.
    pub pixel_scale: f64,
}

impl Default for BuiltinExtractor {
    fn default() -> Self {
        Self {
            threshold: DETECT_THRESH,
            min_area: DETECT_MINAREA,
            pixel_scale: PIXEL_SCALE_ARCSEC,
        }
    }
}

/// Running sums of one component.
#[derive(Clone, Copy, Default)]
struct Moments {
    area: usize,
    flux: f64,
    sx: f64,
    sy: f64,
    sxx: f64,
    syy: f64,
    sxy: f64,
}

impl Moments {
    fn add(&mut self, x: f64, y: f64, w: f64) {
        self.area += 1;
        self.flux += w;
        self.sx += w * x;
        self.sy += w * y;
        self.sxx += w * x * x;
        self.syy += w * y * y;
        self.sxy += w * x * y;
    }
}

/// Shape of a source from its second moments: (x, y, a, b, theta_deg).
fn shape(m: &Moments) -> (f64, f64, f64, f64, f64) {
    let x = m.sx / m.flux;
    let y = m.sy / m.flux;
    // Pixel quantisation keeps single-pixel sources from collapsing.
    let x2 = (m.sxx / m.flux - x * x).max(0.0) + 1.0 / 12.0;
    let y2 = (m.syy / m.flux - y * y).max(0.0) + 1.0 / 12.0;
    let xy = m.sxy / m.flux - x * y;
    let mid = (x2 + y2) / 2.0;
    let diff = (((x2 - y2) / 2.0).powi(2) + xy * xy).sqrt();
    let a = (mid + diff).sqrt();
    let b = (mid - diff).max(0.0).sqrt();
    let theta = 0.5 * (2.0 * xy).atan2(x2 - y2);
    (x, y, a, b, theta.to_degrees())
}

/// Stellarity in [0, 1] from the FWHM ratio to the seeing and the
/// ellipticity.
fn stellarity(fwhm: f64, seeing: f64, ellipticity: f64) -> f64 {
    if seeing <= 0.0 {
        return 0.5;
    }
    let excess = (fwhm / seeing - 1.0).max(0.0);
    ((-2.0 * excess * excess).exp() * (1.0 - ellipticity)).clamp(0.0, 1.0)
}

fn median(values: &mut [f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_unstable_by(f64::total_cmp);
    let mid = values.len() / 2;
    Some(if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    })
}

impl SourceExtractor for BuiltinExtractor {
    fn extract_sources(&self, image: &DetectionImage<'_>) -> Result<Extraction> {
        let data = &image.stamp.data;
        let (h, w) = data.dim();
        let (sky, rms) = sigma_clipped_stats(data, BACKGROUND_CLIP_SIGMA, BACKGROUND_CLIP_ITERATIONS);
        debug!(sky, rms, "Detection image background");

        let level = sky + self.threshold * rms;
        let mask = data.mapv(|v| v.is_finite() && v > level && rms > 0.0);
        let labeling = label_components(&mask);

        let mut moments = vec![Moments::default(); labeling.components.len()];
        for row in 0..h {
            for col in 0..w {
                let label = labeling.labels[[row, col]];
                if label > 0 {
                    moments[label as usize - 1].add(col as f64, row as f64, data[[row, col]] - sky);
                }
            }
        }

        // Old label -> catalog number (0 = dropped).
        let mut renumber = vec![0u32; moments.len() + 1];
        let mut rows = Vec::new();
        for (i, m) in moments.iter().enumerate() {
            if m.area < self.min_area || m.flux <= 0.0 {
                continue;
            }
            let (x, y, a, b, theta) = shape(m);
            let fwhm = SIGMA_TO_FWHM * (a * b).sqrt();
            rows.push((i, x, y, a, b, theta, fwhm, m.flux));
        }

        let seeing = image
            .stamp
            .header
            .get_f64("PSFFWHM")
            .map(|arcsec| arcsec / self.pixel_scale)
            .or_else(|| median(&mut rows.iter().map(|r| r.6).collect::<Vec<_>>()))
            .unwrap_or(0.0);

        let mut catalog = Vec::with_capacity(rows.len());
        for (i, x, y, a, b, theta, fwhm, flux) in rows {
            let number = catalog.len() as u32 + 1;
            renumber[i + 1] = number;

            let scale = (a * b).sqrt().max(f64::EPSILON);
            let mut weighted_r = 0.0;
            let (r0, r1, c0, c1) = labeling.components[i].bbox;
            for row in r0..=r1 {
                for col in c0..=c1 {
                    if labeling.labels[[row, col]] as usize == i + 1 {
                        let r = (col as f64 - x).hypot(row as f64 - y);
                        weighted_r += r * (data[[row, col]] - sky);
                    }
                }
            }
            let ellipticity = if a > 0.0 { 1.0 - b / a } else { 0.0 };
            catalog.push(CatalogEntry {
                number,
                x,
                y,
                kron_radius: weighted_r / flux / scale,
                ellipticity,
                theta,
                a,
                b,
                mag_auto: MAG_ZEROPOINT - 2.5 * flux.log10(),
                fwhm,
                class_star: stellarity(fwhm, seeing, ellipticity),
            });
        }

        let segmentation: Array2<u32> = labeling.labels.mapv(|l| renumber[l as usize]);
        debug!(sources = catalog.len(), "Builtin extraction done");
        Ok(Extraction {
            catalog,
            segmentation,
        })
    }
}
