use ndarray::{Array2, Zip};
use serde::{Deserialize, Serialize};

use crate::consts::{AB_MAGNITUDE_OFFSET, SPEED_OF_LIGHT_ANGSTROM_PER_S};

/// How pixel uncertainties are derived from weights and counts.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum UncertaintyModel {
    /// `sqrt(1/w + max(counts, 0)/gain)`
    #[default]
    StdDev,
    /// `1/w + max(counts, 0)/gain`, without the square root.
    Variance,
}

impl std::fmt::Display for UncertaintyModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::StdDev => write!(f, "StdDev"),
            Self::Variance => write!(f, "Variance"),
        }
    }
}

/// Counts to stored flux density for one band.
///
/// `f0 = 10^(-0.4 (48.6 + zp))` turns counts into f_nu (erg/s/cm²/Hz);
/// multiplying by `c / λ²` gives f_lambda (erg/s/cm²/Å), which is stored
/// divided by `flux_scale`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FluxConversion {
    pub zero_point: f64,
    /// Effective wavelength in Ångström.
    pub wave_eff: f64,
    pub flux_scale: f64,
}

impl FluxConversion {
    pub fn new(zero_point: f64, wave_eff: f64, flux_scale: f64) -> Self {
        Self {
            zero_point,
            wave_eff,
            flux_scale,
        }
    }

    pub fn f0(&self) -> f64 {
        10f64.powf(-0.4 * (AB_MAGNITUDE_OFFSET + self.zero_point))
    }

    /// Stored value of one count.
    pub fn factor(&self) -> f64 {
        self.f0() * SPEED_OF_LIGHT_ANGSTROM_PER_S / (self.wave_eff * self.wave_eff) / self.flux_scale
    }

    pub fn flam(&self, counts: &Array2<f64>) -> Array2<f64> {
        let factor = self.factor();
        counts.mapv(|v| v * factor)
    }

    /// Uncertainty of [`FluxConversion::flam`] from the weight (inverse
    /// variance) map. A zero weight gives an infinite uncertainty.
    pub fn uncertainty(
        &self,
        counts: &Array2<f64>,
        weights: &Array2<f64>,
        gain: f64,
        model: UncertaintyModel,
    ) -> Array2<f64> {
        let factor = self.factor();
        let mut out = Array2::<f64>::zeros(counts.dim());
        Zip::from(&mut out)
            .and(counts)
            .and(weights)
            .for_each(|o, &d, &w| {
                let var = 1.0 / w + d.max(0.0) / gain;
                let err = match model {
                    UncertaintyModel::StdDev => var.sqrt(),
                    UncertaintyModel::Variance => var,
                };
                *o = err * factor;
            });
        out
    }
}
