/// Length of one FITS header card.
pub const FITS_CARD_SIZE: usize = 80;

/// Survey pixel scale in arcseconds per pixel.
pub const PIXEL_SCALE_ARCSEC: f64 = 0.55;

/// AB magnitude offset: `m_AB = -2.5 log10(f_nu) - 48.6` with `f_nu` in
/// erg s^-1 cm^-2 Hz^-1.
pub const AB_MAGNITUDE_OFFSET: f64 = 48.6;

/// Speed of light in Angstrom per second.
pub const SPEED_OF_LIGHT_ANGSTROM_PER_S: f64 = 2.997_924_58e18;

/// Physical unit of the flux-bearing cube layers.
pub const FLAM_UNIT: &str = "erg / (Angstrom cm2 s)";

/// Default storage scale factor for the cube flux layers (BSCALE).
pub const DEFAULT_FLUX_SCALE: f64 = 1e-19;

/// Number of per-band stamp files (data and weight for twelve bands) an
/// object needs before a cube is attempted.
pub const REQUIRED_STAMP_COUNT: usize = 24;

/// Lower edge of the zero-point correction grid in tile pixels.
pub const ZP_GRID_MIN: f64 = 0.0;

/// Upper edge of the zero-point correction grid in tile pixels.
pub const ZP_GRID_MAX: f64 = 9200.0;

/// Number of bins per axis of the correction grid (nodes = bins + 1).
pub const ZP_GRID_BINS: usize = 16;

/// Decimal digits kept from the correction-surface value.
pub const ZP_CORRECTION_DECIMALS: i32 = 5;

/// Default stellarity threshold above which a source is proposed for masking.
pub const DEFAULT_CLASS_STAR: f64 = 0.8;

/// Exclusion circle radius in units of the source FWHM over the pixel scale.
pub const DEFAULT_EXCLUSION_RADIUS_FACTOR: f64 = 3.0;

/// Scale applied to the object's angular-size radius before clipping.
pub const DEFAULT_ANGSIZE_SCALE: f64 = 1.1;

/// SExtractor saturation level (use 1600 for ellipticals).
pub const DEFAULT_SATUR_LEVEL: f64 = 1600.0;

/// SExtractor background mesh size (54 for ellipticals, 256 for spirals).
pub const DEFAULT_BACK_SIZE: usize = 54;

/// Detection threshold in units of the background RMS.
pub const DETECT_THRESH: f64 = 1.1;

/// Minimum number of connected pixels above threshold for a detection.
pub const DETECT_MINAREA: usize = 4;

/// Magnitude zero point of extraction catalogs (instrumental scale).
pub const MAG_ZEROPOINT: f64 = 20.0;

/// Sigma-clipping rejection threshold used to estimate the sky level.
pub const BACKGROUND_CLIP_SIGMA: f64 = 3.0;

/// Iterations of sigma clipping for the sky estimate.
pub const BACKGROUND_CLIP_ITERATIONS: usize = 5;

/// Conversion from Gaussian sigma to FWHM.
pub const SIGMA_TO_FWHM: f64 = 2.354_820_045;

/// Minimum stamp-file count handled by rayon per-band parallelism.
pub const PARALLEL_BAND_THRESHOLD: usize = 4;

/// Lupton composite parameters used for the REFINE preview.
pub const LUPTON_MINIMUM: f64 = -0.01;
pub const LUPTON_Q: f64 = 20.0;
pub const LUPTON_STRETCH: f64 = 0.9;

/// Display range of the detection image in the REFINE preview.
pub const PREVIEW_VMIN: f64 = -0.1;
pub const PREVIEW_VMAX: f64 = 3.5;
