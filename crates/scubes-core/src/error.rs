use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScubesError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid FITS file: {0}")]
    InvalidFits(String),

    #[error("FITS I/O error: {0}")]
    Fits(#[from] fitsio::errors::Error),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Header keyword {key} missing in {path}")]
    MissingHeaderKey { path: PathBuf, key: String },

    #[error("Missing calibration data: {0}")]
    MissingCalibrationData(String),

    #[error("No stamps found: {0}")]
    StampNotFound(String),

    #[error("Detection image not found: {}", .0.display())]
    MissingDetectionImage(PathBuf),

    #[error("Incomplete stamp set: found {found} of {required} required stamps")]
    IncompleteStampSet { found: usize, required: usize },

    #[error("Invalid user input: {0}")]
    InvalidUserInput(String),

    #[error("Source extraction failed: {0}")]
    ExtractionFailed(String),

    #[error("Invalid sky coordinate: {0}")]
    InvalidCoordinate(String),

    #[error("Unknown band: {0}")]
    UnknownBand(String),

    #[error("No tile image found for {0}")]
    TileNotFound(String),

    #[error("Cutout of {size}x{size} pixels at ({x:.1}, {y:.1}) does not overlap the tile")]
    CutoutOutOfBounds { x: f64, y: f64, size: usize },

    #[error("Image format error: {0}")]
    ImageError(#[from] image::ImageError),
}

pub type Result<T> = std::result::Result<T, ScubesError>;
