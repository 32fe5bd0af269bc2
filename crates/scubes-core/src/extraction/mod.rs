pub mod background;
pub mod builtin;
pub mod catalog;
pub mod components;
pub mod sextractor;

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::stamp::Stamp;

pub use builtin::BuiltinExtractor;
pub use catalog::{catalog_from_table, catalog_table, CatalogEntry, Extraction, CATALOG_COLUMNS};
pub use sextractor::{SExtractor, SExtractorSettings};

/// Detection stamp handed to a [`SourceExtractor`].
pub struct DetectionImage<'a> {
    /// Stamp file on disk.
    pub path: &'a Path,
    pub stamp: &'a Stamp,
}

/// Source detection and segmentation of a detection stamp.
pub trait SourceExtractor: Send + Sync {
    fn extract_sources(&self, image: &DetectionImage<'_>) -> Result<Extraction>;
}

/// Which extractor the pipeline runs.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExtractorBackend {
    /// External `sex`/`sextractor` executable.
    #[default]
    SExtractor,
    /// In-process threshold and moments detector.
    Builtin,
}

impl std::fmt::Display for ExtractorBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SExtractor => write!(f, "SExtractor"),
            Self::Builtin => write!(f, "Builtin"),
        }
    }
}
