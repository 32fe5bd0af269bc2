pub mod cutout;
pub mod local;
pub mod maker;
pub mod source;

pub use cutout::{cut, window_start, Cutout};
pub use local::{probe, stamp_header, LocalTileSource, Probe};
pub use maker::{AcquisitionReport, SkipReason, StampMaker};
pub use source::StampSource;
