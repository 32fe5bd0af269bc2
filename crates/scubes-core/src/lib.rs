pub mod acquisition;
pub mod artifacts;
pub mod bands;
pub mod calibration;
pub mod consts;
pub mod cube;
pub mod error;
pub mod extraction;
pub mod io;
pub mod mask;
pub mod pipeline;
pub mod stamp;
pub mod target;
pub mod wcs;
