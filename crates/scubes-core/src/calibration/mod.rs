pub mod calibrator;
pub mod corrections;
pub mod spline;
pub mod zero_points;

pub use calibrator::{round_correction, CalibratedStamp, StampCalibrator, MAGZP_KEY};
pub use corrections::{grid_nodes, ZeroPointCorrections};
pub use spline::{BicubicSpline, CubicSpline, GridExtrapolation};
pub use zero_points::ZeroPointTable;
