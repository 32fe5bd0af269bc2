use ndarray::Array2;

use crate::error::{Result, ScubesError};
use crate::io::fits::FitsFile;
use crate::wcs::{SkyPosition, Wcs};

/// A square window cut from a larger image.
#[derive(Clone, Debug)]
pub struct Cutout {
    pub data: Array2<f64>,
    /// WCS of the cutout (reference pixel shifted to the window).
    pub wcs: Wcs,
    /// 0-based parent pixel of the cutout's pixel (0, 0).
    pub origin: (i64, i64),
    /// 0-based parent pixel of the requested sky position.
    pub center: (f64, f64),
}

/// First parent pixel of a `size`-pixel window centered on `center`.
pub fn window_start(center: f64, size: usize) -> i64 {
    (center - size as f64 / 2.0).ceil() as i64
}

/// Cut a `size` x `size` window centered on `position` out of image HDU
/// `hdu`. Parts of the window outside the image are zero-filled; a window
/// that misses the image entirely is an error.
pub fn cut(
    file: &mut FitsFile,
    hdu: usize,
    wcs: &Wcs,
    position: &SkyPosition,
    size: usize,
) -> Result<Cutout> {
    let (x, y) = wcs.world_to_pixel(position)?;
    let Some(&[height, width]) = file.image_shape(hdu) else {
        return Err(ScubesError::InvalidFits(format!(
            "{} HDU {hdu} is not a 2-D image",
            file.path().display()
        )));
    };

    let x0 = window_start(x, size);
    let y0 = window_start(y, size);
    let n = size as i64;
    if x0 + n <= 0 || y0 + n <= 0 || x0 >= width as i64 || y0 >= height as i64 {
        return Err(ScubesError::CutoutOutOfBounds { x, y, size });
    }

    let data = file.read_window(hdu, x0, y0, size, size)?;
    Ok(Cutout {
        data,
        wcs: wcs.shifted(x0, y0),
        origin: (x0, y0),
        center: (x, y),
    })
}
