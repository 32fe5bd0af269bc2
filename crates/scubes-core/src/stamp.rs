use std::fmt;
use std::io::ErrorKind;
use std::path::Path;

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::error::{Result, ScubesError};
use crate::io::fits::{Bitpix, FitsFile, Hdu, ImageData};
use crate::io::fits_header::Header;
use crate::io::fits_writer::{update_header, write_hdus};

/// Per-band stamp flavour.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StampKind {
    /// Science image (`swp`).
    Data,
    /// Inverse-variance weight image (`swpweight`).
    Weight,
}

impl StampKind {
    pub const ALL: [StampKind; 2] = [StampKind::Data, StampKind::Weight];

    /// Suffix used in tile and stamp file names.
    pub fn suffix(self) -> &'static str {
        match self {
            StampKind::Data => "swp",
            StampKind::Weight => "swpweight",
        }
    }
}

impl fmt::Display for StampKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.suffix())
    }
}

/// A single cutout: pixels plus the header of its image extension.
#[derive(Clone, Debug, PartialEq)]
pub struct Stamp {
    pub data: Array2<f64>,
    pub header: Header,
}

impl Stamp {
    pub fn new(data: Array2<f64>, header: Header) -> Self {
        Self { data, header }
    }

    pub fn height(&self) -> usize {
        self.data.nrows()
    }

    pub fn width(&self) -> usize {
        self.data.ncols()
    }

    /// True when every pixel is exactly zero (cutouts off the tile footprint).
    pub fn is_blank(&self) -> bool {
        self.data.iter().all(|&v| v == 0.0)
    }

    /// Read the first image extension of a stamp file.
    pub fn read(path: &Path) -> Result<Self> {
        let mut file = open_stamp(path)?;
        let index = image_index(&file)?;
        let hdu = file.read_hdu(index)?;
        let data = hdu.physical_array2()?;
        Ok(Self {
            data,
            header: hdu.header.without_structure(),
        })
    }

    /// Read only the header of the first image extension.
    pub fn read_header(path: &Path) -> Result<Header> {
        let file = open_stamp(path)?;
        let index = image_index(&file)?;
        Ok(file.header(index)?.without_structure())
    }

    /// Write as an empty primary HDU followed by a float32 image extension.
    pub fn write(&self, path: &Path) -> Result<()> {
        self.write_as(path, Bitpix::F32)
    }

    pub fn write_as(&self, path: &Path, bitpix: Bitpix) -> Result<()> {
        let mut header = self.header.clone();
        header.remove("BSCALE");
        header.remove("BZERO");
        let hdus = [
            Hdu::empty(Header::new()),
            Hdu::image(header, ImageData::from_array2(bitpix, &self.data)),
        ];
        write_hdus(path, &hdus)
    }
}

/// Edit the header of a stamp's image extension in place.
pub fn update_stamp_header<F>(path: &Path, edit: F) -> Result<()>
where
    F: FnOnce(&mut Header),
{
    let index = image_index(&open_stamp(path)?)?;
    update_header(path, index, edit)
}

fn open_stamp(path: &Path) -> Result<FitsFile> {
    FitsFile::open(path).map_err(|e| match e {
        ScubesError::Io(io) if io.kind() == ErrorKind::NotFound => {
            ScubesError::StampNotFound(path.display().to_string())
        }
        other => other,
    })
}

fn image_index(file: &FitsFile) -> Result<usize> {
    file.first_image().ok_or_else(|| {
        ScubesError::InvalidFits(format!("{} has no image HDU", file.path().display()))
    })
}

/// Numeric header value or `MissingHeaderKey`.
pub fn require_f64(header: &Header, path: &Path, key: &str) -> Result<f64> {
    header
        .get_f64(key)
        .ok_or_else(|| ScubesError::MissingHeaderKey {
            path: path.to_path_buf(),
            key: key.to_string(),
        })
}

/// String header value or `MissingHeaderKey`.
pub fn require_str<'a>(header: &'a Header, path: &Path, key: &str) -> Result<&'a str> {
    header
        .get_str(key)
        .ok_or_else(|| ScubesError::MissingHeaderKey {
            path: path.to_path_buf(),
            key: key.to_string(),
        })
}
