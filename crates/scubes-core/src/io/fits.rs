use std::path::{Path, PathBuf};

use fitsio::hdu::HduInfo;
use fitsio::images::ImageType;
use fitsio::tables::ColumnDataType;
use ndarray::{Array2, Array3};

use crate::error::{Result, ScubesError};

use super::fits_header::{Card, Header};
use super::fits_table::{BinTable, ColumnData};
use super::records;

/// Keywords of a tile-compressed image that describe the compression
/// rather than the image.
const COMPRESSION_KEYWORDS: &[&str] = &[
    "ZIMAGE", "ZCMPTYPE", "ZBITPIX", "ZNAXIS", "ZSIMPLE", "ZTENSION", "ZEXTEND", "ZBLOCKED",
    "ZPCOUNT", "ZGCOUNT", "ZHECKSUM", "ZDATASUM", "ZQUANTIZ", "ZDITHER0", "ZMASKCMP", "ZBLANK",
    "ZSCALE", "ZZERO", "THEAP",
];

const COMPRESSION_PREFIXES: &[&str] = &["ZNAXIS", "ZTILE", "ZNAME", "ZVAL"];

/// FITS pixel data type.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Bitpix {
    U8,
    I16,
    I32,
    I64,
    F32,
    F64,
}

impl Bitpix {
    pub fn code(self) -> i64 {
        match self {
            Self::U8 => 8,
            Self::I16 => 16,
            Self::I32 => 32,
            Self::I64 => 64,
            Self::F32 => -32,
            Self::F64 => -64,
        }
    }

    pub(crate) fn image_type(self) -> ImageType {
        match self {
            Self::U8 => ImageType::UnsignedByte,
            Self::I16 => ImageType::Short,
            Self::I32 => ImageType::Long,
            Self::I64 => ImageType::LongLong,
            Self::F32 => ImageType::Float,
            Self::F64 => ImageType::Double,
        }
    }

    fn from_image_type(image_type: &ImageType) -> Self {
        match image_type {
            ImageType::UnsignedByte | ImageType::Byte => Self::U8,
            ImageType::Short | ImageType::UnsignedShort => Self::I16,
            ImageType::Long | ImageType::UnsignedLong => Self::I32,
            ImageType::LongLong => Self::I64,
            ImageType::Float => Self::F32,
            ImageType::Double => Self::F64,
        }
    }
}

/// Image pixels in numpy axis order (slowest axis first), as stored:
/// BSCALE/BZERO are not applied.
#[derive(Clone, Debug, PartialEq)]
pub struct ImageData {
    pub bitpix: Bitpix,
    pub shape: Vec<usize>,
    pub pixels: Vec<f64>,
}

impl ImageData {
    pub fn from_array2(bitpix: Bitpix, data: &Array2<f64>) -> Self {
        Self {
            bitpix,
            shape: data.shape().to_vec(),
            pixels: data.iter().copied().collect(),
        }
    }

    pub fn from_array3(bitpix: Bitpix, data: &Array3<f64>) -> Self {
        Self {
            bitpix,
            shape: data.shape().to_vec(),
            pixels: data.iter().copied().collect(),
        }
    }

    pub fn to_array2(&self) -> Result<Array2<f64>> {
        match self.shape.as_slice() {
            [h, w] => Array2::from_shape_vec((*h, *w), self.pixels.clone())
                .map_err(|e| ScubesError::InvalidFits(e.to_string())),
            other => Err(ScubesError::InvalidFits(format!(
                "expected a 2-D image, got shape {other:?}"
            ))),
        }
    }

    pub fn to_array3(&self) -> Result<Array3<f64>> {
        match self.shape.as_slice() {
            [d, h, w] => Array3::from_shape_vec((*d, *h, *w), self.pixels.clone())
                .map_err(|e| ScubesError::InvalidFits(e.to_string())),
            other => Err(ScubesError::InvalidFits(format!(
                "expected a 3-D image, got shape {other:?}"
            ))),
        }
    }
}

/// Payload of one HDU.
#[derive(Clone, Debug, PartialEq)]
pub enum HduData {
    Empty,
    Image(ImageData),
    Table(BinTable),
}

/// A header plus its decoded payload.
#[derive(Clone, Debug, PartialEq)]
pub struct Hdu {
    pub header: Header,
    pub data: HduData,
}

impl Hdu {
    pub fn empty(header: Header) -> Self {
        Self {
            header,
            data: HduData::Empty,
        }
    }

    pub fn image(header: Header, image: ImageData) -> Self {
        Self {
            header,
            data: HduData::Image(image),
        }
    }

    pub fn table(header: Header, table: BinTable) -> Self {
        Self {
            header,
            data: HduData::Table(table),
        }
    }

    pub fn extname(&self) -> Option<&str> {
        self.header.get_str("EXTNAME")
    }

    pub fn as_image(&self) -> Option<&ImageData> {
        match &self.data {
            HduData::Image(img) => Some(img),
            _ => None,
        }
    }

    pub fn as_table(&self) -> Option<&BinTable> {
        match &self.data {
            HduData::Table(t) => Some(t),
            _ => None,
        }
    }

    /// 2-D image with BSCALE/BZERO applied.
    pub fn physical_array2(&self) -> Result<Array2<f64>> {
        let img = self
            .as_image()
            .ok_or_else(|| ScubesError::InvalidFits("HDU has no image data".into()))?;
        let (scale, zero) = scaling(&self.header);
        Ok(img.to_array2()?.mapv(|v| zero + scale * v))
    }
}

fn scaling(header: &Header) -> (f64, f64) {
    (
        header.get_f64("BSCALE").unwrap_or(1.0),
        header.get_f64("BZERO").unwrap_or(0.0),
    )
}

/// What an HDU carries, as reported when the file is opened.
#[derive(Clone, Debug)]
enum HduKind {
    Empty,
    Image { bitpix: Bitpix, shape: Vec<usize> },
    Table,
}

#[derive(Clone, Debug)]
struct HduEntry {
    header: Header,
    kind: HduKind,
}

/// An open FITS file with the headers of all its HDUs loaded.
///
/// Tile-compressed images (`.fits.fz`) are presented as the images they
/// encode: their HDU reports image pixels and their header carries the
/// image structure instead of the compression table's.
pub struct FitsFile {
    path: PathBuf,
    fits: fitsio::FitsFile,
    entries: Vec<HduEntry>,
}

impl FitsFile {
    /// Open a FITS file and read every header.
    pub fn open(path: &Path) -> Result<Self> {
        std::fs::metadata(path)?;
        let mut fits = fitsio::FitsFile::open(path)
            .map_err(|e| ScubesError::InvalidFits(format!("{}: {e}", path.display())))?;

        let mut entries = Vec::new();
        // cfitsio reports an error once the index runs past the last HDU.
        while let Ok(hdu) = fits.hdu(entries.len()) {
            let header = Header::from_records(
                records::read_records(&mut fits)?.iter().map(String::as_str),
            )?;
            let entry = match &hdu.info {
                HduInfo::ImageInfo { shape, image_type } if !shape.is_empty() && !shape.contains(&0) => {
                    let header = if is_compressed(&header) {
                        decompressed_header(&header)
                    } else {
                        header
                    };
                    HduEntry {
                        header,
                        kind: HduKind::Image {
                            bitpix: Bitpix::from_image_type(image_type),
                            shape: shape.clone(),
                        },
                    }
                }
                HduInfo::TableInfo { .. } => HduEntry {
                    header,
                    kind: HduKind::Table,
                },
                _ => HduEntry {
                    header,
                    kind: HduKind::Empty,
                },
            };
            entries.push(entry);
        }

        if entries.is_empty() {
            return Err(ScubesError::InvalidFits(format!(
                "{} has no readable HDU",
                path.display()
            )));
        }
        Ok(Self {
            path: path.to_path_buf(),
            fits,
            entries,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn hdu_count(&self) -> usize {
        self.entries.len()
    }

    pub fn header(&self, index: usize) -> Result<&Header> {
        self.entry(index).map(|e| &e.header)
    }

    /// Image axes of HDU `index` in numpy order, or `None` for HDUs
    /// without pixels.
    pub fn image_shape(&self, index: usize) -> Option<&[usize]> {
        match &self.entries.get(index)?.kind {
            HduKind::Image { shape, .. } => Some(shape),
            _ => None,
        }
    }

    /// Index of the HDU whose EXTNAME matches `name`.
    pub fn find(&self, name: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|e| e.header.get_str("EXTNAME") == Some(name))
    }

    /// Index of the first HDU that carries image pixels.
    pub fn first_image(&self) -> Option<usize> {
        self.entries
            .iter()
            .position(|e| matches!(e.kind, HduKind::Image { .. }))
    }

    fn entry(&self, index: usize) -> Result<&HduEntry> {
        self.entries.get(index).ok_or_else(|| {
            ScubesError::InvalidFits(format!(
                "{} has no HDU {index} ({} present)",
                self.path.display(),
                self.entries.len()
            ))
        })
    }

    /// Decode one HDU completely.
    pub fn read_hdu(&mut self, index: usize) -> Result<Hdu> {
        let HduEntry { header, kind } = self.entry(index)?.clone();
        match kind {
            HduKind::Empty => Ok(Hdu::empty(header)),
            HduKind::Image { bitpix, shape } => {
                let hdu = self.fits.hdu(index)?;
                records::disable_scaling(&mut self.fits)?;
                let pixels: Vec<f64> = hdu.read_image(&mut self.fits)?;
                Ok(Hdu::image(
                    header,
                    ImageData {
                        bitpix,
                        shape,
                        pixels,
                    },
                ))
            }
            HduKind::Table => {
                let hdu = self.fits.hdu(index)?;
                let HduInfo::TableInfo {
                    column_descriptions,
                    ..
                } = &hdu.info
                else {
                    return Err(ScubesError::InvalidFits(format!(
                        "{} HDU {index} is not a table",
                        self.path.display()
                    )));
                };
                let mut table = BinTable::new();
                for column in column_descriptions {
                    let name = column.name.as_str();
                    let data = match column.data_type.typ {
                        ColumnDataType::Text | ColumnDataType::String => ColumnData::Text(
                            hdu.read_col::<String>(&mut self.fits, name)?
                                .into_iter()
                                .map(|s| s.trim_end().to_string())
                                .collect(),
                        ),
                        ColumnDataType::Float | ColumnDataType::Double => {
                            ColumnData::Float(hdu.read_col(&mut self.fits, name)?)
                        }
                        _ => ColumnData::Integer(hdu.read_col(&mut self.fits, name)?),
                    };
                    table.push(name, data);
                }
                Ok(Hdu::table(header, table))
            }
        }
    }

    /// Decode every HDU in the file.
    pub fn read_all(&mut self) -> Result<Vec<Hdu>> {
        (0..self.entries.len()).map(|i| self.read_hdu(i)).collect()
    }

    /// Decode a rectangular window of a 2-D image HDU, with BSCALE/BZERO
    /// applied. `x0`/`y0` are 0-based and may lie outside the image; pixels
    /// outside are filled with zero. Only the image rows the window
    /// overlaps are read.
    pub fn read_window(
        &mut self,
        index: usize,
        x0: i64,
        y0: i64,
        width: usize,
        height: usize,
    ) -> Result<Array2<f64>> {
        let entry = self.entry(index)?;
        let (scale, zero) = scaling(&entry.header);
        let Some(&[img_h, img_w]) = self.image_shape(index) else {
            return Err(ScubesError::InvalidFits(format!(
                "{} HDU {index} is not a 2-D image",
                self.path.display()
            )));
        };

        let mut out = Array2::<f64>::zeros((height, width));
        let row_lo = y0.max(0);
        let row_hi = (y0 + height as i64).min(img_h as i64);
        let col_lo = x0.max(0);
        let col_hi = (x0 + width as i64).min(img_w as i64);
        if row_lo >= row_hi || col_lo >= col_hi {
            return Ok(out);
        }

        let hdu = self.fits.hdu(index)?;
        records::disable_scaling(&mut self.fits)?;
        let rows: Vec<f64> =
            hdu.read_rows(&mut self.fits, row_lo as usize, (row_hi - row_lo) as usize)?;
        for y in row_lo..row_hi {
            let line = (y - row_lo) as usize * img_w;
            for x in col_lo..col_hi {
                out[[(y - y0) as usize, (x - x0) as usize]] =
                    zero + scale * rows[line + x as usize];
            }
        }
        Ok(out)
    }
}

fn is_compressed(header: &Header) -> bool {
    header.get("ZIMAGE").and_then(|v| v.as_bool()) == Some(true)
}

fn is_compression_keyword(keyword: &str) -> bool {
    COMPRESSION_KEYWORDS.contains(&keyword)
        || COMPRESSION_PREFIXES.iter().any(|p| {
            keyword
                .strip_prefix(p)
                .is_some_and(|rest| !rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit()))
        })
}

/// Header of a tile-compressed image as the image it encodes: `ZBITPIX` and
/// `ZNAXISn` become the image structure; table structure and compression
/// keywords are dropped.
fn decompressed_header(header: &Header) -> Header {
    let mut out = Header::new();
    out.push(Card::new("XTENSION", "IMAGE"));
    if let Some(bitpix) = header.get("ZBITPIX") {
        out.push(Card::new("BITPIX", bitpix.clone()));
    }
    let naxis = header.get_i64("ZNAXIS").unwrap_or(0);
    out.push(Card::new("NAXIS", naxis));
    for axis in 1..=naxis {
        if let Some(n) = header.get(&format!("ZNAXIS{axis}")) {
            out.push(Card::new(&format!("NAXIS{axis}"), n.clone()));
        }
    }
    for card in header.cards() {
        if !card.is_structural() && !is_compression_keyword(&card.keyword) {
            out.push(card.clone());
        }
    }
    out
}
