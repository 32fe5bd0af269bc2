use std::fs;
use std::io::Cursor;
use std::path::Path;

use byteorder::{BigEndian, ByteOrder, LittleEndian, ReadBytesExt};
use ndarray::Array2;

use crate::error::{Result, ScubesError};

const NPY_MAGIC: &[u8; 6] = b"\x93NUMPY";

/// Element type of a `.npy` payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Dtype {
    F64Le,
    F64Be,
    F32Le,
    F32Be,
}

impl Dtype {
    fn parse(descr: &str) -> Result<Self> {
        match descr {
            "<f8" | "=f8" => Ok(Self::F64Le),
            ">f8" => Ok(Self::F64Be),
            "<f4" | "=f4" => Ok(Self::F32Le),
            ">f4" => Ok(Self::F32Be),
            other => Err(ScubesError::UnsupportedFormat(format!("npy dtype {other}"))),
        }
    }

    fn bytes(self) -> usize {
        match self {
            Self::F64Le | Self::F64Be => 8,
            Self::F32Le | Self::F32Be => 4,
        }
    }

    fn decode(self, raw: &[u8]) -> f64 {
        match self {
            Self::F64Le => LittleEndian::read_f64(raw),
            Self::F64Be => BigEndian::read_f64(raw),
            Self::F32Le => LittleEndian::read_f32(raw) as f64,
            Self::F32Be => BigEndian::read_f32(raw) as f64,
        }
    }
}

/// Parsed `.npy` header dictionary.
#[derive(Clone, Debug)]
struct NpyHeader {
    dtype: Dtype,
    fortran_order: bool,
    shape: Vec<usize>,
}

/// Value of `'key':` inside the header dictionary, up to the next top-level
/// comma or closing brace.
fn dict_value<'a>(dict: &'a str, key: &str) -> Option<&'a str> {
    let start = dict.find(&format!("'{key}'"))? + key.len() + 2;
    let rest = dict[start..].trim_start().strip_prefix(':')?.trim_start();
    if rest.starts_with('(') {
        let end = rest.find(')')?;
        return Some(&rest[..=end]);
    }
    let end = rest.find([',', '}']).unwrap_or(rest.len());
    Some(rest[..end].trim())
}

fn parse_header(dict: &str) -> Result<NpyHeader> {
    let bad = |what: &str| ScubesError::InvalidFits(format!("npy header: {what} in {dict}"));

    let descr = dict_value(dict, "descr").ok_or_else(|| bad("missing descr"))?;
    let dtype = Dtype::parse(descr.trim_matches(|c| c == '\'' || c == '"'))?;

    let fortran_order = match dict_value(dict, "fortran_order") {
        Some("True") => true,
        Some("False") | None => false,
        Some(_) => return Err(bad("bad fortran_order")),
    };

    let shape_str = dict_value(dict, "shape").ok_or_else(|| bad("missing shape"))?;
    let shape = shape_str
        .trim_start_matches('(')
        .trim_end_matches(')')
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<usize>().map_err(|_| bad("bad shape")))
        .collect::<Result<Vec<_>>>()?;

    Ok(NpyHeader {
        dtype,
        fortran_order,
        shape,
    })
}

/// Decode a 2-D floating point array from `.npy` bytes (format versions 1-3).
pub fn decode_npy(bytes: &[u8]) -> Result<Array2<f64>> {
    if bytes.len() < 10 || &bytes[..6] != NPY_MAGIC {
        return Err(ScubesError::InvalidFits("missing NUMPY magic".into()));
    }
    let major = bytes[6];
    let mut cursor = Cursor::new(&bytes[8..]);
    let (header_len, prefix) = match major {
        1 => (cursor.read_u16::<LittleEndian>()? as usize, 10),
        2 | 3 => (cursor.read_u32::<LittleEndian>()? as usize, 12),
        v => {
            return Err(ScubesError::UnsupportedFormat(format!("npy format version {v}")));
        }
    };
    let data_start = prefix + header_len;
    if bytes.len() < data_start {
        return Err(ScubesError::InvalidFits("npy header truncated".into()));
    }
    let dict = String::from_utf8_lossy(&bytes[prefix..data_start]);
    let header = parse_header(dict.trim())?;

    let (rows, cols) = match header.shape.as_slice() {
        [r, c] => (*r, *c),
        other => {
            return Err(ScubesError::InvalidFits(format!(
                "expected a 2-D npy array, got shape {other:?}"
            )));
        }
    };
    let size = header.dtype.bytes();
    let payload = &bytes[data_start..];
    if payload.len() < rows * cols * size {
        return Err(ScubesError::InvalidFits("npy data truncated".into()));
    }

    let values: Vec<f64> = payload[..rows * cols * size]
        .chunks_exact(size)
        .map(|chunk| header.dtype.decode(chunk))
        .collect();

    let array = if header.fortran_order {
        Array2::from_shape_vec((cols, rows), values).map(|a| a.reversed_axes())
    } else {
        Array2::from_shape_vec((rows, cols), values)
    };
    array
        .map(|a| a.as_standard_layout().into_owned())
        .map_err(|e| ScubesError::InvalidFits(e.to_string()))
}

/// Read a 2-D floating point `.npy` file.
pub fn read_npy(path: &Path) -> Result<Array2<f64>> {
    decode_npy(&fs::read(path)?)
}

/// Write a C-ordered little-endian float64 `.npy` file (format 1.0).
pub fn write_npy(path: &Path, data: &Array2<f64>) -> Result<()> {
    let (rows, cols) = data.dim();
    let mut dict = format!("{{'descr': '<f8', 'fortran_order': False, 'shape': ({rows}, {cols}), }}");
    // Magic + version + length + dict + newline is padded to 64 bytes.
    let unpadded = NPY_MAGIC.len() + 4 + dict.len() + 1;
    dict.push_str(&" ".repeat((64 - unpadded % 64) % 64));
    dict.push('\n');

    let mut out = Vec::with_capacity(10 + dict.len() + rows * cols * 8);
    out.extend_from_slice(NPY_MAGIC);
    out.extend_from_slice(&[1, 0]);
    let mut len = [0u8; 2];
    LittleEndian::write_u16(&mut len, dict.len() as u16);
    out.extend_from_slice(&len);
    out.extend_from_slice(dict.as_bytes());
    let mut buf = [0u8; 8];
    for &v in data.iter() {
        LittleEndian::write_f64(&mut buf, v);
        out.extend_from_slice(&buf);
    }
    fs::write(path, out)?;
    Ok(())
}
