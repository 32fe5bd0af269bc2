use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::bands::Band;
use crate::error::{Result, ScubesError};

/// Column prefix used by the survey zero-point catalogues.
const COLUMN_PREFIX: &str = "SPLUS_";

/// Base zero points of one tile.
#[derive(Clone, Debug, PartialEq)]
pub struct ZeroPointTable {
    tile: String,
    values: BTreeMap<Band, f64>,
}

impl ZeroPointTable {
    /// Path of the zero-point catalogue of `tile` inside `data_dir`.
    pub fn path(data_dir: &Path, tile: &str) -> PathBuf {
        data_dir.join(format!("{tile}_ZP.cat"))
    }

    /// Load `{tile}_ZP.cat` from `data_dir`.
    pub fn load(data_dir: &Path, tile: &str) -> Result<Self> {
        let path = Self::path(data_dir, tile);
        let text = fs::read_to_string(&path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => ScubesError::MissingCalibrationData(format!(
                "zero-point table {} not found",
                path.display()
            )),
            _ => ScubesError::Io(e),
        })?;
        Self::parse(tile, &text)
    }

    /// Parse a whitespace (or comma) separated table. The first line names
    /// the columns and may be commented with `#`; the first data row holds
    /// the zero points.
    pub fn parse(tile: &str, text: &str) -> Result<Self> {
        let missing = |what: &str| {
            ScubesError::MissingCalibrationData(format!("zero-point table of {tile}: {what}"))
        };
        let mut lines = text.lines().map(str::trim).filter(|l| !l.is_empty());

        let header = lines.next().ok_or_else(|| missing("empty file"))?;
        let names = split_fields(header.trim_start_matches('#'));
        let row = lines
            .find(|l| !l.starts_with('#'))
            .ok_or_else(|| missing("no data row"))?;
        let fields = split_fields(row);
        if fields.len() != names.len() {
            return Err(missing(&format!(
                "{} columns in header but {} in first row",
                names.len(),
                fields.len()
            )));
        }

        let mut values = BTreeMap::new();
        for (name, field) in names.iter().zip(&fields) {
            let code = name.strip_prefix(COLUMN_PREFIX).unwrap_or(name);
            let Ok(band) = Band::from_code(code) else {
                continue;
            };
            let value: f64 = field
                .parse()
                .map_err(|_| missing(&format!("column {name} holds {field:?}")))?;
            values.insert(band, value);
        }

        Ok(Self {
            tile: tile.to_string(),
            values,
        })
    }

    pub fn tile(&self) -> &str {
        &self.tile
    }

    /// Base zero point of `band`; a missing column is an error.
    pub fn get(&self, band: Band) -> Result<f64> {
        self.values.get(&band).copied().ok_or_else(|| {
            ScubesError::MissingCalibrationData(format!(
                "zero-point table of {} has no {}{} column",
                self.tile,
                COLUMN_PREFIX,
                band.code()
            ))
        })
    }
}

fn split_fields(line: &str) -> Vec<&str> {
    line.split(|c: char| c == ',' || c.is_whitespace())
        .filter(|f| !f.is_empty())
        .collect()
}
