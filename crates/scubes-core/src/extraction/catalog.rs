use ndarray::Array2;

use crate::error::{Result, ScubesError};
use crate::io::fits_table::{BinTable, ColumnData};

/// One detected source. Positions are 0-based pixels of the detection stamp.
#[derive(Clone, Debug, PartialEq)]
pub struct CatalogEntry {
    pub number: u32,
    pub x: f64,
    pub y: f64,
    pub kron_radius: f64,
    pub ellipticity: f64,
    /// Position angle in degrees, counter-clockwise from the x axis.
    pub theta: f64,
    pub a: f64,
    pub b: f64,
    pub mag_auto: f64,
    /// FWHM in pixels.
    pub fwhm: f64,
    /// Stellarity score in [0, 1]; 1 is point-like.
    pub class_star: f64,
}

/// Output columns, in catalog order.
pub const CATALOG_COLUMNS: &[&str] = &[
    "NUMBER",
    "X_IMAGE",
    "Y_IMAGE",
    "KRON_RADIUS",
    "ELLIPTICITY",
    "THETA_IMAGE",
    "A_IMAGE",
    "B_IMAGE",
    "MAG_AUTO",
    "FWHM_IMAGE",
    "CLASS_STAR",
];

/// Catalog plus segmentation map of one detection stamp.
#[derive(Clone, Debug)]
pub struct Extraction {
    pub catalog: Vec<CatalogEntry>,
    /// Pixel value is the `number` of the owning source, 0 for sky.
    pub segmentation: Array2<u32>,
}

/// Catalog as a FITS binary table. Positions are written 1-based, as
/// SExtractor reports them.
pub fn catalog_table(catalog: &[CatalogEntry]) -> BinTable {
    let float = |f: fn(&CatalogEntry) -> f64| ColumnData::Float(catalog.iter().map(f).collect());
    let mut table = BinTable::new();
    table.push(
        "NUMBER",
        ColumnData::Integer(catalog.iter().map(|e| e.number as i64).collect()),
    );
    table.push("X_IMAGE", float(|e| e.x + 1.0));
    table.push("Y_IMAGE", float(|e| e.y + 1.0));
    table.push("KRON_RADIUS", float(|e| e.kron_radius));
    table.push("ELLIPTICITY", float(|e| e.ellipticity));
    table.push("THETA_IMAGE", float(|e| e.theta));
    table.push("A_IMAGE", float(|e| e.a));
    table.push("B_IMAGE", float(|e| e.b));
    table.push("MAG_AUTO", float(|e| e.mag_auto));
    table.push("FWHM_IMAGE", float(|e| e.fwhm));
    table.push("CLASS_STAR", float(|e| e.class_star));
    table
}

/// Read a catalog back from [`catalog_table`] output.
pub fn catalog_from_table(table: &BinTable) -> Result<Vec<CatalogEntry>> {
    let floats = |name: &str| -> Result<Vec<f64>> {
        match table.column(name) {
            Some(ColumnData::Float(v)) => Ok(v.clone()),
            Some(ColumnData::Integer(v)) => Ok(v.iter().map(|&i| i as f64).collect()),
            _ => Err(ScubesError::InvalidFits(format!("catalog column {name} missing"))),
        }
    };
    let number = floats("NUMBER")?;
    let x = floats("X_IMAGE")?;
    let y = floats("Y_IMAGE")?;
    let kron = floats("KRON_RADIUS")?;
    let ell = floats("ELLIPTICITY")?;
    let theta = floats("THETA_IMAGE")?;
    let a = floats("A_IMAGE")?;
    let b = floats("B_IMAGE")?;
    let mag = floats("MAG_AUTO")?;
    let fwhm = floats("FWHM_IMAGE")?;
    let class_star = floats("CLASS_STAR")?;

    Ok((0..table.rows())
        .map(|i| CatalogEntry {
            number: number[i] as u32,
            x: x[i] - 1.0,
            y: y[i] - 1.0,
            kron_radius: kron[i],
            ellipticity: ell[i],
            theta: theta[i],
            a: a[i],
            b: b[i],
            mag_auto: mag[i],
            fwhm: fwhm[i],
            class_star: class_star[i],
        })
        .collect())
}
