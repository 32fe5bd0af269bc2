use crate::bands::Band;
use crate::io::fits_header::Header;
use crate::io::fits_table::{BinTable, ColumnData};

/// Per-band table of a cube, one row per band in cube order.
///
/// `EXPTIME` is the effective exposure (`EFFTIME`) when every header has
/// one, else the `EXPTIME` headers, else the nominal band exposure. `GAIN`,
/// `PSFFWHM` and `DATE-OBS` are included only when every header carries
/// them.
pub fn band_metadata(bands: &[Band], headers: &[Header]) -> BinTable {
    let all_f64 = |key: &str| -> Option<Vec<f64>> { headers.iter().map(|h| h.get_f64(key)).collect() };

    let mut table = BinTable::new();
    table.push(
        "FILTER",
        ColumnData::Text(bands.iter().map(|b| b.code().to_string()).collect()),
    );
    table.push(
        "WAVE_EFF",
        ColumnData::Float(bands.iter().map(|b| b.wave_eff()).collect()),
    );
    let exptime = all_f64("EFFTIME")
        .or_else(|| all_f64("EXPTIME"))
        .unwrap_or_else(|| bands.iter().map(|b| b.exptime()).collect());
    table.push("EXPTIME", ColumnData::Float(exptime));

    for key in ["GAIN", "PSFFWHM"] {
        if let Some(values) = all_f64(key) {
            table.push(key, ColumnData::Float(values));
        }
    }
    let dates: Option<Vec<String>> = headers
        .iter()
        .map(|h| h.get_str("DATE-OBS").map(str::to_string))
        .collect();
    if let Some(dates) = dates {
        table.push("DATE-OBS", ColumnData::Text(dates));
    }
    table
}
