use std::fs;
use std::path::{Path, PathBuf};

use fitsio::hdu::FitsHdu;
use fitsio::images::{ImageDescription, ImageType};

use crate::error::{Result, ScubesError};

use super::fits::{Bitpix, FitsFile, Hdu, HduData, ImageData};
use super::fits_header::Header;
use super::fits_table::{BinTable, ColumnData};
use super::records;

/// Sibling path used for atomic writes.
fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".partial");
    path.with_file_name(name)
}

/// Write `hdus` as a FITS file. The first HDU must not be a table.
///
/// The file is written next to `path` and renamed into place, so a failed
/// write never leaves a truncated file behind.
pub fn write_hdus(path: &Path, hdus: &[Hdu]) -> Result<()> {
    let Some((primary, extensions)) = hdus.split_first() else {
        return Err(ScubesError::InvalidFits("no HDUs to write".into()));
    };
    if matches!(primary.data, HduData::Table(_)) {
        return Err(ScubesError::InvalidFits(
            "a binary table cannot be the primary HDU".into(),
        ));
    }
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let tmp = temp_path(path);
    match write_file(&tmp, primary, extensions) {
        Ok(()) => {
            fs::rename(&tmp, path)?;
            Ok(())
        }
        Err(e) => {
            let _ = fs::remove_file(&tmp);
            Err(e)
        }
    }
}

fn write_file(path: &Path, primary: &Hdu, extensions: &[Hdu]) -> Result<()> {
    let mut fits = match &primary.data {
        HduData::Image(img) => {
            let description = ImageDescription {
                data_type: img.bitpix.image_type(),
                dimensions: &img.shape,
            };
            fitsio::FitsFile::create(path)
                .with_custom_primary(&description)
                .overwrite()
                .open()?
        }
        _ => fitsio::FitsFile::create(path).overwrite().open()?,
    };

    let hdu = fits.primary_hdu()?;
    if let HduData::Image(img) = &primary.data {
        write_pixels(&mut fits, &hdu, img)?;
    }
    // fitsio names a custom primary HDU; the primary header decides that.
    records::delete_keyword(&mut fits, "EXTNAME")?;
    write_cards(&mut fits, &primary.header, true)?;

    for extension in extensions {
        let extname = extension.extname().unwrap_or_default().to_string();
        match &extension.data {
            HduData::Empty => {
                let description = ImageDescription {
                    data_type: ImageType::UnsignedByte,
                    dimensions: &[],
                };
                fits.create_image(extname.clone(), &description)?;
            }
            HduData::Image(img) => {
                let description = ImageDescription {
                    data_type: img.bitpix.image_type(),
                    dimensions: &img.shape,
                };
                let hdu = fits.create_image(extname.clone(), &description)?;
                write_pixels(&mut fits, &hdu, img)?;
            }
            HduData::Table(table) => {
                let hdu = fits.create_table(extname.clone(), &table.column_descriptions()?)?;
                write_columns(&mut fits, &hdu, table)?;
            }
        }
        if extname.is_empty() {
            records::delete_keyword(&mut fits, "EXTNAME")?;
        }
        write_cards(&mut fits, &extension.header, false)?;
    }
    Ok(())
}

/// Store pixels in the HDU's own type. No scaling keywords exist yet when
/// pixels are written, so values land on disk unchanged.
fn write_pixels(fits: &mut fitsio::FitsFile, hdu: &FitsHdu, img: &ImageData) -> Result<()> {
    let pixels = &img.pixels;
    match img.bitpix {
        Bitpix::U8 => {
            let data: Vec<u8> = pixels.iter().map(|&v| v.clamp(0.0, 255.0) as u8).collect();
            hdu.write_image(fits, &data)?;
        }
        Bitpix::I16 => {
            let data: Vec<i16> = pixels.iter().map(|&v| v as i16).collect();
            hdu.write_image(fits, &data)?;
        }
        Bitpix::I32 => {
            let data: Vec<i32> = pixels.iter().map(|&v| v as i32).collect();
            hdu.write_image(fits, &data)?;
        }
        Bitpix::I64 => {
            let data: Vec<i64> = pixels.iter().map(|&v| v as i64).collect();
            hdu.write_image(fits, &data)?;
        }
        Bitpix::F32 => {
            let data: Vec<f32> = pixels.iter().map(|&v| v as f32).collect();
            hdu.write_image(fits, &data)?;
        }
        Bitpix::F64 => hdu.write_image(fits, pixels)?,
    }
    Ok(())
}

fn write_columns(fits: &mut fitsio::FitsFile, hdu: &FitsHdu, table: &BinTable) -> Result<()> {
    if table.rows() == 0 {
        return Ok(());
    }
    for column in &table.columns {
        let name = column.name.as_str();
        match &column.data {
            ColumnData::Text(v) => hdu.write_col(fits, name, v)?,
            ColumnData::Float(v) => hdu.write_col(fits, name, v)?,
            ColumnData::Integer(v) => hdu.write_col(fits, name, v)?,
        };
    }
    Ok(())
}

/// Append the non-structural cards of `header` to the current HDU. EXTNAME
/// of an extension is set when the extension is created, and records
/// cfitsio already wrote (the standard primary COMMENT lines) are not
/// repeated.
fn write_cards(fits: &mut fitsio::FitsFile, header: &Header, primary: bool) -> Result<()> {
    let existing = records::read_records(fits)?;
    for card in header.cards() {
        if card.is_structural() || (!primary && card.keyword == "EXTNAME") {
            continue;
        }
        let record = card.to_record();
        if existing.iter().any(|r| r.trim_end() == record.trim_end()) {
            continue;
        }
        records::append_record(fits, &record)?;
    }
    Ok(())
}

/// Rewrite the header of HDU `index`, keeping all data.
pub fn update_header<F>(path: &Path, index: usize, edit: F) -> Result<()>
where
    F: FnOnce(&mut Header),
{
    let mut hdus = {
        let mut file = FitsFile::open(path)?;
        if index >= file.hdu_count() {
            return Err(ScubesError::InvalidFits(format!(
                "{} has no HDU {index}",
                path.display()
            )));
        }
        file.read_all()?
    };
    edit(&mut hdus[index].header);
    write_hdus(path, &hdus)
}
