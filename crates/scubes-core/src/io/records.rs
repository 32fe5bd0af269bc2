//! Header-record access for the current HDU of an open file.
//!
//! `fitsio` reads and writes single keywords by name; the pipeline copies
//! whole headers between files, so records are moved through cfitsio's
//! record calls directly.

use std::ffi::{c_char, c_int, CStr, CString};

use fitsio::sys;
use fitsio::FitsFile;

use crate::consts::FITS_CARD_SIZE;
use crate::error::{Result, ScubesError};

/// cfitsio status for a keyword that is not in the header.
const KEY_NO_EXIST: c_int = 202;

fn check(status: c_int, call: &str) -> Result<()> {
    if status == 0 {
        Ok(())
    } else {
        Err(ScubesError::InvalidFits(format!("{call} failed with cfitsio status {status}")))
    }
}

/// All header records of the current HDU, in file order, without `END`.
pub(crate) fn read_records(fits: &mut FitsFile) -> Result<Vec<String>> {
    let mut status: c_int = 0;
    let mut count: c_int = 0;
    let mut more: c_int = 0;
    let raw = unsafe { fits.as_raw() };
    unsafe { sys::ffghsp(raw, &mut count, &mut more, &mut status) };
    check(status, "ffghsp")?;

    let mut records = Vec::with_capacity(count.max(0) as usize);
    for n in 1..=count {
        let mut card: [c_char; FITS_CARD_SIZE + 1] = [0; FITS_CARD_SIZE + 1];
        unsafe { sys::ffgrec(raw, n, card.as_mut_ptr(), &mut status) };
        check(status, "ffgrec")?;
        let text = unsafe { CStr::from_ptr(card.as_ptr()) };
        records.push(text.to_string_lossy().into_owned());
    }
    Ok(records)
}

/// Append one 80-column record to the header of the current HDU.
pub(crate) fn append_record(fits: &mut FitsFile, record: &str) -> Result<()> {
    let card = CString::new(record)
        .map_err(|_| ScubesError::InvalidFits(format!("header record contains NUL: {record}")))?;
    let mut status: c_int = 0;
    unsafe { sys::ffprec(fits.as_raw(), card.as_ptr(), &mut status) };
    check(status, "ffprec")
}

/// Remove `keyword` from the header of the current HDU if present.
pub(crate) fn delete_keyword(fits: &mut FitsFile, keyword: &str) -> Result<()> {
    let key = CString::new(keyword)
        .map_err(|_| ScubesError::InvalidFits(format!("bad keyword {keyword}")))?;
    let mut status: c_int = 0;
    unsafe { sys::ffdkey(fits.as_raw(), key.as_ptr(), &mut status) };
    if status == KEY_NO_EXIST {
        return Ok(());
    }
    check(status, "ffdkey")
}

/// Make pixel reads of the current HDU return stored values: BSCALE and
/// BZERO are left to the caller.
pub(crate) fn disable_scaling(fits: &mut FitsFile) -> Result<()> {
    let mut status: c_int = 0;
    unsafe { sys::ffpscl(fits.as_raw(), 1.0, 0.0, &mut status) };
    check(status, "ffpscl")
}
