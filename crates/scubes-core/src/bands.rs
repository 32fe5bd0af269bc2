use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Result, ScubesError};

/// The twelve S-PLUS photometric filters, in cube order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Band {
    U,
    F378,
    F395,
    F410,
    F430,
    G,
    F515,
    R,
    F660,
    I,
    F861,
    Z,
}

/// Channel of the Lupton colour composite a band contributes to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ColorGroup {
    Blue,
    Green,
    Red,
}

impl Band {
    pub const ALL: [Band; 12] = [
        Band::U,
        Band::F378,
        Band::F395,
        Band::F410,
        Band::F430,
        Band::G,
        Band::F515,
        Band::R,
        Band::F660,
        Band::I,
        Band::F861,
        Band::Z,
    ];

    /// Filter code as written in FILTER headers and file names.
    pub fn code(self) -> &'static str {
        match self {
            Band::U => "U",
            Band::F378 => "F378",
            Band::F395 => "F395",
            Band::F410 => "F410",
            Band::F430 => "F430",
            Band::G => "G",
            Band::F515 => "F515",
            Band::R => "R",
            Band::F660 => "F660",
            Band::I => "I",
            Band::F861 => "F861",
            Band::Z => "Z",
        }
    }

    /// Display label (S-PLUS naming: broad bands lower case, narrow bands J).
    pub fn label(self) -> &'static str {
        match self {
            Band::U => "u",
            Band::F378 => "J378",
            Band::F395 => "J395",
            Band::F410 => "J410",
            Band::F430 => "J430",
            Band::G => "g",
            Band::F515 => "J515",
            Band::R => "r",
            Band::F660 => "J660",
            Band::I => "i",
            Band::F861 => "J861",
            Band::Z => "z",
        }
    }

    /// Effective wavelength in Angstrom.
    pub fn wave_eff(self) -> f64 {
        match self {
            Band::U => 3536.0,
            Band::F378 => 3770.0,
            Band::F395 => 3940.0,
            Band::F410 => 4094.0,
            Band::F430 => 4292.0,
            Band::G => 4751.0,
            Band::F515 => 5133.0,
            Band::R => 6258.0,
            Band::F660 => 6614.0,
            Band::I => 7690.0,
            Band::F861 => 8611.0,
            Band::Z => 8831.0,
        }
    }

    /// Nominal exposure time in seconds.
    pub fn exptime(self) -> f64 {
        match self {
            Band::U => 681.0,
            Band::F378 => 660.0,
            Band::F395 => 354.0,
            Band::F410 => 177.0,
            Band::F430 => 171.0,
            Band::G => 99.0,
            Band::F515 => 183.0,
            Band::R => 120.0,
            Band::F660 => 870.0,
            Band::I => 138.0,
            Band::F861 => 240.0,
            Band::Z => 168.0,
        }
    }

    pub fn color_group(self) -> ColorGroup {
        match self {
            Band::U | Band::F378 | Band::F395 | Band::F410 | Band::F430 | Band::G => ColorGroup::Blue,
            Band::F515 | Band::R | Band::F660 => ColorGroup::Green,
            Band::I | Band::F861 | Band::Z => ColorGroup::Red,
        }
    }

    /// Look up a band by filter code (case-insensitive). Labels are accepted
    /// too.
    pub fn from_code(code: &str) -> Result<Band> {
        let code = code.trim();
        Band::ALL
            .into_iter()
            .find(|b| b.code().eq_ignore_ascii_case(code) || b.label() == code)
            .ok_or_else(|| ScubesError::UnknownBand(code.to_string()))
    }
}

impl fmt::Display for Band {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Band {
    type Err = ScubesError;

    fn from_str(s: &str) -> Result<Self> {
        Band::from_code(s)
    }
}
