use std::fmt;

use crate::error::{Result, ScubesError};
use crate::io::fits_header::{Card, Header};

/// Equatorial sky position in degrees.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SkyPosition {
    pub ra: f64,
    pub dec: f64,
}

impl SkyPosition {
    pub fn new(ra: f64, dec: f64) -> Result<Self> {
        if !(0.0..360.0).contains(&ra) || !(-90.0..=90.0).contains(&dec) {
            return Err(ScubesError::InvalidCoordinate(format!("RA {ra}, Dec {dec}")));
        }
        Ok(Self { ra, dec })
    }

    /// Parse a position given either as sexagesimal strings (RA in hours,
    /// Dec in degrees, `:` or space separated) or as decimal degrees.
    pub fn parse(ra: &str, dec: &str) -> Result<Self> {
        let ra_deg = if is_sexagesimal(ra) {
            parse_sexagesimal(ra)? * 15.0
        } else {
            parse_decimal(ra)?
        };
        let dec_deg = if is_sexagesimal(dec) {
            parse_sexagesimal(dec)?
        } else {
            parse_decimal(dec)?
        };
        Self::new(ra_deg, dec_deg)
    }
}

impl fmt::Display for SkyPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.6}, {:+.6})", self.ra, self.dec)
    }
}

fn is_sexagesimal(s: &str) -> bool {
    let s = s.trim();
    s.contains(':') || s.split_whitespace().count() > 1
}

fn parse_decimal(s: &str) -> Result<f64> {
    s.trim()
        .parse()
        .map_err(|_| ScubesError::InvalidCoordinate(s.to_string()))
}

fn parse_sexagesimal(s: &str) -> Result<f64> {
    let trimmed = s.trim();
    let negative = trimmed.starts_with('-');
    let body = trimmed.trim_start_matches(['-', '+']);
    let parts: Vec<f64> = body
        .split(|c: char| c == ':' || c.is_whitespace())
        .filter(|p| !p.is_empty())
        .map(|p| p.parse::<f64>())
        .collect::<std::result::Result<_, _>>()
        .map_err(|_| ScubesError::InvalidCoordinate(s.to_string()))?;
    if parts.is_empty() || parts.len() > 3 || parts.iter().skip(1).any(|v| *v < 0.0 || *v >= 60.0) {
        return Err(ScubesError::InvalidCoordinate(s.to_string()));
    }
    let value = parts
        .iter()
        .zip([1.0, 60.0, 3600.0])
        .map(|(v, div)| v / div)
        .sum::<f64>();
    Ok(if negative { -value } else { value })
}

/// Two-axis gnomonic (TAN) world coordinate system.
///
/// The linear part is kept as `CDELT` plus a `PC` matrix; a header carrying
/// a `CD` matrix is read as `CDELT = 1` and `PC = CD`.
#[derive(Clone, Debug, PartialEq)]
pub struct Wcs {
    /// Reference pixel, 1-based as in FITS.
    pub crpix: [f64; 2],
    /// Reference sky position in degrees.
    pub crval: [f64; 2],
    pub cdelt: [f64; 2],
    pub pc: [[f64; 2]; 2],
    pub ctype: [String; 2],
}

impl Wcs {
    /// Simple north-up, east-left TAN WCS with square pixels of `scale`
    /// degrees.
    pub fn tan(crval: [f64; 2], crpix: [f64; 2], scale: f64) -> Self {
        Self {
            crpix,
            crval,
            cdelt: [-scale, scale],
            pc: [[1.0, 0.0], [0.0, 1.0]],
            ctype: ["RA---TAN".to_string(), "DEC--TAN".to_string()],
        }
    }

    pub fn from_header(header: &Header) -> Result<Self> {
        let need = |key: &str| {
            header
                .get_f64(key)
                .ok_or_else(|| ScubesError::InvalidFits(format!("WCS keyword {key} missing")))
        };

        let ctype = [
            header.get_str("CTYPE1").unwrap_or("RA---TAN").to_string(),
            header.get_str("CTYPE2").unwrap_or("DEC--TAN").to_string(),
        ];
        if ctype.iter().any(|c| !c.ends_with("TAN")) {
            return Err(ScubesError::UnsupportedFormat(format!(
                "projection {} / {}",
                ctype[0], ctype[1]
            )));
        }

        let crpix = [need("CRPIX1")?, need("CRPIX2")?];
        let crval = [need("CRVAL1")?, need("CRVAL2")?];

        let (cdelt, pc) = if header.contains("CD1_1") || header.contains("CD2_2") {
            let cd = |key: &str| header.get_f64(key).unwrap_or(0.0);
            (
                [1.0, 1.0],
                [[cd("CD1_1"), cd("CD1_2")], [cd("CD2_1"), cd("CD2_2")]],
            )
        } else {
            let pc = |key: &str, default: f64| header.get_f64(key).unwrap_or(default);
            (
                [need("CDELT1")?, need("CDELT2")?],
                [
                    [pc("PC1_1", 1.0), pc("PC1_2", 0.0)],
                    [pc("PC2_1", 0.0), pc("PC2_2", 1.0)],
                ],
            )
        };

        let wcs = Self {
            crpix,
            crval,
            cdelt,
            pc,
            ctype,
        };
        if wcs.determinant() == 0.0 {
            return Err(ScubesError::InvalidFits("singular WCS matrix".into()));
        }
        Ok(wcs)
    }

    /// Effective CD matrix (degrees per pixel).
    fn cd(&self) -> [[f64; 2]; 2] {
        [
            [self.cdelt[0] * self.pc[0][0], self.cdelt[0] * self.pc[0][1]],
            [self.cdelt[1] * self.pc[1][0], self.cdelt[1] * self.pc[1][1]],
        ]
    }

    fn determinant(&self) -> f64 {
        let cd = self.cd();
        cd[0][0] * cd[1][1] - cd[0][1] * cd[1][0]
    }

    /// Mean pixel scale in arcseconds.
    pub fn pixel_scale_arcsec(&self) -> f64 {
        self.determinant().abs().sqrt() * 3600.0
    }

    /// Sky position of a 0-based pixel.
    pub fn pixel_to_world(&self, x: f64, y: f64) -> SkyPosition {
        let cd = self.cd();
        let u = x + 1.0 - self.crpix[0];
        let v = y + 1.0 - self.crpix[1];
        let xi = (cd[0][0] * u + cd[0][1] * v).to_radians();
        let eta = (cd[1][0] * u + cd[1][1] * v).to_radians();

        let (ra0, dec0) = (self.crval[0].to_radians(), self.crval[1].to_radians());
        let denom = dec0.cos() - eta * dec0.sin();
        let ra = ra0 + xi.atan2(denom);
        let dec = (dec0.sin() + eta * dec0.cos()).atan2(xi.hypot(denom));

        SkyPosition {
            ra: ra.to_degrees().rem_euclid(360.0),
            dec: dec.to_degrees(),
        }
    }

    /// 0-based pixel of a sky position. Fails for positions on the far side
    /// of the tangent plane.
    pub fn world_to_pixel(&self, pos: &SkyPosition) -> Result<(f64, f64)> {
        let (ra0, dec0) = (self.crval[0].to_radians(), self.crval[1].to_radians());
        let (ra, dec) = (pos.ra.to_radians(), pos.dec.to_radians());
        let dra = ra - ra0;

        let cos_c = dec0.sin() * dec.sin() + dec0.cos() * dec.cos() * dra.cos();
        if cos_c <= 0.0 {
            return Err(ScubesError::InvalidCoordinate(format!(
                "{pos} is not on the projection hemisphere"
            )));
        }
        let xi = (dec.cos() * dra.sin() / cos_c).to_degrees();
        let eta = ((dec0.cos() * dec.sin() - dec0.sin() * dec.cos() * dra.cos()) / cos_c).to_degrees();

        let cd = self.cd();
        let det = self.determinant();
        let u = (cd[1][1] * xi - cd[0][1] * eta) / det;
        let v = (-cd[1][0] * xi + cd[0][0] * eta) / det;
        Ok((u + self.crpix[0] - 1.0, v + self.crpix[1] - 1.0))
    }

    /// WCS of a sub-image whose pixel (0, 0) is pixel (`x0`, `y0`) of this
    /// image.
    pub fn shifted(&self, x0: i64, y0: i64) -> Self {
        let mut out = self.clone();
        out.crpix[0] -= x0 as f64;
        out.crpix[1] -= y0 as f64;
        out
    }

    fn linear_cards(&self, naxis: usize) -> Vec<Card> {
        let mut cards = vec![Card::new("WCSAXES", naxis).with_comment("Number of coordinate axes")];
        for i in 0..2 {
            cards.push(
                Card::new(&format!("CRPIX{}", i + 1), self.crpix[i])
                    .with_comment("Pixel coordinate of reference point"),
            );
        }
        for i in 0..2 {
            for j in 0..2 {
                cards.push(
                    Card::new(&format!("PC{}_{}", i + 1, j + 1), self.pc[i][j])
                        .with_comment("Coordinate transformation matrix element"),
                );
            }
        }
        for i in 0..2 {
            cards.push(
                Card::new(&format!("CDELT{}", i + 1), self.cdelt[i])
                    .with_comment("[deg] Coordinate increment at reference point"),
            );
        }
        for i in 0..2 {
            cards.push(
                Card::new(&format!("CUNIT{}", i + 1), "deg")
                    .with_comment("Units of coordinate increment and value"),
            );
        }
        cards.push(Card::new("CTYPE1", self.ctype[0].as_str()).with_comment("Right ascension, gnomonic projection"));
        cards.push(Card::new("CTYPE2", self.ctype[1].as_str()).with_comment("Declination, gnomonic projection"));
        for i in 0..2 {
            cards.push(
                Card::new(&format!("CRVAL{}", i + 1), self.crval[i])
                    .with_comment("[deg] Coordinate value at reference point"),
            );
        }
        cards
    }

    /// Header cards describing this WCS.
    pub fn to_cards(&self) -> Vec<Card> {
        let mut cards = self.linear_cards(2);
        cards.push(Card::new("LONPOLE", 180.0).with_comment("[deg] Native longitude of celestial pole"));
        cards.push(Card::new("LATPOLE", self.crval[1]).with_comment("[deg] Native latitude of celestial pole"));
        cards.push(Card::new("RADESYS", "ICRS").with_comment("Equatorial coordinate system"));
        cards
    }

    /// Header cards of the three-axis cube WCS: the celestial axes of this
    /// WCS plus a third, unitless band-index axis.
    pub fn to_cube_cards(&self) -> Vec<Card> {
        let mut cards = self.linear_cards(3);
        cards.push(Card::new("CRPIX3", 0.0).with_comment("Pixel coordinate of reference point"));
        cards.push(Card::new("CDELT3", 1.0).with_comment("Coordinate increment at reference point"));
        cards.push(Card::new("CRVAL3", 0.0).with_comment("Coordinate value at reference point"));
        cards.push(Card::new("LONPOLE", 180.0).with_comment("[deg] Native longitude of celestial pole"));
        cards.push(Card::new("LATPOLE", self.crval[1]).with_comment("[deg] Native latitude of celestial pole"));
        cards
    }

    /// Replace any WCS keywords in `header` with this WCS.
    pub fn apply_to(&self, header: &mut Header, cube: bool) {
        strip_wcs(header);
        let cards = if cube { self.to_cube_cards() } else { self.to_cards() };
        for card in cards {
            header.push(card);
        }
    }
}

/// Remove celestial WCS keywords from `header`.
pub fn strip_wcs(header: &mut Header) {
    const KEYS: &[&str] = &[
        "WCSAXES", "CRPIX1", "CRPIX2", "CRPIX3", "CRVAL1", "CRVAL2", "CRVAL3", "CDELT1", "CDELT2",
        "CDELT3", "CTYPE1", "CTYPE2", "CTYPE3", "CUNIT1", "CUNIT2", "CUNIT3", "PC1_1", "PC1_2",
        "PC2_1", "PC2_2", "CD1_1", "CD1_2", "CD2_1", "CD2_2", "LONPOLE", "LATPOLE", "RADESYS",
        "EQUINOX",
    ];
    for key in KEYS {
        while header.remove(key).is_some() {}
    }
}
