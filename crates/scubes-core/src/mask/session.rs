use std::collections::{BTreeSet, VecDeque};
use std::path::{Path, PathBuf};

use ndarray::Array2;
use tracing::{info, warn};

use crate::error::{Result, ScubesError};
use crate::io::fits::{Bitpix, Hdu, ImageData};
use crate::io::fits_header::Header;
use crate::io::fits_writer::write_hdus;
use crate::stamp::Stamp;

use super::builder::{ExclusionCircle, MaskGeometry};
use super::preview::MaskPreview;

/// Header keywords that describe photometry and do not apply to a mask.
const PHOTOMETRIC_KEYS: &[&str] = &["EXPTIME", "FILTER", "GAIN", "PSFFWHM"];

/// Boolean mask raster (1 = keep) with its header.
#[derive(Clone, Debug, PartialEq)]
pub struct FinalMask {
    pub data: Array2<u8>,
    pub header: Header,
}

impl FinalMask {
    /// Mask header derived from the detection stamp header.
    pub fn mask_header(detection: &Header) -> Header {
        let mut header = detection.clone();
        header.set_with_comment("IMGTYPE", "MASK", "boolean mask");
        for key in PHOTOMETRIC_KEYS {
            header.remove(key);
        }
        header
    }

    pub fn masked_pixels(&self) -> usize {
        self.data.iter().filter(|&&v| v == 0).count()
    }

    /// Read a mask written by [`FinalMask::write`].
    pub fn read(path: &Path) -> Result<Self> {
        let stamp = Stamp::read(path)?;
        Ok(Self {
            data: stamp.data.mapv(|v| u8::from(v > 0.0)),
            header: stamp.header,
        })
    }

    /// Empty primary HDU followed by an unsigned byte image.
    pub fn write(&self, path: &Path) -> Result<()> {
        write_hdus(path, &[Hdu::empty(Header::new()), self.to_hdu()])
    }

    pub fn to_hdu(&self) -> Hdu {
        let mut header = self.header.clone();
        header.remove("BSCALE");
        header.remove("BZERO");
        Hdu::image(
            header,
            ImageData::from_array2(Bitpix::U8, &self.data.mapv(f64::from)),
        )
    }
}

/// Interactive refinement of a proposed mask.
///
/// Holds the exclusion circles and a keep list of circle indices that are
/// left unmasked. Ends with [`MaskSession::finalize`] or
/// [`MaskSession::abort`].
#[derive(Debug)]
pub struct MaskSession {
    object: String,
    geometry: MaskGeometry,
    header: Header,
    keep: BTreeSet<usize>,
    preview: Option<MaskPreview>,
}

impl MaskSession {
    pub fn new(object: &str, geometry: MaskGeometry, detection_header: Header, preview: Option<MaskPreview>) -> Self {
        Self {
            object: object.to_string(),
            geometry,
            header: detection_header,
            keep: BTreeSet::new(),
            preview,
        }
    }

    pub fn object(&self) -> &str {
        &self.object
    }

    pub fn geometry(&self) -> &MaskGeometry {
        &self.geometry
    }

    pub fn circles(&self) -> &[ExclusionCircle] {
        &self.geometry.circles
    }

    pub fn keep_list(&self) -> Vec<usize> {
        self.keep.iter().copied().collect()
    }

    /// Add circle indices to the keep list. Indices that name no circle are
    /// ignored with a warning.
    pub fn apply_keep_list(&mut self, indices: &[usize]) {
        let count = self.geometry.circles.len();
        for &i in indices {
            if i == 0 || i > count {
                warn!(object = %self.object, index = i, circles = count, "No such exclusion circle");
                continue;
            }
            self.keep.insert(i);
        }
    }

    /// Drop the keep list, restoring the proposal.
    pub fn reset(&mut self) {
        self.keep.clear();
    }

    pub fn current_mask(&self) -> Array2<u8> {
        self.geometry.render(&self.keep)
    }

    pub fn masked_pixel_count(&self) -> usize {
        self.current_mask().iter().filter(|&&v| v == 0).count()
    }

    /// Write the preview for the current keep list, if previews are enabled.
    pub fn refresh_preview(&self) -> Result<Option<PathBuf>> {
        match &self.preview {
            Some(p) => Ok(Some(p.save(&self.geometry, &self.keep)?.to_path_buf())),
            None => Ok(None),
        }
    }

    pub fn finalize(self) -> FinalMask {
        let data = self.current_mask();
        info!(
            object = %self.object,
            kept = ?self.keep,
            masked = data.iter().filter(|&&v| v == 0).count(),
            "Mask finalized"
        );
        FinalMask {
            data,
            header: FinalMask::mask_header(&self.header),
        }
    }

    pub fn abort(self) {
        warn!(object = %self.object, "Mask refinement aborted");
    }
}

/// One answer to the refinement prompt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RefineResponse {
    /// `y`: enter circle indices to keep.
    Keep,
    /// `r`: clear the keep list.
    Reset,
    /// `n`: accept the current mask.
    Accept,
    /// `q`: abandon the cube.
    Quit,
    /// Empty line: ask again.
    Repeat,
}

impl RefineResponse {
    pub fn parse(input: &str) -> Result<Self> {
        match input.trim().to_ascii_lowercase().as_str() {
            "y" => Ok(Self::Keep),
            "r" => Ok(Self::Reset),
            "n" => Ok(Self::Accept),
            "q" => Ok(Self::Quit),
            "" => Ok(Self::Repeat),
            other => Err(ScubesError::InvalidUserInput(format!(
                "option not recognized: {other:?} (expected y, r, n or q)"
            ))),
        }
    }
}

/// Space-separated circle indices.
pub fn parse_keep_list(input: &str) -> Result<Vec<usize>> {
    input
        .split_whitespace()
        .map(|tok| {
            tok.parse::<usize>()
                .map_err(|_| ScubesError::InvalidUserInput(format!("not a star number: {tok:?}")))
        })
        .collect()
}

/// Source of refinement answers.
pub trait RefinePrompt {
    /// Present the current proposal.
    fn show(&mut self, _session: &MaskSession) -> Result<()> {
        Ok(())
    }

    /// Next action (`y`, `r`, `n`, `q` or empty).
    fn ask_action(&mut self) -> Result<String>;

    /// Indices to keep after a `y`.
    fn ask_keep_list(&mut self) -> Result<String>;
}

/// How refinement ended.
#[derive(Clone, Debug, PartialEq)]
pub enum RefineOutcome {
    Accepted(FinalMask),
    Aborted,
}

/// Drive a session with a prompt until it is accepted or aborted.
pub fn run_refine_loop(mut session: MaskSession, prompt: &mut dyn RefinePrompt) -> Result<RefineOutcome> {
    prompt.show(&session)?;
    loop {
        match RefineResponse::parse(&prompt.ask_action()?)? {
            RefineResponse::Keep => {
                let indices = parse_keep_list(&prompt.ask_keep_list()?)?;
                session.apply_keep_list(&indices);
                prompt.show(&session)?;
            }
            RefineResponse::Reset => {
                session.reset();
                prompt.show(&session)?;
            }
            RefineResponse::Accept => return Ok(RefineOutcome::Accepted(session.finalize())),
            RefineResponse::Quit => {
                session.abort();
                return Ok(RefineOutcome::Aborted);
            }
            RefineResponse::Repeat => {}
        }
    }
}

/// Headless prompt replaying fixed answers. Each `y` consumes the next keep
/// list. Running out of answers is an input error.
#[derive(Clone, Debug, Default)]
pub struct ScriptedPrompt {
    actions: VecDeque<String>,
    keep_lists: VecDeque<String>,
}

impl ScriptedPrompt {
    pub fn new<A, K>(actions: A, keep_lists: K) -> Self
    where
        A: IntoIterator,
        A::Item: Into<String>,
        K: IntoIterator,
        K::Item: Into<String>,
    {
        Self {
            actions: actions.into_iter().map(Into::into).collect(),
            keep_lists: keep_lists.into_iter().map(Into::into).collect(),
        }
    }

    /// Accept the proposal unchanged.
    pub fn accept() -> Self {
        Self::new(["n"], Vec::<String>::new())
    }

    /// Keep the given circles, then accept.
    pub fn keep(indices: &[usize]) -> Self {
        let list = indices
            .iter()
            .map(|i| i.to_string())
            .collect::<Vec<_>>()
            .join(" ");
        Self::new(["y", "n"], [list])
    }
}

impl RefinePrompt for ScriptedPrompt {
    fn ask_action(&mut self) -> Result<String> {
        self.actions
            .pop_front()
            .ok_or_else(|| ScubesError::InvalidUserInput("no answer left for the refinement prompt".into()))
    }

    fn ask_keep_list(&mut self) -> Result<String> {
        self.keep_lists
            .pop_front()
            .ok_or_else(|| ScubesError::InvalidUserInput("no keep list left for the refinement prompt".into()))
    }
}
