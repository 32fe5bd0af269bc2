use std::path::PathBuf;
use std::sync::Arc;

use tracing::{error, info};

use crate::acquisition::{AcquisitionReport, LocalTileSource, StampMaker, StampSource};
use crate::artifacts::ArtifactLayout;
use crate::calibration::{CalibratedStamp, StampCalibrator};
use crate::cube::{AssemblyOutcome, CubeAssembler, Redshifts};
use crate::error::Result;
use crate::extraction::{BuiltinExtractor, ExtractorBackend, SExtractor, SourceExtractor};
use crate::mask::{run_refine_loop, MaskBuilder, RefineOutcome, RefinePrompt};
use crate::target::{ObjectEntry, Target};

use super::config::PipelineConfig;
use super::types::{NoOpReporter, PipelineStage, ProgressReporter};

/// Support files looked up under `data_dir` when the configuration does not
/// name them.
const SEX_FILTER: &str = "sex_data/tophat_3.0_3x3.conv";
const SEX_NNW: &str = "sex_data/default.nnw";

/// Collaborators shared by every object of a run.
pub struct Services {
    pub layout: ArtifactLayout,
    pub source: Box<dyn StampSource>,
    pub extractor: Box<dyn SourceExtractor>,
    pub calibrator: StampCalibrator,
}

impl Services {
    /// Local tiles and the configured extractor.
    pub fn from_config(config: &PipelineConfig) -> Self {
        let source = Box::new(LocalTileSource::new(&config.paths.tiles_dir));
        Self::with_collaborators(config, source, extractor_from_config(config))
    }

    /// Services with injected acquisition and extraction collaborators.
    pub fn with_collaborators(
        config: &PipelineConfig,
        source: Box<dyn StampSource>,
        extractor: Box<dyn SourceExtractor>,
    ) -> Self {
        Self {
            layout: ArtifactLayout::new(&config.paths.work_dir),
            source,
            extractor,
            calibrator: StampCalibrator::new(
                &config.paths.data_dir,
                &config.paths.zpcorr_dir,
                config.calibration.grid_extrapolation,
            ),
        }
    }

    fn mask_builder(&self, config: &PipelineConfig) -> MaskBuilder<'_> {
        MaskBuilder::new(&self.layout, self.extractor.as_ref(), config.mask.clone())
    }
}

fn extractor_from_config(config: &PipelineConfig) -> Box<dyn SourceExtractor> {
    match config.extraction.backend {
        ExtractorBackend::SExtractor => {
            let mut settings = config.extraction.sextractor.clone();
            let support = |name: &str| {
                let path = config.paths.data_dir.join(name);
                path.is_file().then_some(path)
            };
            if settings.filter_name.is_none() {
                settings.filter_name = support(SEX_FILTER);
            }
            if settings.starnnw_name.is_none() {
                settings.starnnw_name = support(SEX_NNW);
            }
            Box::new(SExtractor::new(settings))
        }
        ExtractorBackend::Builtin => Box::new(BuiltinExtractor {
            pixel_scale: config.mask.pixel_scale,
            ..BuiltinExtractor::default()
        }),
    }
}

/// Result of one object of a pipeline run.
#[derive(Debug)]
pub struct ObjectReport {
    pub name: String,
    pub result: Result<AssemblyOutcome>,
}

/// Build the cube of one object.
pub fn run_target(
    config: &PipelineConfig,
    services: &Services,
    entry: &ObjectEntry,
    rebuild: bool,
    prompt: &mut dyn RefinePrompt,
    reporter: &Arc<dyn ProgressReporter>,
) -> Result<AssemblyOutcome> {
    let target = entry.to_target()?;
    info!(object = %target.name, tile = %target.tile, size = target.size, "Processing object");
    let masks = services.mask_builder(config);
    let assembler = CubeAssembler::new(
        &services.layout,
        services.source.as_ref(),
        &services.calibrator,
        &masks,
        &config.bands,
        config.cube.clone(),
    );
    let redshifts = Redshifts {
        spec_z: entry.spec_z.clone(),
        phot_z: entry.phot_z.clone(),
    };
    assembler.assemble(&target, &redshifts, rebuild, prompt, reporter)
}

/// Build the cubes of every configured object. A failing object is logged
/// and reported; the others still run.
pub fn run_pipeline_reported(
    config: &PipelineConfig,
    services: &Services,
    rebuild: bool,
    prompt: &mut dyn RefinePrompt,
    reporter: Arc<dyn ProgressReporter>,
) -> Vec<ObjectReport> {
    config
        .objects
        .iter()
        .map(|entry| {
            let result = run_target(config, services, entry, rebuild, &mut *prompt, &reporter);
            if let Err(e) = &result {
                error!(object = %entry.name, error = %e, "Object failed");
            }
            ObjectReport {
                name: entry.name.clone(),
                result,
            }
        })
        .collect()
}

/// Run the whole pipeline without progress reporting.
pub fn run_pipeline(
    config: &PipelineConfig,
    services: &Services,
    rebuild: bool,
    prompt: &mut dyn RefinePrompt,
) -> Vec<ObjectReport> {
    run_pipeline_reported(config, services, rebuild, prompt, Arc::new(NoOpReporter))
}

/// Cut data, weight and detection stamps of one object.
pub fn acquire_stamps(
    config: &PipelineConfig,
    services: &Services,
    target: &Target,
    redo: bool,
    reporter: &Arc<dyn ProgressReporter>,
) -> Result<(AcquisitionReport, PathBuf)> {
    let maker = StampMaker::new(services.source.as_ref(), &services.layout);
    reporter.begin_stage(PipelineStage::Acquiring, None);
    let report = maker.make_stamps(target, &config.bands, redo)?;
    reporter.finish_stage();
    reporter.begin_stage(PipelineStage::Detecting, None);
    let detection = maker.make_detection(target, redo)?;
    reporter.finish_stage();
    Ok((report, detection))
}

/// Write `MAGZP` into the data stamps of one object.
pub fn calibrate_target(services: &Services, target: &Target) -> Result<Vec<CalibratedStamp>> {
    services.calibrator.calibrate(&services.layout, target)
}

/// Propose, refine and save the mask of one object. Returns the mask path,
/// or `None` when refinement was quit. An existing mask is kept unless
/// `redo` is set.
pub fn build_mask(
    config: &PipelineConfig,
    services: &Services,
    target: &Target,
    redo: bool,
    prompt: &mut dyn RefinePrompt,
    reporter: &Arc<dyn ProgressReporter>,
) -> Result<Option<PathBuf>> {
    let path = services.layout.mask(target);
    if path.is_file() && !redo {
        info!(path = %path.display(), "Mask exists, skipping");
        return Ok(Some(path));
    }
    reporter.begin_stage(PipelineStage::Extracting, None);
    let session = services.mask_builder(config).propose(target)?;
    reporter.finish_stage();

    reporter.begin_stage(PipelineStage::Refining, None);
    let outcome = run_refine_loop(session, prompt)?;
    reporter.finish_stage();
    match outcome {
        RefineOutcome::Accepted(mask) => {
            mask.write(&path)?;
            info!(path = %path.display(), masked = mask.masked_pixels(), "Mask saved");
            Ok(Some(path))
        }
        RefineOutcome::Aborted => Ok(None),
    }
}
