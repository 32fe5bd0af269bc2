mod common;

use std::path::Path;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};

use approx::assert_relative_eq;
use ndarray::Array3;
use scubes_core::bands::Band;
use scubes_core::calibration::MAGZP_KEY;
use scubes_core::consts::FLAM_UNIT;
use scubes_core::cube::{band_metadata, AssemblyOutcome, FluxConversion, UncertaintyModel};
use scubes_core::error::ScubesError;
use scubes_core::io::fits::FitsFile;
use scubes_core::io::fits_table::ColumnData;
use scubes_core::mask::ScriptedPrompt;
use scubes_core::pipeline::{
    acquire_stamps, build_mask, calibrate_target, run_pipeline, run_target, NoOpReporter, PipelineConfig,
    PipelineStage, ProgressReporter, Services,
};
use scubes_core::stamp::{Stamp, StampKind};
use scubes_core::target::Target;

use common::{band_header, object_entry, source, test_config, FixedExtractor, SyntheticSource, GAIN};

fn services(config: &PipelineConfig, tiles: SyntheticSource) -> Services {
    let extractor = FixedExtractor {
        catalog: vec![source(1, 3.0, 4.0, 0.4, 0.97), source(2, 7.5, 7.5, 3.0, 0.1)],
    };
    Services::with_collaborators(config, Box::new(tiles), Box::new(extractor))
}

fn no_progress() -> Arc<dyn ProgressReporter> {
    Arc::new(NoOpReporter)
}

fn raw_cube(file: &mut FitsFile, extname: &str) -> Array3<f64> {
    let index = file.find(extname).unwrap();
    file.read_hdu(index).unwrap().as_image().unwrap().to_array3().unwrap()
}

/// Stored value of one count in `band`, from the calibrated stamp.
fn factor(services: &Services, target: &Target, band: Band) -> f64 {
    let header = Stamp::read_header(&services.layout.stamp(target, band, StampKind::Data)).unwrap();
    let zp = header.get_f64(MAGZP_KEY).unwrap();
    FluxConversion::new(zp, band.wave_eff(), 1e-19).factor()
}

fn written(outcome: AssemblyOutcome) -> (std::path::PathBuf, Vec<Band>, bool, bool) {
    match outcome {
        AssemblyOutcome::Written {
            path,
            bands,
            has_errors,
            has_mask,
        } => (path, bands, has_errors, has_mask),
        other => panic!("expected a written cube, got {other:?}"),
    }
}

// ---------------------------------------------------------------------------
// Flux conversion
// ---------------------------------------------------------------------------

#[test]
fn test_flux_factor() {
    let conversion = FluxConversion::new(20.0, 5000.0, 1e-19);
    let expected = 10f64.powf(-0.4 * 68.6) * 2.997_924_58e18 / 25e6 / 1e-19;
    assert_relative_eq!(conversion.factor(), expected, max_relative = 1e-12);
    assert_relative_eq!(conversion.f0(), 10f64.powf(-27.44), max_relative = 1e-12);
}

#[test]
fn test_uncertainty_models() {
    let conversion = FluxConversion::new(22.0, 6258.0, 1e-19);
    let counts = ndarray::arr2(&[[10.0, -3.0], [0.0, 10.0]]);
    let weights = ndarray::arr2(&[[4.0, 4.0], [0.0, 1.0]]);
    let f = conversion.factor();

    let std = conversion.uncertainty(&counts, &weights, 2.0, UncertaintyModel::StdDev);
    assert_relative_eq!(std[[0, 0]], 5.25f64.sqrt() * f, max_relative = 1e-12);
    // Negative counts add no Poisson term.
    assert_relative_eq!(std[[0, 1]], 0.5 * f, max_relative = 1e-12);
    assert!(std[[1, 0]].is_infinite());

    let var = conversion.uncertainty(&counts, &weights, 2.0, UncertaintyModel::Variance);
    assert_relative_eq!(var[[1, 1]], 6.0 * f, max_relative = 1e-12);
    assert_eq!(format!("{}", UncertaintyModel::Variance), "Variance");
}

// ---------------------------------------------------------------------------
// Cube assembly
// ---------------------------------------------------------------------------

#[test]
fn test_cube_layout_and_values() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let services = services(&config, SyntheticSource::new());
    let entry = object_entry("NGC1374", 16);
    let target = entry.to_target().unwrap();

    let outcome = run_target(
        &config,
        &services,
        &entry,
        false,
        &mut ScriptedPrompt::accept(),
        &no_progress(),
    )
    .unwrap();
    let (path, bands, has_errors, has_mask) = written(outcome);
    assert_eq!(path, services.layout.cube(&target));
    assert_eq!(bands, Band::ALL.to_vec());
    assert!(has_errors && has_mask);
    assert!(services.layout.mask(&target).is_file());

    let mut file = FitsFile::open(&path).unwrap();
    assert_eq!(file.hdu_count(), 5);
    let names: Vec<Option<String>> = (0..5)
        .map(|i| file.header(i).unwrap().get_str("EXTNAME").map(str::to_string))
        .collect();
    assert_eq!(
        names,
        vec![
            None,
            Some("DATA".into()),
            Some("ERRORS".into()),
            Some("MASK".into()),
            Some("METADATA".into())
        ]
    );

    let header = file.header(1).unwrap();
    assert_eq!(header.get_i64("NAXIS3"), Some(12));
    assert_eq!(header.get_f64("BSCALE"), Some(1e-19));
    assert_eq!(header.get_str("BUNIT"), Some(FLAM_UNIT));
    assert_eq!(header.get_f64("SPECZ"), Some(0.0046));
    assert_eq!(header.get_str("PHOTZ"), Some("n/a"));
    assert_eq!(header.get_i64("WCSAXES"), Some(3));
    assert!(!header.contains("FILTER"));
    assert!(!header.contains(MAGZP_KEY));

    let data = raw_cube(&mut file, "DATA");
    let errors = raw_cube(&mut file, "ERRORS");
    assert_eq!(data.dim(), (12, 16, 16));
    for (i, &band) in Band::ALL.iter().enumerate() {
        let f = factor(&services, &target, band);
        assert_relative_eq!(data[[i, 5, 9]], 10.0 * f, max_relative = 1e-12);
        assert_relative_eq!(errors[[i, 0, 15]], 5.25f64.sqrt() * f, max_relative = 1e-12);
    }

    let mask_header = file.header(3).unwrap();
    assert_eq!(mask_header.get_i64("BITPIX"), Some(8));
    assert_eq!(mask_header.get_str("IMGTYPE"), Some("MASK"));

    let metadata = file.read_hdu(4).unwrap();
    let table = metadata.as_table().unwrap();
    assert_eq!(table.rows(), 12);
    let codes: Vec<String> = Band::ALL.iter().map(|b| b.code().to_string()).collect();
    assert_eq!(table.column("FILTER"), Some(&ColumnData::Text(codes)));
    let exptime: Vec<f64> = Band::ALL.iter().map(|b| b.exptime() * 2.0).collect();
    assert_eq!(table.column("EXPTIME"), Some(&ColumnData::Float(exptime)));
    assert_eq!(table.column("GAIN"), Some(&ColumnData::Float(vec![GAIN; 12])));
    assert_eq!(table.column("PSFFWHM"), Some(&ColumnData::Float(vec![1.1; 12])));
    assert_eq!(
        table.column("DATE-OBS"),
        Some(&ColumnData::Text(vec!["2019-11-02T03:12:40".to_string(); 12]))
    );
}

#[test]
fn test_metadata_omits_keys_missing_from_any_band() {
    let bands = [Band::U, Band::F378, Band::G];
    let mut headers: Vec<_> = bands.iter().map(|&b| band_header(b, 8)).collect();
    headers[1].remove("GAIN");
    headers[2].set("EFFTIME", 99.0);

    let table = band_metadata(&bands, &headers);
    assert_eq!(table.rows(), 3);
    assert_eq!(table.names(), vec!["FILTER", "WAVE_EFF", "EXPTIME", "PSFFWHM", "DATE-OBS"]);
    assert!(table.column("GAIN").is_none());
    // EFFTIME on a single band does not replace EXPTIME.
    let exptime: Vec<f64> = bands.iter().map(|b| b.exptime() * 2.0).collect();
    assert_eq!(table.column("EXPTIME"), Some(&ColumnData::Float(exptime)));
}

#[test]
fn test_variance_uncertainty_model() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(dir.path());
    config.cube.uncertainty = UncertaintyModel::Variance;
    config.cube.include_mask = false;
    let services = services(&config, SyntheticSource::new());
    let entry = object_entry("NGC1374", 8);
    let target = entry.to_target().unwrap();

    let (path, _, _, has_mask) = written(
        run_target(&config, &services, &entry, false, &mut ScriptedPrompt::default(), &no_progress()).unwrap(),
    );
    assert!(!has_mask);
    let mut file = FitsFile::open(&path).unwrap();
    assert!(file.find("MASK").is_none());
    let errors = raw_cube(&mut file, "ERRORS");
    let f = factor(&services, &target, Band::F660);
    assert_relative_eq!(errors[[8, 3, 3]], 5.25 * f, max_relative = 1e-12);
}

#[test]
fn test_existing_cube_is_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let tiles = SyntheticSource::new();
    let fetches = tiles.fetch_count();
    let services = services(&config, tiles);
    let entry = object_entry("NGC1374", 12);

    run_target(&config, &services, &entry, false, &mut ScriptedPrompt::accept(), &no_progress()).unwrap();
    assert_eq!(fetches.load(Ordering::SeqCst), 25);

    let again = run_target(&config, &services, &entry, false, &mut ScriptedPrompt::default(), &no_progress()).unwrap();
    assert!(matches!(again, AssemblyOutcome::Skipped(_)));

    // A rebuild reuses stamps, detection image and mask.
    let rebuilt = run_target(&config, &services, &entry, true, &mut ScriptedPrompt::default(), &no_progress()).unwrap();
    assert!(matches!(rebuilt, AssemblyOutcome::Written { .. }));
    assert_eq!(fetches.load(Ordering::SeqCst), 25);
}

#[test]
fn test_incomplete_stamp_set() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let services = services(&config, SyntheticSource::new().without(Band::F378));
    let entry = object_entry("NGC1374", 12);
    let target = entry.to_target().unwrap();

    let err = run_target(&config, &services, &entry, false, &mut ScriptedPrompt::accept(), &no_progress())
        .unwrap_err();
    assert!(matches!(err, ScubesError::IncompleteStampSet { found: 22, required: 24 }));
    assert!(!services.layout.cube(&target).exists());
}

#[test]
fn test_quit_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let services = services(&config, SyntheticSource::new());
    let entry = object_entry("NGC1374", 12);
    let target = entry.to_target().unwrap();

    let outcome = run_target(
        &config,
        &services,
        &entry,
        false,
        &mut ScriptedPrompt::new(["q"], Vec::<String>::new()),
        &no_progress(),
    )
    .unwrap();
    assert_eq!(outcome, AssemblyOutcome::Aborted);
    assert!(!services.layout.cube(&target).exists());
    assert!(!services.layout.mask(&target).exists());
}

#[test]
fn test_missing_detection_image() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let tiles = SyntheticSource {
        with_detection: false,
        ..SyntheticSource::new()
    };
    let services = services(&config, tiles);
    let entry = object_entry("NGC1374", 12);

    let err = run_target(&config, &services, &entry, false, &mut ScriptedPrompt::accept(), &no_progress())
        .unwrap_err();
    assert!(matches!(err, ScubesError::MissingDetectionImage(_)));
}

#[test]
fn test_band_subset_keeps_order() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(dir.path());
    config.bands = vec![Band::R, Band::G, Band::U];
    config.cube.include_mask = false;
    let services = services(&config, SyntheticSource::new());
    let entry = object_entry("NGC1374", 10);
    let target = entry.to_target().unwrap();

    let (path, bands, _, _) = written(
        run_target(&config, &services, &entry, false, &mut ScriptedPrompt::default(), &no_progress()).unwrap(),
    );
    assert_eq!(bands, vec![Band::R, Band::G, Band::U]);
    assert_eq!(services.layout.count_stamps(&target, &config.bands), 6);

    let mut file = FitsFile::open(&path).unwrap();
    let data = raw_cube(&mut file, "DATA");
    assert_eq!(data.dim(), (3, 10, 10));
    assert_relative_eq!(data[[0, 1, 1]], 10.0 * factor(&services, &target, Band::R), max_relative = 1e-12);
    assert_relative_eq!(data[[2, 1, 1]], 10.0 * factor(&services, &target, Band::U), max_relative = 1e-12);

    let index = file.find("METADATA").unwrap();
    let metadata = file.read_hdu(index).unwrap();
    assert_eq!(
        metadata.as_table().unwrap().column("FILTER"),
        Some(&ColumnData::Text(vec!["R".into(), "G".into(), "U".into()]))
    );
}

#[test]
fn test_band_subset_after_full_acquisition() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(dir.path());
    let services = services(&config, SyntheticSource::new());
    let entry = object_entry("NGC1374", 10);
    let target = entry.to_target().unwrap();
    acquire_stamps(&config, &services, &target, false, &no_progress()).unwrap();

    config.bands = vec![Band::R, Band::G, Band::U];
    config.cube.include_mask = false;
    let (path, bands, _, _) = written(
        run_target(&config, &services, &entry, false, &mut ScriptedPrompt::default(), &no_progress()).unwrap(),
    );
    assert_eq!(bands, vec![Band::R, Band::G, Band::U]);

    // Every stamp of the tile is calibrated, including bands left out of the cube.
    let header = Stamp::read_header(&services.layout.stamp(&target, Band::F378, StampKind::Data)).unwrap();
    assert!(header.contains(MAGZP_KEY));

    let mut file = FitsFile::open(&path).unwrap();
    assert_eq!(raw_cube(&mut file, "DATA").dim(), (3, 10, 10));
}

#[test]
fn test_cube_without_weights() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(dir.path());
    config.cube.required_stamps = 12;
    config.cube.include_mask = false;
    let tiles = SyntheticSource {
        with_weights: false,
        ..SyntheticSource::new()
    };
    let services = services(&config, tiles);
    let entry = object_entry("NGC1374", 8);

    let (path, _, has_errors, has_mask) = written(
        run_target(&config, &services, &entry, false, &mut ScriptedPrompt::default(), &no_progress()).unwrap(),
    );
    assert!(!has_errors && !has_mask);
    let file = FitsFile::open(&path).unwrap();
    assert_eq!(file.hdu_count(), 3);
    assert!(file.find("ERRORS").is_none());
}

#[test]
fn test_no_bands_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(dir.path());
    config.bands.clear();
    let services = services(&config, SyntheticSource::new());
    let err = run_target(
        &config,
        &services,
        &object_entry("NGC1374", 8),
        false,
        &mut ScriptedPrompt::default(),
        &no_progress(),
    )
    .unwrap_err();
    assert!(matches!(err, ScubesError::InvalidUserInput(_)));
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

#[derive(Default)]
struct RecordingReporter {
    stages: Mutex<Vec<PipelineStage>>,
}

impl ProgressReporter for RecordingReporter {
    fn begin_stage(&self, stage: PipelineStage, _total_items: Option<usize>) {
        self.stages.lock().unwrap().push(stage);
    }
}

#[test]
fn test_stage_order() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let services = services(&config, SyntheticSource::new());
    let recorder = Arc::new(RecordingReporter::default());
    let reporter: Arc<dyn ProgressReporter> = recorder.clone();

    run_target(
        &config,
        &services,
        &object_entry("NGC1374", 8),
        false,
        &mut ScriptedPrompt::accept(),
        &reporter,
    )
    .unwrap();
    assert_eq!(
        *recorder.stages.lock().unwrap(),
        vec![
            PipelineStage::Acquiring,
            PipelineStage::Detecting,
            PipelineStage::Calibrating,
            PipelineStage::Converting,
            PipelineStage::Extracting,
            PipelineStage::Refining,
            PipelineStage::Writing,
        ]
    );
}

#[test]
fn test_pipeline_continues_after_failure() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(dir.path());
    config.cube.include_mask = false;
    config.objects = vec![object_entry("BROKEN", 0), object_entry("NGC1374", 8)];
    let services = services(&config, SyntheticSource::new());

    let reports = run_pipeline(&config, &services, false, &mut ScriptedPrompt::default());
    assert_eq!(reports.len(), 2);
    assert_eq!(reports[0].name, "BROKEN");
    assert!(matches!(reports[0].result, Err(ScubesError::InvalidUserInput(_))));
    assert!(matches!(reports[1].result, Ok(AssemblyOutcome::Written { .. })));
}

#[test]
fn test_stage_commands() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let services = services(&config, SyntheticSource::new());
    let target = object_entry("NGC1374", 8).to_target().unwrap();

    let (report, detection) = acquire_stamps(&config, &services, &target, false, &no_progress()).unwrap();
    assert_eq!(report.written.len(), 24);
    assert!(detection.is_file());

    let calibrated = calibrate_target(&services, &target).unwrap();
    assert_eq!(calibrated.len(), 12);

    let mask = build_mask(&config, &services, &target, false, &mut ScriptedPrompt::keep(&[1]), &no_progress())
        .unwrap()
        .unwrap();
    assert!(mask.is_file());

    // An existing mask is kept without asking.
    let again = build_mask(&config, &services, &target, false, &mut ScriptedPrompt::default(), &no_progress())
        .unwrap();
    assert_eq!(again.as_deref(), Some(Path::new(&mask)));

    let quit = build_mask(
        &config,
        &services,
        &target,
        true,
        &mut ScriptedPrompt::new(["q"], Vec::<String>::new()),
        &no_progress(),
    )
    .unwrap();
    assert_eq!(quit, None);
}
