mod common;

use std::path::{Path, PathBuf};

use ndarray::Array2;
use scubes_core::error::ScubesError;
use scubes_core::extraction::background::{percentile, sigma_clipped_stats};
use scubes_core::extraction::components::label_components;
use scubes_core::extraction::sextractor::parse_ascii_head;
use scubes_core::extraction::{
    catalog_from_table, catalog_table, BuiltinExtractor, DetectionImage, ExtractorBackend, SExtractor,
    SExtractorSettings, SourceExtractor,
};
use scubes_core::io::fits_header::Header;
use scubes_core::stamp::Stamp;

use common::{add_gaussian, checkerboard, source};

/// Two point sources and one extended source on a flat sky.
fn field() -> Array2<f64> {
    let mut data = checkerboard(100, 100, 0.001);
    add_gaussian(&mut data, 20.0, 20.0, 1.5, 10.0);
    add_gaussian(&mut data, 20.0, 76.0, 1.5, 10.0);
    add_gaussian(&mut data, 70.0, 50.0, 5.0, 5.0);
    data
}

fn nearest(catalog: &[scubes_core::extraction::CatalogEntry], x: f64, y: f64) -> &scubes_core::extraction::CatalogEntry {
    catalog
        .iter()
        .min_by(|a, b| {
            let da = (a.x - x).hypot(a.y - y);
            let db = (b.x - x).hypot(b.y - y);
            da.total_cmp(&db)
        })
        .unwrap()
}

// ---------------------------------------------------------------------------
// Background statistics
// ---------------------------------------------------------------------------

#[test]
fn test_sigma_clipping_rejects_sources() {
    let mut data = checkerboard(50, 50, 0.5);
    data[[10, 10]] = 500.0;
    data[[30, 40]] = 800.0;
    let (sky, rms) = sigma_clipped_stats(&data, 3.0, 5);
    assert!(sky.abs() < 0.01, "sky {sky}");
    assert!((rms - 0.5).abs() < 0.01, "rms {rms}");
}

#[test]
fn test_percentile_interpolates() {
    let data = Array2::from_shape_vec((1, 5), vec![5.0, 1.0, 3.0, 2.0, 4.0]).unwrap();
    assert_eq!(percentile(&data, 50.0), Some(3.0));
    assert_eq!(percentile(&data, 25.0), Some(2.0));
    approx::assert_relative_eq!(percentile(&data, 10.0).unwrap(), 1.4, epsilon = 1e-12);
    assert_eq!(percentile(&Array2::from_elem((2, 2), f64::NAN), 50.0), None);
}

#[test]
fn test_components_use_eight_connectivity() {
    let mut mask = Array2::from_elem((6, 6), false);
    mask[[0, 0]] = true;
    mask[[1, 1]] = true;
    mask[[2, 2]] = true;
    mask[[4, 5]] = true;
    let labeling = label_components(&mask);
    assert_eq!(labeling.components.len(), 2);
    assert_eq!(labeling.labels[[0, 0]], labeling.labels[[2, 2]]);
    assert_ne!(labeling.labels[[0, 0]], labeling.labels[[4, 5]]);
    assert_eq!(labeling.labels[[3, 3]], 0);
}

// ---------------------------------------------------------------------------
// Builtin extractor
// ---------------------------------------------------------------------------

#[test]
fn test_builtin_finds_sources() {
    let stamp = Stamp::new(field(), Header::new());
    let path = PathBuf::from("det.fits");
    let extraction = BuiltinExtractor::default()
        .extract_sources(&DetectionImage {
            path: &path,
            stamp: &stamp,
        })
        .unwrap();

    let catalog = &extraction.catalog;
    assert_eq!(catalog.len(), 3);
    let numbers: Vec<u32> = catalog.iter().map(|e| e.number).collect();
    assert_eq!(numbers, vec![1, 2, 3]);

    let star = nearest(catalog, 20.0, 20.0);
    assert!((star.x - 20.0).abs() < 0.05 && (star.y - 20.0).abs() < 0.05);
    assert!(star.ellipticity < 0.05);
    assert!(star.mag_auto < 20.0);
    assert_eq!(extraction.segmentation[[20, 20]], star.number);
    assert_eq!(extraction.segmentation[[0, 99]], 0);

    let galaxy = nearest(catalog, 70.0, 50.0);
    assert!(galaxy.fwhm > 2.0 * star.fwhm);
    assert_eq!(extraction.segmentation[[50, 70]], galaxy.number);
}

#[test]
fn test_builtin_stellarity_separates_stars_from_galaxies() {
    let stamp = Stamp::new(field(), Header::new());
    let path = PathBuf::from("det.fits");
    let extraction = BuiltinExtractor::default()
        .extract_sources(&DetectionImage {
            path: &path,
            stamp: &stamp,
        })
        .unwrap();

    let catalog = &extraction.catalog;
    assert!(nearest(catalog, 20.0, 20.0).class_star > 0.9);
    assert!(nearest(catalog, 20.0, 76.0).class_star > 0.9);
    assert!(nearest(catalog, 70.0, 50.0).class_star < 0.1);
}

#[test]
fn test_builtin_on_flat_image_finds_nothing() {
    let stamp = Stamp::new(Array2::from_elem((20, 20), 3.0), Header::new());
    let path = PathBuf::from("flat.fits");
    let extraction = BuiltinExtractor::default()
        .extract_sources(&DetectionImage {
            path: &path,
            stamp: &stamp,
        })
        .unwrap();
    assert!(extraction.catalog.is_empty());
    assert!(extraction.segmentation.iter().all(|&v| v == 0));
}

// ---------------------------------------------------------------------------
// Catalogs
// ---------------------------------------------------------------------------

const ASCII_HEAD: &str = "\
#   1 NUMBER                 Running object number
#   2 X_IMAGE                Object position along x                                    [pixel]
#   3 Y_IMAGE                Object position along y                                    [pixel]
#   4 KRON_RADIUS            Kron apertures in units of A or B
#   5 ELLIPTICITY            1 - B_IMAGE/A_IMAGE
#   6 THETA_IMAGE            Position angle (CCW/x)                                     [deg]
#   7 A_IMAGE                Profile RMS along major axis                               [pixel]
#   8 B_IMAGE                Profile RMS along minor axis                               [pixel]
#   9 MAG_AUTO               Kron-like elliptical aperture magnitude                    [mag]
#  10 FWHM_IMAGE             FWHM assuming a gaussian core                              [pixel]
#  11 CLASS_STAR             S/G classifier output
         1     51.234     49.876  3.50   0.123   45.2   4.100   3.596  12.3456   8.12  0.029
         2     12.000     80.500  3.50   0.010  -12.0   1.300   1.287  17.9000   2.40  0.981
";

#[test]
fn test_parse_ascii_head_catalog() {
    let catalog = parse_ascii_head(ASCII_HEAD).unwrap();
    assert_eq!(catalog.len(), 2);
    let galaxy = &catalog[0];
    assert_eq!(galaxy.number, 1);
    assert!((galaxy.x - 50.234).abs() < 1e-9);
    assert!((galaxy.y - 48.876).abs() < 1e-9);
    assert_eq!(galaxy.theta, 45.2);
    assert_eq!(catalog[1].class_star, 0.981);
    assert_eq!(catalog[1].fwhm, 2.40);
}

#[test]
fn test_parse_ascii_head_requires_columns() {
    let text = "#   1 NUMBER\n#   2 X_IMAGE\n 1 10.0\n";
    assert!(matches!(parse_ascii_head(text), Err(ScubesError::ExtractionFailed(_))));
}

#[test]
fn test_catalog_table_is_one_based() {
    let catalog = vec![source(1, 9.0, 19.0, 2.0, 0.95), source(2, 30.5, 4.25, 6.0, 0.1)];
    let table = catalog_table(&catalog);
    assert_eq!(table.rows(), 2);
    match table.column("X_IMAGE") {
        Some(scubes_core::io::fits_table::ColumnData::Float(v)) => assert_eq!(v, &vec![10.0, 31.5]),
        other => panic!("unexpected X_IMAGE column {other:?}"),
    }
    assert_eq!(catalog_from_table(&table).unwrap(), catalog);
}

// ---------------------------------------------------------------------------
// SExtractor
// ---------------------------------------------------------------------------

fn argument(args: &[String], key: &str) -> Option<String> {
    args.iter()
        .position(|a| a == key)
        .and_then(|i| args.get(i + 1).cloned())
}

#[test]
fn test_sextractor_arguments() {
    let sex = SExtractor::default();
    let args = sex.arguments(
        Path::new("obj_det_scimas.fits"),
        0.95,
        1.25,
        Path::new("obj.param"),
        Path::new("obj.cat"),
        Path::new("obj.seg.fits"),
    );
    assert_eq!(args[0], "obj_det_scimas.fits");
    assert_eq!(argument(&args, "-GAIN").as_deref(), Some("0.95"));
    assert_eq!(argument(&args, "-SEEING_FWHM").as_deref(), Some("1.25"));
    assert_eq!(argument(&args, "-FILTER").as_deref(), Some("N"));
    assert_eq!(argument(&args, "-FILTER_NAME"), None);
    assert_eq!(argument(&args, "-DETECT_THRESH").as_deref(), Some("1.1"));
    assert_eq!(argument(&args, "-DETECT_MINAREA").as_deref(), Some("4"));
    assert_eq!(argument(&args, "-SATUR_LEVEL").as_deref(), Some("1600"));
    assert_eq!(argument(&args, "-BACK_SIZE").as_deref(), Some("54"));
    assert_eq!(argument(&args, "-CATALOG_TYPE").as_deref(), Some("ASCII_HEAD"));
    assert_eq!(argument(&args, "-CHECKIMAGE_TYPE").as_deref(), Some("SEGMENTATION"));
    assert_eq!(argument(&args, "-CHECKIMAGE_NAME").as_deref(), Some("obj.seg.fits"));
}

#[test]
fn test_sextractor_arguments_with_filter() {
    let sex = SExtractor::new(SExtractorSettings {
        filter_name: Some(PathBuf::from("sex_data/tophat_3.0_3x3.conv")),
        starnnw_name: Some(PathBuf::from("sex_data/default.nnw")),
        back_size: 256,
        ..SExtractorSettings::default()
    });
    let args = sex.arguments(
        Path::new("d.fits"),
        1.0,
        1.0,
        Path::new("p"),
        Path::new("c"),
        Path::new("s"),
    );
    assert_eq!(argument(&args, "-FILTER").as_deref(), Some("Y"));
    assert_eq!(argument(&args, "-FILTER_NAME").as_deref(), Some("sex_data/tophat_3.0_3x3.conv"));
    assert_eq!(argument(&args, "-STARNNW_NAME").as_deref(), Some("sex_data/default.nnw"));
    assert_eq!(argument(&args, "-BACK_SIZE").as_deref(), Some("256"));
}

fn detection_with(keys: &[(&str, f64)]) -> Stamp {
    let mut header = Header::new();
    for (k, v) in keys {
        header.set(k, *v);
    }
    Stamp::new(Array2::zeros((8, 8)), header)
}

#[test]
fn test_sextractor_requires_gain() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("det.fits");
    let stamp = detection_with(&[("PSFFWHM", 1.2)]);
    let err = SExtractor::default()
        .extract_sources(&DetectionImage {
            path: &path,
            stamp: &stamp,
        })
        .unwrap_err();
    assert!(matches!(err, ScubesError::MissingHeaderKey { ref key, .. } if key == "GAIN"));
}

#[test]
fn test_sextractor_missing_executable() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("det.fits");
    let stamp = detection_with(&[("GAIN", 1.0), ("PSFFWHM", 1.2)]);
    stamp.write(&path).unwrap();

    let sex = SExtractor::new(SExtractorSettings {
        executable: dir.path().join("no-such-sextractor"),
        ..SExtractorSettings::default()
    });
    let err = sex
        .extract_sources(&DetectionImage {
            path: &path,
            stamp: &stamp,
        })
        .unwrap_err();
    assert!(matches!(err, ScubesError::ExtractionFailed(_)));
    assert!(!path.with_extension("param").exists());
}

/// Stand-in for the SExtractor executable: keeps a copy of the parameter
/// file and writes the catalog and segmentation prepared in `dir`.
#[cfg(unix)]
fn fake_sextractor(dir: &Path) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let dir = dir.display();
    let script = format!(
        "#!/bin/sh
while [ $# -gt 0 ]; do
  case \"$1\" in
    -PARAMETERS_NAME) cp \"$2\" \"{dir}/params.txt\"; shift ;;
    -CATALOG_NAME) cp \"{dir}/catalog.txt\" \"$2\"; shift ;;
    -CHECKIMAGE_NAME) cp \"{dir}/segmentation.fits\" \"$2\"; shift ;;
  esac
  shift
done
"
    );
    let path = PathBuf::from(format!("{dir}/sex"));
    std::fs::write(&path, script).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

#[cfg(unix)]
#[test]
fn test_sextractor_run_reads_outputs_and_cleans_up() {
    let dir = tempfile::tempdir().unwrap();
    let work = dir.path().join("obj");
    std::fs::create_dir_all(&work).unwrap();
    let path = work.join("det.fits");
    let stamp = detection_with(&[("GAIN", 1.0), ("PSFFWHM", 1.2)]);
    stamp.write(&path).unwrap();

    std::fs::write(dir.path().join("catalog.txt"), ASCII_HEAD).unwrap();
    let mut segmentation = Array2::zeros((8, 8));
    segmentation[[2, 3]] = 2.0;
    segmentation[[5, 5]] = 1.0;
    Stamp::new(segmentation, Header::new())
        .write(&dir.path().join("segmentation.fits"))
        .unwrap();

    let sex = SExtractor::new(SExtractorSettings {
        executable: fake_sextractor(dir.path()),
        ..SExtractorSettings::default()
    });
    let extraction = sex
        .extract_sources(&DetectionImage {
            path: &path,
            stamp: &stamp,
        })
        .unwrap();
    assert_eq!(extraction.catalog.len(), 2);
    assert_eq!(extraction.segmentation[[2, 3]], 2);
    assert_eq!(extraction.segmentation[[5, 5]], 1);
    assert_eq!(extraction.segmentation[[0, 0]], 0);

    let params = std::fs::read_to_string(dir.path().join("params.txt")).unwrap();
    assert!(params.starts_with("NUMBER\nX_IMAGE\n"));

    // Only the detection stamp is left in the object directory.
    let left: Vec<_> = std::fs::read_dir(&work)
        .unwrap()
        .map(|e| e.unwrap().file_name())
        .collect();
    assert_eq!(left, vec![std::ffi::OsString::from("det.fits")]);
}

#[test]
fn test_extractor_backend_display() {
    assert_eq!(format!("{}", ExtractorBackend::SExtractor), "SExtractor");
    assert_eq!(format!("{}", ExtractorBackend::Builtin), "Builtin");
    assert_eq!(ExtractorBackend::default(), ExtractorBackend::SExtractor);
}
