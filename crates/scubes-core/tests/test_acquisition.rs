mod common;

use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;

use fitsio::images::{ImageDescription, ImageType};
use ndarray::Array2;
use scubes_core::acquisition::{
    probe, window_start, LocalTileSource, Probe, SkipReason, StampMaker, StampSource,
};
use scubes_core::artifacts::ArtifactLayout;
use scubes_core::bands::Band;
use scubes_core::error::ScubesError;
use scubes_core::io::fits::{Bitpix, FitsFile, Hdu, ImageData};
use scubes_core::io::fits_header::{Header, Value};
use scubes_core::io::fits_writer::write_hdus;
use scubes_core::stamp::{Stamp, StampKind};
use scubes_core::target::Target;
use scubes_core::wcs::{SkyPosition, Wcs};

use common::{target, SyntheticSource, DEC, PIXEL_DEG, RA, TILE};

const TILE_SIZE: usize = 200;

fn tile_wcs() -> Wcs {
    Wcs::tan([RA, DEC], [100.5, 100.5], PIXEL_DEG)
}

/// Tile pixel value: `row * 1000 + col`.
fn tile_data() -> Array2<f64> {
    Array2::from_shape_fn((TILE_SIZE, TILE_SIZE), |(r, c)| (r * 1000 + c) as f64)
}

fn write_tile(path: &Path, filter: &str) {
    let mut header = Header::new();
    header.set("OBJECT", TILE);
    header.set("FILTER", filter);
    header.set("GAIN", 0.95);
    header.set("EXPTIME", 99.0);
    header.set("NCOMBINE", 3i64);
    header.set("EFECTIME", 297.0);
    header.set("OAJ PRO FWHMMEAN", 1.25);
    header.set("ORIGIN", "survey pipeline");
    tile_wcs().apply_to(&mut header, false);
    write_hdus(path, &[Hdu::image(header, ImageData::from_array2(Bitpix::F32, &tile_data()))]).unwrap();
}

/// Write the tile the way survey `.fz` files store it: an empty primary HDU
/// followed by a Rice-compressed image extension.
fn write_compressed_tile(path: &Path, filter: &str) {
    let mut fits = fitsio::FitsFile::create(format!("{}[compress]", path.display()))
        .open()
        .unwrap();
    let description = ImageDescription {
        data_type: ImageType::Long,
        dimensions: &[TILE_SIZE, TILE_SIZE],
    };
    let hdu = fits.create_image("COMPRESSED_IMAGE", &description).unwrap();
    let pixels: Vec<i32> = tile_data().iter().map(|&v| v as i32).collect();
    hdu.write_image(&mut fits, &pixels).unwrap();

    let mut header = Header::new();
    header.set("OBJECT", TILE);
    header.set("FILTER", filter);
    header.set("GAIN", 0.95);
    tile_wcs().apply_to(&mut header, false);
    for card in header.cards() {
        match &card.value {
            Some(Value::Float(v)) => hdu.write_key(&mut fits, &card.keyword, *v).unwrap(),
            Some(Value::Integer(v)) => hdu.write_key(&mut fits, &card.keyword, *v).unwrap(),
            Some(Value::Text(v)) => hdu.write_key(&mut fits, &card.keyword, v.as_str()).unwrap(),
            _ => {}
        }
    }
}

fn tiles_dir() -> (tempfile::TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let tiles = dir.path().join("tiles");
    std::fs::create_dir_all(tiles.join(TILE)).unwrap();
    (dir, tiles)
}

// ---------------------------------------------------------------------------
// Tile lookup
// ---------------------------------------------------------------------------

#[test]
fn test_band_candidates_order() {
    let source = LocalTileSource::new("/tiles");
    let candidates = source.band_candidates(TILE, Band::F660, StampKind::Weight);
    let expected: Vec<PathBuf> = [
        "/tiles/HYDRA-0045/HYDRA-0045_F660_swpweight.fits",
        "/tiles/HYDRA-0045/HYDRA-0045_F660_swpweight.fits.fz",
        "/tiles/HYDRA-0045/HYDRA-0045_F660_swpweight.fz",
        "/tiles/HYDRA-0045_F660_swpweight.fits",
        "/tiles/HYDRA-0045_F660_swpweight.fits.fz",
        "/tiles/HYDRA-0045_F660_swpweight.fz",
    ]
    .iter()
    .map(PathBuf::from)
    .collect();
    assert_eq!(candidates, expected);
}

#[test]
fn test_detection_candidates() {
    let source = LocalTileSource::new("/tiles").with_band_extensions(&[".fits"]);
    let candidates = source.detection_candidates(TILE);
    assert_eq!(candidates[0], PathBuf::from("/tiles/HYDRA-0045/HYDRA-0045_det_scimas.fits"));
    assert_eq!(candidates.len(), 4);
    assert_eq!(source.band_candidates(TILE, Band::U, StampKind::Data).len(), 2);
}

#[test]
fn test_probe_reports_absent_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("none.fits");
    assert!(matches!(probe(&path).unwrap(), Probe::Absent(p) if p == path));
}

#[test]
fn test_probe_propagates_corrupt_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bad.fits");
    std::fs::write(&path, b"not a fits file at all").unwrap();
    assert!(matches!(probe(&path), Err(ScubesError::InvalidFits(_))));
}

#[test]
fn test_missing_tile_is_tile_not_found() {
    let (_dir, tiles) = tiles_dir();
    let source = LocalTileSource::new(&tiles);
    let err = source.fetch_cutout(&target("NGC1374", 20), Band::G, StampKind::Data).unwrap_err();
    assert!(matches!(err, ScubesError::TileNotFound(_)));
}

// ---------------------------------------------------------------------------
// Cutouts
// ---------------------------------------------------------------------------

#[test]
fn test_window_start() {
    assert_eq!(window_start(99.5, 20), 90);
    assert_eq!(window_start(10.0, 5), 8);
    assert_eq!(window_start(-3.2, 4), -5);
}

#[test]
fn test_cutout_from_tile_subdirectory() {
    let (_dir, tiles) = tiles_dir();
    write_tile(&tiles.join(TILE).join(format!("{TILE}_G_swp.fits")), "G");
    let source = LocalTileSource::new(&tiles);

    let stamp = source.fetch_cutout(&target("NGC1374", 20), Band::G, StampKind::Data).unwrap();
    assert_eq!(stamp.data.dim(), (20, 20));
    // Window starts at tile pixel (90, 90).
    assert_eq!(stamp.data[[0, 0]], 90_090.0);
    assert_eq!(stamp.data[[19, 3]], 109_093.0);

    let h = &stamp.header;
    assert_eq!(h.get_str("OBJECT"), Some("NGC1374"));
    assert_eq!(h.get_str("TILE"), Some(TILE));
    assert_eq!(h.get_str("FILTER"), Some("G"));
    assert_eq!(h.get_f64("GAIN"), Some(0.95));
    assert_eq!(h.get_f64("PSFFWHM"), Some(1.25));
    assert_eq!(h.get_f64("EFFTIME"), Some(297.0));
    assert_eq!(h.get_i64("NCOMBINE"), Some(3));
    assert_eq!(h.get_f64("X0TILE"), Some(100.5));
    assert_eq!(h.get_f64("Y0TILE"), Some(100.5));
    assert!(!h.contains("ORIGIN"));

    let wcs = Wcs::from_header(h).unwrap();
    assert_eq!(wcs.crpix, [10.5, 10.5]);
    let (x, y) = wcs.world_to_pixel(&SkyPosition::new(RA, DEC).unwrap()).unwrap();
    assert_eq!((x, y), (9.5, 9.5));
}

#[test]
fn test_weight_cutout_has_no_effective_time() {
    let (_dir, tiles) = tiles_dir();
    write_tile(&tiles.join(format!("{TILE}_G_swpweight.fits")), "G");
    let source = LocalTileSource::new(&tiles);
    let stamp = source.fetch_cutout(&target("NGC1374", 20), Band::G, StampKind::Weight).unwrap();
    assert!(!stamp.header.contains("EFFTIME"));
    assert!(!stamp.header.contains("NCOMBINE"));
    assert_eq!(stamp.header.get_f64("PSFFWHM"), Some(1.25));
}

#[test]
fn test_cutout_near_edge_is_zero_filled() {
    let (_dir, tiles) = tiles_dir();
    write_tile(&tiles.join(format!("{TILE}_R_swp.fits")), "R");
    let source = LocalTileSource::new(&tiles);

    let mut t = target("EDGE", 20);
    t.position = tile_wcs().pixel_to_world(2.3, 99.5);
    let stamp = source.fetch_cutout(&t, Band::R, StampKind::Data).unwrap();
    // Window starts at column -7.
    for row in [0, 10, 19] {
        assert_eq!(stamp.data[[row, 0]], 0.0);
        assert_eq!(stamp.data[[row, 6]], 0.0);
    }
    assert_eq!(stamp.data[[10, 7]], 100_000.0);
    assert_eq!(stamp.data[[10, 8]], 100_001.0);
}

#[test]
fn test_cutout_off_tile_is_out_of_bounds() {
    let (_dir, tiles) = tiles_dir();
    write_tile(&tiles.join(format!("{TILE}_R_swp.fits")), "R");
    let source = LocalTileSource::new(&tiles);

    let t = Target {
        position: SkyPosition::new(RA + 1.0, DEC).unwrap(),
        ..target("FAR", 20)
    };
    let err = source.fetch_cutout(&t, Band::R, StampKind::Data).unwrap_err();
    assert!(matches!(err, ScubesError::CutoutOutOfBounds { size: 20, .. }));
}

#[test]
fn test_compressed_tile_reads_as_image() {
    let (_dir, tiles) = tiles_dir();
    let path = tiles.join(format!("{TILE}_I_swp.fits.fz"));
    write_compressed_tile(&path, "I");

    let file = FitsFile::open(&path).unwrap();
    assert_eq!(file.first_image(), Some(1));
    assert_eq!(file.image_shape(1), Some(&[TILE_SIZE, TILE_SIZE][..]));
    let header = file.header(1).unwrap();
    assert_eq!(header.get_str("XTENSION"), Some("IMAGE"));
    assert_eq!(header.get_i64("BITPIX"), Some(32));
    assert_eq!(header.get_i64("NAXIS1"), Some(TILE_SIZE as i64));
    assert_eq!(header.get_str("FILTER"), Some("I"));
    assert!(!header.contains("ZIMAGE"));
    assert!(!header.contains("ZNAXIS1"));
}

#[test]
fn test_cutout_from_compressed_tile() {
    let (_dir, tiles) = tiles_dir();
    write_compressed_tile(&tiles.join(format!("{TILE}_I_swp.fits.fz")), "I");
    let source = LocalTileSource::new(&tiles);

    let stamp = source.fetch_cutout(&target("NGC1374", 20), Band::I, StampKind::Data).unwrap();
    assert_eq!(stamp.data.dim(), (20, 20));
    assert_eq!(stamp.data[[0, 0]], 90_090.0);
    assert_eq!(stamp.data[[19, 3]], 109_093.0);
    assert_eq!(stamp.header.get_str("FILTER"), Some("I"));
    assert_eq!(stamp.header.get_f64("GAIN"), Some(0.95));
    assert!(!stamp.header.contains("ZIMAGE"));
}

#[test]
fn test_detection_falls_back_to_compressed_image() {
    let (_dir, tiles) = tiles_dir();
    write_compressed_tile(&tiles.join(TILE).join(format!("{TILE}_det_scimas.fits.fz")), "DET");
    let source = LocalTileSource::new(&tiles);
    let stamp = source.fetch_detection(&target("NGC1374", 10)).unwrap();
    assert_eq!(stamp.data[[0, 0]], 95_095.0);
}

#[test]
fn test_detection_cutout() {
    let (_dir, tiles) = tiles_dir();
    write_tile(&tiles.join(format!("{TILE}_det_scimas.fits")), "DET");
    let source = LocalTileSource::new(&tiles);
    let stamp = source.fetch_detection(&target("NGC1374", 10)).unwrap();
    assert_eq!(stamp.data.dim(), (10, 10));
    assert_eq!(stamp.data[[0, 0]], 95_095.0);
    assert_eq!(stamp.header.get_str("OBJECT"), Some("NGC1374"));
}

// ---------------------------------------------------------------------------
// Stamp maker
// ---------------------------------------------------------------------------

#[test]
fn test_make_stamps_writes_every_band() {
    let dir = tempfile::tempdir().unwrap();
    let layout = ArtifactLayout::new(dir.path());
    let t = target("NGC1374", 12);
    let source = SyntheticSource::new();

    let report = StampMaker::new(&source, &layout).make_stamps(&t, &Band::ALL, false).unwrap();
    assert_eq!(report.written.len(), 24);
    assert!(report.skipped.is_empty());
    assert_eq!(layout.count_stamps(&t, &Band::ALL), 24);

    let path = layout.stamp(&t, Band::F515, StampKind::Weight);
    assert!(path.ends_with("NGC1374/NGC1374_HYDRA-0045_F515_12x12_swpweight.fits"));
    let stamp = Stamp::read(&path).unwrap();
    assert_eq!(stamp.data[[5, 5]], 4.0);
}

#[test]
fn test_make_stamps_keeps_existing_files() {
    let dir = tempfile::tempdir().unwrap();
    let layout = ArtifactLayout::new(dir.path());
    let t = target("NGC1374", 12);
    let source = SyntheticSource::new();
    let fetches = source.fetch_count();
    let maker = StampMaker::new(&source, &layout);

    maker.make_stamps(&t, &Band::ALL, false).unwrap();
    assert_eq!(fetches.load(Ordering::SeqCst), 24);

    let again = maker.make_stamps(&t, &Band::ALL, false).unwrap();
    assert_eq!(again.existing, 24);
    assert!(again.written.is_empty());
    assert_eq!(fetches.load(Ordering::SeqCst), 24);

    let redo = maker.make_stamps(&t, &[Band::G], true).unwrap();
    assert_eq!(redo.written.len(), 2);
    assert_eq!(fetches.load(Ordering::SeqCst), 26);
}

#[test]
fn test_make_stamps_skips_missing_tiles() {
    let dir = tempfile::tempdir().unwrap();
    let layout = ArtifactLayout::new(dir.path());
    let t = target("NGC1374", 12);
    let source = SyntheticSource::new().without(Band::F378);

    let report = StampMaker::new(&source, &layout).make_stamps(&t, &Band::ALL, false).unwrap();
    assert_eq!(report.written.len(), 22);
    assert_eq!(report.skipped.len(), 2);
    assert!(report
        .skipped
        .iter()
        .all(|(band, _, reason)| *band == Band::F378 && matches!(reason, SkipReason::TileMissing(_))));
    assert_eq!(layout.count_stamps(&t, &Band::ALL), 22);
}

#[test]
fn test_make_stamps_skips_blank_cutouts() {
    let dir = tempfile::tempdir().unwrap();
    let layout = ArtifactLayout::new(dir.path());
    let t = target("NGC1374", 12);
    let source = SyntheticSource {
        counts: 0.0,
        ..SyntheticSource::new()
    };

    let report = StampMaker::new(&source, &layout).make_stamps(&t, &[Band::U], false).unwrap();
    assert_eq!(report.written.len(), 1);
    assert_eq!(report.skipped, vec![(Band::U, StampKind::Data, SkipReason::Blank)]);
    assert!(!layout.stamp(&t, Band::U, StampKind::Data).exists());
}

#[test]
fn test_make_detection_once() {
    let dir = tempfile::tempdir().unwrap();
    let layout = ArtifactLayout::new(dir.path());
    let t = target("NGC1374", 12);
    let source = SyntheticSource::new();
    let fetches = source.fetch_count();
    let maker = StampMaker::new(&source, &layout);

    let path = maker.make_detection(&t, false).unwrap();
    assert_eq!(path, layout.detection(&t));
    assert!(path.is_file());
    maker.make_detection(&t, false).unwrap();
    assert_eq!(fetches.load(Ordering::SeqCst), 1);
}

#[test]
fn test_count_stamps_ignores_other_sizes_and_products() {
    let dir = tempfile::tempdir().unwrap();
    let layout = ArtifactLayout::new(dir.path());
    let t = target("NGC1374", 12);
    let source = SyntheticSource::new();
    StampMaker::new(&source, &layout).make_stamps(&t, &[Band::R], false).unwrap();
    StampMaker::new(&source, &layout).make_detection(&t, false).unwrap();
    let other_size = target("NGC1374", 30);
    StampMaker::new(&source, &layout).make_stamps(&other_size, &[Band::R], false).unwrap();

    assert_eq!(layout.count_stamps(&t, &Band::ALL), 2);
    assert_eq!(layout.count_stamps(&target("NGC1399", 12), &Band::ALL), 0);
    // Data stamps of every size are calibrated.
    assert_eq!(layout.data_stamps(&t).unwrap().len(), 2);
}

#[test]
fn test_count_stamps_only_counts_requested_bands() {
    let dir = tempfile::tempdir().unwrap();
    let layout = ArtifactLayout::new(dir.path());
    let t = target("NGC1374", 12);
    let source = SyntheticSource::new().without(Band::G);
    StampMaker::new(&source, &layout).make_stamps(&t, &Band::ALL, false).unwrap();

    assert_eq!(layout.count_stamps(&t, &[Band::R, Band::U]), 4);
    assert_eq!(layout.count_stamps(&t, &[Band::R, Band::G, Band::U]), 4);
    assert_eq!(layout.count_stamps(&t, &[]), 0);
}
