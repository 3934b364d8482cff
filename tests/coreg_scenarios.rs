//! End to end coregistration scenarios on synthetic imagery.

use approx::assert_abs_diff_eq;
use coreg::{
    BadDataMask, CellSize, Coreg, CoregConfig, DenseArray, DenseRaster, Error, GeoReference, GridRole, Point, RasterSize,
    RasterView, RunState, geometry, resample,
};

/// Deterministic pseudo random sequence.
struct Lcg(u64);

impl Lcg {
    fn new(seed: u64) -> Self {
        Lcg(seed.wrapping_mul(2685821657736338717).wrapping_add(1))
    }

    fn next_f64(&mut self) -> f64 {
        self.0 = self.0.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        (self.0 >> 33) as f64 / u32::MAX as f64
    }
}

/// 256x256 checkerboard (32 px squares) with a smooth random undulation on
/// top, so the spectrum carries broadband content.
fn checkerboard() -> DenseArray<f64> {
    const SIZE: usize = 256;
    const COARSE: usize = 8;

    let mut rng = Lcg::new(42);
    let coarse_cols = SIZE / COARSE + 2;
    let coarse: Vec<f64> = (0..coarse_cols * coarse_cols).map(|_| (rng.next_f64() - 0.5) * 40.0).collect();

    let mut data = Vec::with_capacity(SIZE * SIZE);
    for row in 0..SIZE {
        for col in 0..SIZE {
            let checker = if (row / 32 + col / 32) % 2 == 0 { 60.0 } else { -60.0 };

            let fy = row as f64 / COARSE as f64;
            let fx = col as f64 / COARSE as f64;
            let (iy, ix) = (fy.floor() as usize, fx.floor() as usize);
            let (ty, tx) = (fy.fract(), fx.fract());
            let at = |r: usize, c: usize| coarse[r * coarse_cols + c];
            let smooth = at(iy, ix) * (1.0 - ty) * (1.0 - tx)
                + at(iy, ix + 1) * (1.0 - ty) * tx
                + at(iy + 1, ix) * ty * (1.0 - tx)
                + at(iy + 1, ix + 1) * ty * tx;

            data.push(128.0 + checker + smooth);
        }
    }

    DenseArray::new(RasterSize::square(SIZE as i32), data).unwrap()
}

fn noise(seed: u64) -> DenseArray<f64> {
    let mut rng = Lcg::new(seed);
    let data = (0..256 * 256).map(|_| rng.next_f64() * 255.0).collect();
    DenseArray::new(RasterSize::square(256), data).unwrap()
}

/// `out[r][c] = src[r + dy][c + dx]`, padded with `fill`.
fn translated(src: &DenseArray<f64>, dx: i32, dy: i32, fill: f64) -> DenseArray<f64> {
    let rows = src.rows() as i32;
    let cols = src.columns() as i32;

    let mut data = Vec::with_capacity(src.as_slice().len());
    for row in 0..rows {
        for col in 0..cols {
            let (src_row, src_col) = (row + dy, col + dx);
            if src_row >= 0 && src_row < rows && src_col >= 0 && src_col < cols {
                data.push(src.value(src_row as usize, src_col as usize));
            } else {
                data.push(fill);
            }
        }
    }

    DenseArray::new(src.size(), data).unwrap()
}

fn raster_at(data: DenseArray<f64>, top_left: Point, nodata: Option<f64>) -> DenseRaster {
    let georef = GeoReference::with_top_left_origin("EPSG:32632", data.size(), top_left, CellSize::square(1.0), nodata);
    DenseRaster::with_single_band(georef, data).unwrap()
}

fn raster(data: DenseArray<f64>) -> DenseRaster {
    raster_at(data, Point::new(0.0, 256.0), None)
}

#[test_log::test]
fn identity_yields_a_zero_shift() {
    let reference = raster(checkerboard());
    let target = raster(checkerboard());

    let mut coreg = Coreg::new(&reference, &target, CoregConfig::default());
    let result = coreg.run().unwrap().clone();

    assert_eq!(coreg.state(), RunState::Success);
    assert_eq!(result.success, Some(true));
    assert!(coreg.errors().is_empty());

    assert_abs_diff_eq!(result.x_shift_px.unwrap(), 0.0, epsilon = 1e-2);
    assert_abs_diff_eq!(result.y_shift_px.unwrap(), 0.0, epsilon = 1e-2);
    assert!(result.reliability.unwrap() >= 95.0, "reliability: {:?}", result.reliability);

    // a (near) zero shift cannot change the similarity
    let before = result.ssim_before.unwrap();
    let after = result.ssim_after.unwrap();
    assert!(before > 0.999, "ssim before: {before}");
    assert_abs_diff_eq!(before, after, epsilon = 1e-3);
}

#[test_log::test]
fn integer_shift_is_detected_exactly() {
    let pattern = checkerboard();
    let reference = raster_at(pattern.clone(), Point::new(0.0, 256.0), Some(-9999.0));
    let target = raster_at(translated(&pattern, 3, -2, 128.0), Point::new(0.0, 256.0), Some(-9999.0));

    let mut coreg = Coreg::new(&reference, &target, CoregConfig::default());
    let result = coreg.run().unwrap().clone();

    assert_eq!(result.success, Some(true));
    assert_abs_diff_eq!(result.x_shift_px.unwrap(), 3.0, epsilon = 0.05);
    assert_abs_diff_eq!(result.y_shift_px.unwrap(), -2.0, epsilon = 0.05);

    // map shifts follow the north-up geotransform
    assert_abs_diff_eq!(result.x_shift_map.unwrap(), 3.0, epsilon = 0.05);
    assert_abs_diff_eq!(result.y_shift_map.unwrap(), 2.0, epsilon = 0.05);
    assert_abs_diff_eq!(result.vec_length_map.unwrap(), 13.0_f64.sqrt(), epsilon = 0.1);

    // angle/length consistency
    let angle = geometry::angle_to_north(result.x_shift_px.unwrap(), result.y_shift_px.unwrap());
    assert_abs_diff_eq!(result.vec_angle_deg.unwrap(), angle, epsilon = 1e-6);
    assert_abs_diff_eq!(angle, f64::atan2(3.0, 2.0).to_degrees(), epsilon = 0.5);

    assert!(result.reliability.unwrap() >= 80.0, "reliability: {:?}", result.reliability);

    // correcting the shift must improve the similarity within the window
    assert_eq!(result.ssim_improved(), Some(true));

    let report = coreg.report();
    assert_eq!(report.success, Some(true));
    assert_abs_diff_eq!(report.updated_map_info.as_ref().unwrap().origin_x, 3.0, epsilon = 0.05);
    assert_abs_diff_eq!(report.updated_map_info.as_ref().unwrap().origin_y, 258.0, epsilon = 0.05);
    assert_eq!(report.reference_grid, [[0.0, 1.0], [256.0, 255.0]]);
}

#[test_log::test]
fn subpixel_shift_is_recovered() {
    let pattern = checkerboard();
    let reference = raster(pattern.clone());

    // resample the pattern from a grid whose origin is moved by the inverse
    // of the wanted sub-pixel shift
    let src_georef = GeoReference::with_top_left_origin(
        "EPSG:32632",
        pattern.size(),
        Point::new(-0.37, 256.0 - 0.82),
        CellSize::square(1.0),
        None,
    );
    let dst_georef = reference.geo_reference().clone();
    let shifted = resample::resample(&pattern, &src_georef, &dst_georef, resample::ResampleAlg::Cubic, resample::NumThreads::Count(1)).unwrap();
    let target = raster(shifted);

    let mut coreg = Coreg::new(&reference, &target, CoregConfig::default());
    let result = coreg.run().unwrap().clone();

    assert_eq!(result.success, Some(true));
    assert_abs_diff_eq!(result.x_shift_px.unwrap(), 0.37, epsilon = 0.1);
    assert_abs_diff_eq!(result.y_shift_px.unwrap(), -0.82, epsilon = 0.1);
}

#[test_log::test]
fn a_finer_target_grid_matches_on_the_target_and_deshifts_the_reference() {
    let pattern = checkerboard();

    // coarser reference: the pattern block averaged onto a 2 m grid
    let fine_georef = GeoReference::with_top_left_origin(
        "EPSG:32632",
        pattern.size(),
        Point::new(0.0, 256.0),
        CellSize::square(1.0),
        None,
    );
    let coarse_georef = GeoReference::with_top_left_origin(
        "EPSG:32632",
        RasterSize::square(128),
        Point::new(0.0, 256.0),
        CellSize::square(2.0),
        None,
    );
    let coarse = resample::resample(
        &pattern,
        &fine_georef,
        &coarse_georef,
        resample::ResampleAlg::Average,
        resample::NumThreads::Count(1),
    )
    .unwrap();
    let reference = DenseRaster::with_single_band(coarse_georef, coarse).unwrap();

    // finer target with its content 2 px off
    let target = raster(translated(&pattern, 2, 0, 128.0));

    let mut coreg = Coreg::new(&reference, &target, CoregConfig::default());
    let result = coreg.run().unwrap().clone();

    // the target provides the finer grid, so matching runs on the target grid
    assert_eq!(coreg.window_plan().unwrap().grid2use, GridRole::Target);
    assert_eq!(result.success, Some(true));
    assert_abs_diff_eq!(result.x_shift_px.unwrap(), 2.0, epsilon = 0.2);
    assert_abs_diff_eq!(result.y_shift_px.unwrap(), 0.0, epsilon = 0.2);
    assert_abs_diff_eq!(result.x_shift_map.unwrap(), 2.0, epsilon = 0.2);

    // the similarity check deshifts the reference window with the inverted
    // correction; a geometrically correct deshift must improve the score
    assert_eq!(result.ssim_improved(), Some(true));
}

#[test_log::test]
fn too_large_shifts_are_rejected() {
    let pattern = checkerboard();
    let reference = raster(pattern.clone());
    let target = raster(translated(&pattern, 10, 10, 128.0));

    let mut coreg = Coreg::new(&reference, &target, CoregConfig::default());
    let result = coreg.run();

    assert!(matches!(result, Err(Error::ShiftTooLarge { .. })), "got {result:?}");
    assert_eq!(coreg.state(), RunState::Failed);
    assert_eq!(coreg.result().success, Some(false));
}

#[test_log::test]
fn ignored_errors_end_up_in_the_error_log() {
    let pattern = checkerboard();
    let reference = raster(pattern.clone());
    let target = raster(translated(&pattern, 10, 10, 128.0));

    let config = CoregConfig {
        ignore_errors: true,
        ..CoregConfig::default()
    };
    let mut coreg = Coreg::new(&reference, &target, config);
    let result = coreg.run().unwrap().clone();

    assert_eq!(result.success, Some(false));
    assert_eq!(result.x_shift_px, None);
    assert_eq!(result.y_shift_px, None);
    assert_eq!(coreg.errors().len(), 1);
    assert!(matches!(coreg.errors()[0], Error::ShiftTooLarge { .. }));
}

#[test_log::test]
fn disjoint_footprints_fail_with_insufficient_overlap() {
    let reference = raster(checkerboard());
    let target = raster_at(checkerboard(), Point::new(10_000.0, 256.0), None);

    let mut coreg = Coreg::new(&reference, &target, CoregConfig::default());
    let result = coreg.run();

    assert!(matches!(result, Err(Error::InsufficientOverlap(_))), "got {result:?}");
}

#[test_log::test]
fn a_too_small_overlap_fails() {
    let reference = raster(checkerboard());
    // overlap of exactly 16x16 pixels
    let target = raster_at(checkerboard(), Point::new(240.0, 16.0), None);

    let mut coreg = Coreg::new(&reference, &target, CoregConfig::default());
    let result = coreg.run();

    assert!(matches!(result, Err(Error::InsufficientOverlap(_))), "got {result:?}");
}

#[test_log::test]
fn unequal_projections_are_rejected() {
    let reference = raster(checkerboard());
    let data = checkerboard();
    let georef = GeoReference::with_top_left_origin("EPSG:4326", data.size(), Point::new(0.0, 256.0), CellSize::square(1.0), None);
    let target = DenseRaster::with_single_band(georef, data).unwrap();

    let mut coreg = Coreg::new(&reference, &target, CoregConfig::default());
    let result = coreg.run();

    assert!(matches!(result, Err(Error::UnequalProjections { .. })), "got {result:?}");
    assert_eq!(coreg.result().x_shift_px, None);
}

#[test_log::test]
fn a_window_position_on_bad_data_is_rejected() {
    let reference = raster(checkerboard());
    let target = raster(checkerboard());

    // everything is marked bad, including the overlap centroid
    let mask_data = DenseArray::filled_with(true, RasterSize::square(256));
    let mask = BadDataMask::new(reference.geo_reference().clone(), mask_data).unwrap();

    let config = CoregConfig {
        mask_baddata_ref: Some(mask),
        ..CoregConfig::default()
    };
    let mut coreg = Coreg::new(&reference, &target, config);
    let result = coreg.run();

    assert!(matches!(result, Err(Error::WindowInBadData { .. })), "got {result:?}");
}

#[test_log::test]
fn unrelated_content_runs_out_of_iterations() {
    let reference = raster(noise(7));
    let target = raster(noise(8));

    let mut coreg = Coreg::new(&reference, &target, CoregConfig::default());
    let result = coreg.run();

    // bounded by max_iter (or the window collapsing), never an endless loop
    assert!(
        matches!(result, Err(Error::NoMatchFound(_)) | Err(Error::WindowTooSmall(_))),
        "got {result:?}"
    );
    assert_eq!(coreg.state(), RunState::Failed);
}

#[test_log::test]
fn diagnostics_are_written_best_effort() {
    let dir = tempfile::tempdir().unwrap();
    let reference = raster(checkerboard());
    let target = raster(checkerboard());

    let config = CoregConfig {
        path_verbose_out: Some(dir.path().to_path_buf()),
        ..CoregConfig::default()
    };
    let mut coreg = Coreg::new(&reference, &target, config);
    coreg.run().unwrap();

    for name in ["poly_imref.wkt", "poly_im2shift.wkt", "overlap_poly.wkt", "poly_matchwin.wkt"] {
        let content = std::fs::read_to_string(dir.path().join(name)).unwrap();
        assert!(content.starts_with("POLYGON"), "{name}: {content}");
    }
}
