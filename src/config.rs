use std::path::PathBuf;

use geo_types::Polygon;

use crate::{
    BadDataMask, BandIndex, FIRST_BAND, Point,
    fft::FftPrecision,
    resample::{NumThreads, ResampleAlg},
};

/// Configuration record of a coregistration run.
///
/// The defaults mirror the command line surface of the enclosing tool:
/// band 1 of both images, a 256x256 window at the overlap centroid, cubic
/// resampling, at most 5 validation iterations and a maximum shift of
/// 5 pixels on the matching grid.
#[derive(Debug, Clone)]
pub struct CoregConfig {
    /// Band of the reference image used for matching (1-based).
    pub r_b4match: BandIndex,
    /// Band of the target image used for matching (1-based).
    pub s_b4match: BandIndex,
    /// Matching window position as map coordinates; axes left at `None`
    /// default to the overlap centroid.
    pub wp: (Option<f64>, Option<f64>),
    /// Matching window size in pixels (cols, rows) on the matching grid.
    pub ws: (usize, usize),
    /// Maximum number of iterations of the shift validation loop.
    pub max_iter: usize,
    /// Maximum accepted shift in matching grid pixel units.
    pub max_shift: f64,
    /// Resampling used while bringing the windows onto a common grid.
    pub resamp_alg_calc: ResampleAlg,
    /// Resampling used when the detected shift is applied to the target.
    pub resamp_alg_deshift: ResampleAlg,
    /// Footprint of the reference image; overrides `data_corners_ref`.
    pub footprint_poly_ref: Option<Polygon<f64>>,
    /// Footprint of the target image; overrides `data_corners_tgt`.
    pub footprint_poly_tgt: Option<Polygon<f64>>,
    pub data_corners_ref: Option<Vec<Point>>,
    pub data_corners_tgt: Option<Vec<Point>>,
    pub mask_baddata_ref: Option<BadDataMask>,
    pub mask_baddata_tgt: Option<BadDataMask>,
    /// Nodata overrides for (reference, target).
    pub nodata: (Option<f64>, Option<f64>),
    /// Derive the footprints from the valid data bounds instead of the full
    /// extents when no footprint information is provided.
    pub calc_corners: bool,
    /// Shrink the FFT window to power of two dimensions.
    pub binary_ws: bool,
    /// Force a quadratic FFT window.
    pub force_quadratic_win: bool,
    /// When true errors are collected in the error log and the run finishes
    /// with `success = false`; when false the first error aborts the run.
    pub ignore_errors: bool,
    /// Worker threads for the resampler.
    pub num_threads: NumThreads,
    /// Complex working precision of the FFT stage.
    pub fft_precision: FftPrecision,
    /// Compute the SSIM of the matching window before and after correction.
    pub validate_ssim: bool,
    /// Directory for best effort diagnostic outputs (footprints and the
    /// matching window as WKT features). Nothing is written when unset.
    pub path_verbose_out: Option<PathBuf>,
}

impl Default for CoregConfig {
    fn default() -> Self {
        CoregConfig {
            r_b4match: FIRST_BAND,
            s_b4match: FIRST_BAND,
            wp: (None, None),
            ws: (256, 256),
            max_iter: 5,
            max_shift: 5.0,
            resamp_alg_calc: ResampleAlg::Cubic,
            resamp_alg_deshift: ResampleAlg::Cubic,
            footprint_poly_ref: None,
            footprint_poly_tgt: None,
            data_corners_ref: None,
            data_corners_tgt: None,
            mask_baddata_ref: None,
            mask_baddata_tgt: None,
            nodata: (None, None),
            calc_corners: true,
            binary_ws: true,
            force_quadratic_win: true,
            ignore_errors: false,
            num_threads: NumThreads::Count(1),
            fft_precision: FftPrecision::Single,
            validate_ssim: true,
            path_verbose_out: None,
        }
    }
}
