//! Contract towards the image warping collaborator that applies a computed
//! shift, plus the built-in grid shift implementation used for the SSIM
//! check on equal projections.

use crate::{
    BandIndex, DenseRaster, Error, GeoReference, RasterView, Rect, Result,
    gridbox::smallest_box_containing,
    report::ShiftReport,
    resample::{self, NumThreads, ResampleAlg},
};

/// Applies a shift report to a raster and returns a view over the warped
/// pixels covering the requested output bounds on the requested grid.
pub trait Warper {
    fn warp(
        &self,
        target: &dyn RasterView,
        report: &ShiftReport,
        out_bounds: &Rect,
        out_grid: &GeoReference,
        resamp_alg: ResampleAlg,
        nodata: Option<f64>,
    ) -> Result<DenseRaster>;
}

/// Warper for inputs sharing one projection: moves the raster origin by the
/// corrected map shift and resamples onto the output grid.
#[derive(Debug, Clone)]
pub struct ShiftWarper {
    pub band: BandIndex,
    pub num_threads: NumThreads,
}

impl ShiftWarper {
    pub fn new(band: BandIndex, num_threads: NumThreads) -> Self {
        ShiftWarper { band, num_threads }
    }
}

impl Warper for ShiftWarper {
    fn warp(
        &self,
        target: &dyn RasterView,
        report: &ShiftReport,
        out_bounds: &Rect,
        out_grid: &GeoReference,
        resamp_alg: ResampleAlg,
        nodata: Option<f64>,
    ) -> Result<DenseRaster> {
        let updated = report
            .updated_map_info
            .as_ref()
            .ok_or_else(|| Error::InvalidArgument("the shift report carries no updated map info".to_string()))?;

        // the source grid with the corrected origin
        let shifted_georef = GeoReference::new(
            updated.projection.clone(),
            target.geo_reference().raster_size(),
            updated.geo_transform(),
            nodata.or_else(|| target.geo_reference().nodata()),
        );

        let out_georef = smallest_box_containing(out_bounds, &out_grid.geo_transform())
            .geo_reference(out_grid.projection(), nodata.or_else(|| out_grid.nodata()));

        let data = target.read_band(self.band)?;
        let warped = resample::resample(&data, &shifted_georef, &out_georef, resamp_alg, self.num_threads)?;

        DenseRaster::with_single_band(out_georef, warped)
    }
}
