//! Reads the planned windows from both rasters and brings them onto a
//! common grid so phase correlation sees two arrays covering the exact same
//! ground area at the same resolution.

use log::debug;

use crate::{
    BandIndex, DenseArray, Error, GeoReference, RasterView, Result,
    planner::{GridRole, WindowPlan},
    resample::{self, NumThreads, ResampleAlg},
};

/// The co-registered image windows. Both arrays have identical shape and
/// identical corner coordinates; `georef` describes both.
#[derive(Debug, Clone)]
pub struct MatchedWindows {
    /// Window of the image providing the matching grid.
    pub match_win: DenseArray<f64>,
    /// Window of the other image, warped onto the matching grid.
    pub other_win: DenseArray<f64>,
    pub georef: GeoReference,
}

impl MatchedWindows {
    /// (reference window, target window) independent of which image carries
    /// the matching grid.
    pub fn ref_tgt(&self, grid2use: GridRole) -> (&DenseArray<f64>, &DenseArray<f64>) {
        match grid2use {
            GridRole::Reference => (&self.match_win, &self.other_win),
            GridRole::Target => (&self.other_win, &self.match_win),
        }
    }
}

pub struct MaterializerInput<'a> {
    pub reference: &'a dyn RasterView,
    pub target: &'a dyn RasterView,
    pub ref_band: BandIndex,
    pub tgt_band: BandIndex,
    /// Effective nodata values (after configuration overrides).
    pub ref_nodata: Option<f64>,
    pub tgt_nodata: Option<f64>,
    pub resamp_alg: ResampleAlg,
    pub num_threads: NumThreads,
}

pub fn materialize(input: &MaterializerInput, plan: &WindowPlan) -> Result<MatchedWindows> {
    let (match_view, match_band, match_nodata, other_view, other_band, other_nodata) = match plan.grid2use {
        GridRole::Reference => (
            input.reference,
            input.ref_band,
            input.ref_nodata,
            input.target,
            input.tgt_band,
            input.tgt_nodata,
        ),
        GridRole::Target => (
            input.target,
            input.tgt_band,
            input.tgt_nodata,
            input.reference,
            input.ref_band,
            input.ref_nodata,
        ),
    };

    let match_window = plan.match_box.raster_window();
    let other_window = plan.other_box.raster_window();

    let match_win = match_view.read_band_window(match_band, &match_window)?;
    let other_data = other_view.read_band_window(other_band, &other_window)?;

    let match_georef = plan
        .match_box
        .geo_reference(match_view.geo_reference().projection(), match_nodata.or_else(|| match_view.geo_reference().nodata()));
    let other_georef = plan
        .other_box
        .geo_reference(other_view.geo_reference().projection(), other_nodata.or_else(|| other_view.geo_reference().nodata()));

    // warp the other window onto the grid of the matching window, unless the
    // two windows already are pixel identical
    let other_win = if other_georef.grid_equals(&match_georef) && other_georef.raster_size() == match_georef.raster_size() {
        other_data
    } else {
        debug!(
            "Resampling the other window {} -> {} using '{}'",
            other_georef.raster_size(),
            match_georef.raster_size(),
            input.resamp_alg
        );
        resample::resample(&other_data, &other_georef, &match_georef, input.resamp_alg, input.num_threads)?
    };

    if match_win.size() != other_win.size() {
        let wp = plan.window_pos;
        return Err(Error::WindowMismatch {
            x: wp.x(),
            y: wp.y(),
            match_size: match_win.size().to_string(),
            other_size: other_win.size().to_string(),
        });
    }

    // phase correlation wants even dimensions on both axes
    let match_win = match_win.trimmed_to_even()?;
    let other_win = other_win.trimmed_to_even()?;
    let georef = match_georef.window(crate::Cell::from_row_col(0, 0), match_win.size());

    Ok(MatchedWindows {
        match_win,
        other_win,
        georef,
    })
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;
    use crate::{
        CellSize, DenseRaster, FIRST_BAND, Point, RasterSize,
        array::{Columns, Rows},
        footprint,
        geometry::overlap_polygon,
        planner::{PlannerInput, plan_window},
    };

    fn raster(rows: i32, cols: i32, top_left: Point, cell: f64, values: impl Fn(usize, usize) -> f64) -> DenseRaster {
        let size = RasterSize::with_rows_cols(Rows(rows), Columns(cols));
        let georef = GeoReference::with_top_left_origin("EPSG:32632", size, top_left, CellSize::square(cell), None);
        let data = DenseArray::new(
            size,
            (0..size.cell_count())
                .map(|i| values(i / cols as usize, i % cols as usize))
                .collect(),
        )
        .unwrap();
        DenseRaster::with_single_band(georef, data).unwrap()
    }

    fn plan_for(reference: &DenseRaster, target: &DenseRaster, ws: (usize, usize)) -> WindowPlan {
        let overlap = overlap_polygon(
            &footprint::from_extent(reference.geo_reference()),
            &footprint::from_extent(target.geo_reference()),
        )
        .unwrap();

        plan_window(&PlannerInput {
            ref_georef: reference.geo_reference(),
            tgt_georef: target.geo_reference(),
            overlap: &overlap,
            wp: (None, None),
            ws,
            mask_baddata_ref: None,
            mask_baddata_tgt: None,
        })
        .unwrap()
    }

    #[test]
    fn equal_grids_skip_the_warp() {
        let reference = raster(64, 64, Point::new(0.0, 64.0), 1.0, |r, c| (r * 64 + c) as f64);
        let target = reference.clone();

        let plan = plan_for(&reference, &target, (64, 64));
        let windows = materialize(
            &MaterializerInput {
                reference: &reference,
                target: &target,
                ref_band: FIRST_BAND,
                tgt_band: FIRST_BAND,
                ref_nodata: None,
                tgt_nodata: None,
                resamp_alg: ResampleAlg::Cubic,
                num_threads: NumThreads::default(),
            },
            &plan,
        )
        .unwrap();

        assert_eq!(windows.match_win, windows.other_win);
        assert_eq!(windows.match_win.size(), RasterSize::square(64));
    }

    #[test]
    fn coarser_target_is_resampled_to_the_matching_grid() {
        let reference = raster(64, 64, Point::new(0.0, 64.0), 1.0, |r, _| r as f64);
        // same extent at half the resolution, same row gradient
        let target = raster(32, 32, Point::new(0.0, 64.0), 2.0, |r, _| r as f64 * 2.0 + 0.5);

        let plan = plan_for(&reference, &target, (32, 32));
        let windows = materialize(
            &MaterializerInput {
                reference: &reference,
                target: &target,
                ref_band: FIRST_BAND,
                tgt_band: FIRST_BAND,
                ref_nodata: None,
                tgt_nodata: None,
                resamp_alg: ResampleAlg::Bilinear,
                num_threads: NumThreads::default(),
            },
            &plan,
        )
        .unwrap();

        assert_eq!(windows.match_win.size(), windows.other_win.size());
        // the row gradient survives the resampling in the window interior
        let rows = windows.other_win.rows();
        let mid = windows.other_win.value(rows / 2, 5);
        let expected = windows.match_win.value(rows / 2, 5);
        assert_abs_diff_eq!(mid, expected, epsilon = 0.75);
    }

    #[test]
    fn odd_windows_are_trimmed_to_even() {
        let reference = raster(65, 65, Point::new(0.0, 65.0), 1.0, |r, c| (r + c) as f64);
        let target = reference.clone();

        let plan = plan_for(&reference, &target, (65, 65));
        let windows = materialize(
            &MaterializerInput {
                reference: &reference,
                target: &target,
                ref_band: FIRST_BAND,
                tgt_band: FIRST_BAND,
                ref_nodata: None,
                tgt_nodata: None,
                resamp_alg: ResampleAlg::Cubic,
                num_threads: NumThreads::default(),
            },
            &plan,
        )
        .unwrap();

        assert_eq!(windows.match_win.rows() % 2, 0);
        assert_eq!(windows.match_win.columns() % 2, 0);
        assert_eq!(windows.match_win.size(), windows.other_win.size());
    }
}
