//! The coregistration driver: wires footprints, window planning, window
//! materialization and phase correlation together and tracks the outcome.

use geo_types::Polygon;
use log::{debug, warn};
use wkt::ToWkt;

use crate::{
    BandIndex, Error, GeoReference, RasterView, Result,
    config::CoregConfig,
    footprint,
    geometry::{self, OverlapInfo},
    materializer::{self, MaterializerInput, MatchedWindows},
    phasecorr::PhaseCorrelator,
    planner::{self, GridRole, PlannerInput, WindowPlan},
    report::{MapInfo, ShiftReport, ShiftResult},
    resample::ResampleAlg,
    ssim,
    warper::{ShiftWarper, Warper},
};

/// Progress of a coregistration run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunState {
    #[default]
    Unknown,
    Planning,
    Materializing,
    Matching,
    Success,
    Failed,
}

/// Detects the global X/Y shift between a reference and a target raster
/// within a single matching window.
///
/// ```no_run
/// use coreg::{Coreg, CoregConfig, RasterView};
/// # fn demo(reference: &dyn RasterView, target: &dyn RasterView) -> coreg::Result<()> {
/// let mut coreg = Coreg::new(reference, target, CoregConfig::default());
/// let result = coreg.run()?;
/// println!("shift: {:?}/{:?} px", result.x_shift_px, result.y_shift_px);
/// # Ok(())
/// # }
/// ```
pub struct Coreg<'a> {
    reference: &'a dyn RasterView,
    target: &'a dyn RasterView,
    config: CoregConfig,
    state: RunState,
    errors: Vec<Error>,
    result: ShiftResult,
    overlap: Option<OverlapInfo>,
    plan: Option<WindowPlan>,
    windows: Option<MatchedWindows>,
}

impl<'a> Coreg<'a> {
    pub fn new(reference: &'a dyn RasterView, target: &'a dyn RasterView, config: CoregConfig) -> Self {
        if config.resamp_alg_calc == ResampleAlg::Average {
            warn!(
                "The resampling algorithm 'average' causes sinus-shaped patterns in fft images that will affect the precision of the calculated spatial shifts. It is highly recommended to choose another resampling algorithm."
            );
        }

        Coreg {
            reference,
            target,
            config,
            state: RunState::Unknown,
            errors: Vec::new(),
            result: ShiftResult::default(),
            overlap: None,
            plan: None,
            windows: None,
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    /// Errors collected during the run, in occurrence order. Empty on
    /// success.
    pub fn errors(&self) -> &[Error] {
        &self.errors
    }

    pub fn result(&self) -> &ShiftResult {
        &self.result
    }

    pub fn overlap(&self) -> Option<&OverlapInfo> {
        self.overlap.as_ref()
    }

    pub fn window_plan(&self) -> Option<&WindowPlan> {
        self.plan.as_ref()
    }

    /// Runs the coregistration using the built-in grid shift warper for the
    /// post-correction similarity check.
    pub fn run(&mut self) -> Result<&ShiftResult> {
        let band = self.other_band();
        let warper = ShiftWarper::new(band, self.config.num_threads);
        self.execute(&warper)
    }

    /// Runs the coregistration with a caller supplied warper.
    pub fn run_with_warper(&mut self, warper: &dyn Warper) -> Result<&ShiftResult> {
        self.execute(warper)
    }

    /// The shift report consumed by the warping collaborator.
    pub fn report(&self) -> ShiftReport {
        let ref_georef = self.reference.geo_reference();
        let tgt_georef = self.target.geo_reference();
        let gt = ref_georef.geo_transform().coefficients();

        let original_map_info = MapInfo::from_geo_reference(tgt_georef);
        let updated_map_info = match (self.result.x_shift_map, self.result.y_shift_map) {
            (Some(x), Some(y)) => Some(original_map_info.shifted_origin(x, y)),
            _ => None,
        };

        ShiftReport {
            shift_px: self.result.x_shift_px.zip(self.result.y_shift_px),
            shift_map: self.result.x_shift_map.zip(self.result.y_shift_map),
            original_map_info,
            updated_map_info,
            reference_projection: ref_georef.projection().to_string(),
            reference_geo_transform: ref_georef.geo_transform(),
            reference_grid: [[gt[0], gt[0] + gt[1]], [gt[3], gt[3] + gt[5]]],
            success: self.result.success,
        }
    }

    fn execute(&mut self, warper: &dyn Warper) -> Result<&ShiftResult> {
        match self.try_run(warper) {
            Ok(()) => {
                self.state = RunState::Success;
                self.result.success = Some(true);
                Ok(&self.result)
            }
            Err(err) => {
                self.errors.push(err.clone());
                self.state = RunState::Failed;
                // shift fields stay empty on every failure kind
                self.result = ShiftResult {
                    success: Some(false),
                    ..Default::default()
                };

                if self.config.ignore_errors {
                    warn!("{err}");
                    Ok(&self.result)
                } else {
                    Err(err)
                }
            }
        }
    }

    fn try_run(&mut self, warper: &dyn Warper) -> Result<()> {
        self.state = RunState::Planning;

        let (ref_georef, tgt_georef) = self.effective_georeferences()?;

        let ref_poly = self.footprint(
            self.reference,
            &ref_georef,
            self.config.footprint_poly_ref.clone(),
            self.config.data_corners_ref.clone(),
            self.config.r_b4match,
            "reference",
        )?;
        let tgt_poly = self.footprint(
            self.target,
            &tgt_georef,
            self.config.footprint_poly_tgt.clone(),
            self.config.data_corners_tgt.clone(),
            self.config.s_b4match,
            "target",
        )?;

        self.write_diagnostic("poly_imref.wkt", &ref_poly);
        self.write_diagnostic("poly_im2shift.wkt", &tgt_poly);

        let overlap = geometry::overlap_polygon(&ref_poly, &tgt_poly)?;
        debug!("Overlap area: {} ({:.1} % of the target footprint)", overlap.area, overlap.percentage);
        self.write_diagnostic("overlap_poly.wkt", &overlap.polygon);

        // the overlap must cover more than 16x16 pixels at the matching resolution
        let match_georef = match planner::grid_to_use(&ref_georef, &tgt_georef) {
            GridRole::Reference => &ref_georef,
            GridRole::Target => &tgt_georef,
        };
        let px_area = match_georef.cell_size_x() * match_georef.cell_size_y().abs();
        let px_covered = overlap.area / px_area;
        if px_covered <= 256.0 {
            return Err(Error::InsufficientOverlap(format!(
                "overlap area covers only {px_covered:.1} pixels, at least 16*16 pixels are needed"
            )));
        }

        let plan = planner::plan_window(&PlannerInput {
            ref_georef: &ref_georef,
            tgt_georef: &tgt_georef,
            overlap: &overlap,
            wp: self.config.wp,
            ws: self.config.ws,
            mask_baddata_ref: self.config.mask_baddata_ref.as_ref(),
            mask_baddata_tgt: self.config.mask_baddata_tgt.as_ref(),
        })?;
        self.write_diagnostic("poly_matchwin.wkt", &plan.match_box.map_poly());
        debug!(
            "Matching window position (X,Y): {}/{}, size {}",
            plan.window_pos.x(),
            plan.window_pos.y(),
            plan.match_box.size()
        );
        self.overlap = Some(overlap);

        self.state = RunState::Materializing;
        let windows = materializer::materialize(
            &MaterializerInput {
                reference: self.reference,
                target: self.target,
                ref_band: self.config.r_b4match,
                tgt_band: self.config.s_b4match,
                ref_nodata: ref_georef.nodata(),
                tgt_nodata: tgt_georef.nodata(),
                resamp_alg: self.config.resamp_alg_calc,
                num_threads: self.config.num_threads,
            },
            &plan,
        )?;

        self.state = RunState::Matching;
        let mut engine = PhaseCorrelator::new(
            self.config.binary_ws,
            self.config.force_quadratic_win,
            self.config.fft_precision,
            self.config.max_iter,
            self.config.max_shift,
        );

        let (im0, im1) = windows.ref_tgt(plan.grid2use);
        let estimate = engine.estimate(im0, im1)?;
        debug!(
            "Detected integer shifts (X/Y): {}/{}, subpixel shifts (X/Y): {:.4}/{:.4}",
            estimate.x_int, estimate.y_int, estimate.x_sub, estimate.y_sub
        );

        // totals are in matching grid pixels, scale them to target image pixels
        let gsd_factor = plan.imfft_gsd / tgt_georef.cell_size_x();
        let x_shift_px = estimate.x_total * gsd_factor;
        let y_shift_px = estimate.y_total * gsd_factor;

        let tgt_gt = tgt_georef.geo_transform();
        let new_origin = tgt_gt.apply(x_shift_px, y_shift_px);
        let x_shift_map = new_origin.x() - tgt_gt.top_left().x();
        let y_shift_map = new_origin.y() - tgt_gt.top_left().y();

        self.result = ShiftResult {
            x_shift_px: Some(x_shift_px),
            y_shift_px: Some(y_shift_px),
            x_shift_map: Some(x_shift_map),
            y_shift_map: Some(y_shift_map),
            vec_length_map: Some((x_shift_map * x_shift_map + y_shift_map * y_shift_map).sqrt()),
            vec_angle_deg: Some(geometry::angle_to_north(x_shift_px, y_shift_px)),
            reliability: Some(estimate.reliability),
            ssim_before: None,
            ssim_after: None,
            success: None,
        };

        self.plan = Some(plan);
        self.windows = Some(windows);

        if self.config.validate_ssim {
            // best effort: a failing similarity check never degrades the
            // computed shift
            if let Err(err) = self.validate_ssim_improvement(warper) {
                warn!("SSIM validation failed: {err}");
            }
        }

        Ok(())
    }

    fn effective_georeferences(&self) -> Result<(GeoReference, GeoReference)> {
        let mut ref_georef = self.reference.geo_reference().clone().validated()?;
        let mut tgt_georef = self.target.geo_reference().clone().validated()?;

        if !ref_georef.projection_equals(&tgt_georef) {
            return Err(Error::UnequalProjections {
                reference: ref_georef.projection().to_string(),
                target: tgt_georef.projection().to_string(),
            });
        }

        if self.reference.band_count() < self.config.r_b4match.get() {
            return Err(Error::InvalidArgument(format!(
                "The reference image has {} bands, band {} cannot be used for matching",
                self.reference.band_count(),
                self.config.r_b4match
            )));
        }
        if self.target.band_count() < self.config.s_b4match.get() {
            return Err(Error::InvalidArgument(format!(
                "The target image has {} bands, band {} cannot be used for matching",
                self.target.band_count(),
                self.config.s_b4match
            )));
        }

        if let Some(nodata) = self.config.nodata.0 {
            ref_georef.set_nodata(Some(nodata));
        }
        if let Some(nodata) = self.config.nodata.1 {
            tgt_georef.set_nodata(Some(nodata));
        }

        Ok((ref_georef, tgt_georef))
    }

    fn footprint(
        &self,
        raster: &dyn RasterView,
        georef: &GeoReference,
        footprint_poly: Option<Polygon<f64>>,
        data_corners: Option<Vec<crate::Point>>,
        band: BandIndex,
        name: &str,
    ) -> Result<Polygon<f64>> {
        if let Some(poly) = footprint_poly {
            return Ok(footprint::repaired(poly));
        }

        if let Some(corners) = data_corners {
            return footprint::from_corners(&corners);
        }

        if self.config.calc_corners && georef.nodata().is_some() {
            debug!("Calculating actual data corner coordinates for the {name} image...");
            return match footprint::valid_data_bounds(raster, band, georef.nodata())? {
                Some(bounds) => Ok(bounds.into()),
                None => Err(Error::InsufficientOverlap(format!(
                    "the {name} image does not contain any valid data"
                ))),
            };
        }

        Ok(footprint::from_extent(georef))
    }

    /// The band of the image that gets warped for the similarity check (the
    /// image that does not provide the matching grid).
    fn other_band(&self) -> BandIndex {
        let ref_georef = self.reference.geo_reference();
        let tgt_georef = self.target.geo_reference();
        match planner::grid_to_use(ref_georef, tgt_georef) {
            GridRole::Reference => self.config.s_b4match,
            GridRole::Target => self.config.r_b4match,
        }
    }

    /// Computes the SSIM of the matching window before and after applying
    /// the detected shift to the other window.
    fn validate_ssim_improvement(&mut self, warper: &dyn Warper) -> Result<()> {
        let plan = self
            .plan
            .as_ref()
            .ok_or_else(|| Error::Runtime("SSIM validation requires a window plan".to_string()))?;
        let windows = self
            .windows
            .as_ref()
            .ok_or_else(|| Error::Runtime("SSIM validation requires materialized windows".to_string()))?;

        let dynamic_range = f64::max(windows.match_win.max_value(), windows.other_win.max_value())
            - f64::min(windows.match_win.min_value(), windows.other_win.min_value());

        let ssim_before = ssim::ssim(&windows.match_win, &windows.other_win, dynamic_range)?;

        // the shift was computed for the target image; warping the reference
        // window instead needs the inverted correction, rebased on the
        // reference image's own grid
        let (other_view, report) = match plan.grid2use {
            GridRole::Reference => (self.target, self.finished_report()),
            GridRole::Target => (
                self.reference,
                self.finished_report().inverted(self.reference.geo_reference()),
            ),
        };

        let out_bounds = windows.georef.bounding_box();
        let deshifted = warper.warp(
            other_view,
            &report,
            &out_bounds,
            &windows.georef,
            self.config.resamp_alg_deshift,
            windows.georef.nodata(),
        )?;

        let deshifted_win = deshifted.band(crate::FIRST_BAND);
        let ssim_after = if deshifted_win.size() == windows.match_win.size() {
            ssim::ssim(deshifted_win, &windows.match_win, dynamic_range)?
        } else {
            warn!(
                "SSIM input array shapes could not be equalized ({} <-> {}). SSIM of the de-shifted target is set to 0.",
                deshifted_win.size(),
                windows.match_win.size()
            );
            0.0
        };

        debug!("Image similarity within the matching window (SSIM before/after correction): {ssim_before:.4} => {ssim_after:.4}");
        if ssim_after < ssim_before {
            warn!("The SSIM within the matching window did not improve with the computed shift.");
        }

        self.result.ssim_before = Some(ssim_before);
        self.result.ssim_after = Some(ssim_after);
        Ok(())
    }

    /// Report as it would look once the current result is finalized; used
    /// before `success` has been committed.
    fn finished_report(&self) -> ShiftReport {
        let mut report = self.report();
        report.success = Some(true);
        report
    }

    fn write_diagnostic(&self, name: &str, poly: &Polygon<f64>) {
        let Some(dir) = &self.config.path_verbose_out else {
            return;
        };

        let write = || -> std::io::Result<()> {
            std::fs::create_dir_all(dir)?;
            std::fs::write(dir.join(name), poly.wkt_string())?;
            std::fs::write(dir.join("projection.txt"), self.reference.geo_reference().projection())
        };

        if let Err(err) = write() {
            warn!("Could not write diagnostic output '{name}': {err}");
        }
    }
}
