//! Chooses the matching window and the corresponding window in the other
//! image, both inside the overlap of the two footprints and aligned to the
//! grid of the higher resolution input.

use std::time::{Duration, Instant};

use geo::{BoundingRect, Centroid, Contains, InteriorPoint};
use log::warn;

use crate::{
    BadDataMask, Error, GeoReference, Point, Rect, Result,
    geometry::{self, OverlapInfo},
    gridbox::{GridBox, smallest_box_containing},
};

const MIN_WINDOW_SIZE: i32 = 16;
const SHRINK_TIMEOUT: Duration = Duration::from_millis(1500);

/// Which input image provides the matching grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GridRole {
    Reference,
    Target,
}

/// Selects the image with the smaller pixel size as the matching grid.
/// The reference wins the tie.
pub fn grid_to_use(reference: &GeoReference, target: &GeoReference) -> GridRole {
    if reference.cell_size_x() <= target.cell_size_x() {
        GridRole::Reference
    } else {
        GridRole::Target
    }
}

#[derive(Debug, Clone)]
pub struct WindowPlan {
    pub match_box: GridBox,
    pub other_box: GridBox,
    /// Ground sampling distance of the FFT input, the pixel size of the
    /// matching grid.
    pub imfft_gsd: f64,
    pub grid2use: GridRole,
    pub window_pos: Point,
}

pub struct PlannerInput<'a> {
    pub ref_georef: &'a GeoReference,
    pub tgt_georef: &'a GeoReference,
    pub overlap: &'a OverlapInfo,
    pub wp: (Option<f64>, Option<f64>),
    pub ws: (usize, usize),
    pub mask_baddata_ref: Option<&'a BadDataMask>,
    pub mask_baddata_tgt: Option<&'a BadDataMask>,
}

pub fn plan_window(input: &PlannerInput) -> Result<WindowPlan> {
    let wp = resolve_window_position(input)?;
    check_bad_data_masks(input, wp)?;

    let grid2use = grid_to_use(input.ref_georef, input.tgt_georef);
    let (match_georef, other_georef) = match grid2use {
        GridRole::Reference => (input.ref_georef, input.tgt_georef),
        GridRole::Target => (input.tgt_georef, input.ref_georef),
    };

    let match_gt = match_georef.geo_transform();
    let other_gt = other_georef.geo_transform();
    let (ws_x, ws_y) = (input.ws.0 as f64, input.ws.1 as f64);

    let mut match_box = GridBox::from_center_and_map_size(
        wp,
        (ws_x * match_georef.cell_size_x(), ws_y * match_georef.cell_size_y().abs()),
        &match_gt,
    );
    let mut other_box = GridBox::from_center_and_map_size(
        wp,
        (ws_x * other_georef.cell_size_x(), ws_y * other_georef.cell_size_y().abs()),
        &other_gt,
    );

    let overlap_poly = &input.overlap.polygon;
    let overlap_bounds = overlap_poly
        .bounding_rect()
        .map(|r| Rect::from_points(Point::new(r.min().x, r.min().y), Point::new(r.max().x, r.max().y)))
        .ok_or_else(|| Error::InsufficientOverlap("overlap polygon is empty".to_string()))?;

    // clip the matching window to the overlap area
    let clipped = geometry::overlap_polygon(&match_box.map_poly(), overlap_poly)?;
    let clipped_bounds = clipped
        .polygon
        .bounding_rect()
        .map(|r| Rect::from_points(Point::new(r.min().x, r.min().y), Point::new(r.max().x, r.max().y)))
        .ok_or_else(|| Error::InsufficientOverlap("overlap polygon is empty".to_string()))?;
    match_box = GridBox::from_map_rect(&clipped_bounds, &match_gt);

    // when the clipped window still reaches outside the overlap (the overlap
    // is not rectangular there), regrow a box from a one pixel seed at the
    // window position until it no longer fits, then step back one pixel
    if !geometry::polygon_within(&match_box.map_poly(), overlap_poly) {
        let (seed_x, seed_y) = if ws_x >= ws_y {
            (1.0, ws_y / ws_x)
        } else {
            (ws_x / ws_y, 1.0)
        };

        let mut seed = GridBox::from_center_and_map_size(
            wp,
            (seed_x * match_georef.cell_size_x(), seed_y * match_georef.cell_size_y().abs()),
            &match_gt,
        );
        loop {
            seed.buffer_im_xy(1.0, 1.0);
            if !geometry::polygon_within(&seed.map_poly(), &clipped.polygon) {
                seed.buffer_im_xy(-1.0, -1.0);
                match_box = seed;
                break;
            }
        }
    }

    // move the matching window onto the matching grid (NW corner)
    match_box.snap_to_grid();

    // the grid move can have pushed the window outside the overlap again,
    // one pixel of shrinking is enough to undo that
    if !geometry::polygon_within(&match_box.map_poly(), overlap_poly) {
        let (x_larger, y_larger) = match_box.exceeds(&overlap_bounds);
        match_box.buffer_im_xy(if x_larger { -1.0 } else { 0.0 }, if y_larger { -1.0 } else { 0.0 });
    }

    // remove rounding noise from the coordinate arithmetic
    match_box.round_im_poly();

    // make sure the other window fully contains the matching window
    if !other_box.map_bounds().contains_rect(&match_box.map_bounds(), containment_eps(&other_box)) {
        other_box = smallest_box_containing(&match_box.map_bounds(), &other_gt);
    }

    // growing the other window may have pushed it outside the overlap:
    // shrink the matching window and recompute until both fit
    let start = Instant::now();
    while !geometry::polygon_within(&other_box.map_poly(), overlap_poly) {
        let (x_larger, y_larger) = other_box.exceeds(&overlap_bounds);
        match_box.buffer_im_xy(if x_larger { -1.0 } else { 0.0 }, if y_larger { -1.0 } else { 0.0 });

        let previous_area = rect_area(&other_box.map_bounds());
        other_box = smallest_box_containing(&match_box.map_bounds(), &other_gt);

        if rect_area(&other_box.map_bounds()) == previous_area || start.elapsed() > SHRINK_TIMEOUT {
            return Err(Error::ShrinkageDeadlock(format!(
                "matching window at {}/{} cannot be shrunk to fit the overlap area; check the footprints of the input data{}",
                wp.x(),
                wp.y(),
                if start.elapsed() > SHRINK_TIMEOUT { " (timed out)" } else { "" }
            )));
        }
    }

    for (name, win) in [("matching", &match_box), ("other", &other_box)] {
        let size = win.size();
        if size.rows.count() < MIN_WINDOW_SIZE || size.cols.count() < MIN_WINDOW_SIZE {
            return Err(Error::WindowTooSmall(format!(
                "the {name} window at position {}/{} covers only {size} pixels, at least {MIN_WINDOW_SIZE}x{MIN_WINDOW_SIZE} are needed",
                wp.x(),
                wp.y()
            )));
        }
    }

    debug_assert!(geometry::polygon_within(&match_box.map_poly(), &other_box.map_poly()));
    debug_assert!(geometry::polygon_within(&other_box.map_poly(), overlap_poly));

    let match_size = match_box.size();
    if (match_size.cols.count() as usize, match_size.rows.count() as usize) != input.ws {
        warn!(
            "Target window size {:?} not possible due to too small overlap area or a window position too close to an image edge. New matching window size: {}.",
            input.ws, match_size
        );
    }

    Ok(WindowPlan {
        match_box,
        other_box,
        imfft_gsd: match_georef.cell_size_x(),
        grid2use,
        window_pos: wp,
    })
}

fn containment_eps(boxx: &GridBox) -> f64 {
    boxx.cell_size().x().abs() * 1e-6
}

fn rect_area(rect: &Rect) -> f64 {
    rect.width() * rect.height()
}

fn resolve_window_position(input: &PlannerInput) -> Result<Point> {
    let (wp_x, wp_y) = input.wp;
    let overlap_poly = &input.overlap.polygon;

    if let (Some(x), Some(y)) = (wp_x, wp_y) {
        let wp = Point::new(x, y);
        if !overlap_poly.contains(&wp) {
            return Err(Error::WindowOutsideOverlap { x, y });
        }
        return Ok(wp);
    }

    let centroid = overlap_poly
        .centroid()
        .ok_or_else(|| Error::InsufficientOverlap("overlap polygon is empty".to_string()))?;
    let wp = Point::new(wp_x.unwrap_or_else(|| centroid.x()), wp_y.unwrap_or_else(|| centroid.y()));

    if overlap_poly.contains(&wp) {
        return Ok(wp);
    }

    // the centroid of a concave overlap can lie outside of it, fall back to
    // a point that is guaranteed to be inside
    warn!(
        "The centroid of the image overlap cannot be used as matching window position since it is outside of the overlap area. Using the representative point instead."
    );
    let wp = overlap_poly
        .interior_point()
        .ok_or_else(|| Error::InsufficientOverlap("overlap polygon is empty".to_string()))?;

    if !overlap_poly.contains(&wp) {
        return Err(Error::WindowOutsideOverlap { x: wp.x(), y: wp.y() });
    }

    Ok(wp)
}

fn check_bad_data_masks(input: &PlannerInput, wp: Point) -> Result<()> {
    for (name, mask) in [("reference", input.mask_baddata_ref), ("target", input.mask_baddata_tgt)] {
        if let Some(mask) = mask
            && mask.is_bad_at(wp)
        {
            return Err(Error::WindowInBadData {
                image: name.to_string(),
                x: wp.x(),
                y: wp.y(),
            });
        }
    }

    Ok(())
}
